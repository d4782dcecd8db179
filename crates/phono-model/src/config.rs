use std::path::Path;

use phono_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::overlap::RelationPolicy;

/// Default object count above which `load_many` takes the bulk decode path.
pub const DEFAULT_BULK_LOAD_THRESHOLD: usize = 100_000;

/// Object cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Misses above this count are decoded into pre-sized buffers.
    pub bulk_load_threshold: usize,
    /// Initial state of the persistence toggle.
    pub persistence_enabled: bool,
    /// Which segments count as related for overlap detection.
    pub relation_policy: RelationPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bulk_load_threshold: DEFAULT_BULK_LOAD_THRESHOLD,
            persistence_enabled: true,
            relation_policy: RelationPolicy::default(),
        }
    }
}

/// Top-level configuration, usually read from `phono.toml`.
///
/// ```toml
/// [store]
/// path = "/data/cgn"
/// sync_mode = "every_write"
///
/// [cache]
/// bulk_load_threshold = 50000
/// relation_policy = "cross_speaker"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonoConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
}

impl PhonoConfig {
    /// Volatile configuration with defaults.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Journal-backed configuration rooted at `path`.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            store: StoreConfig::at(path.as_ref()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> ModelResult<Self> {
        toml::from_str(s).map_err(|e| ModelError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ModelResult<String> {
        toml::to_string(self).map_err(|e| ModelError::Config(e.to_string()))
    }
}
