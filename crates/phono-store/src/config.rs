use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default upper bound on stored key and value bytes (1 TiB).
pub const DEFAULT_MAX_MAP_SIZE: u64 = 1 << 40;

/// Default number of deletions per write transaction.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 10_000;

/// Flush strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every committed transaction.
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the journal. `None` keeps the store in memory.
    pub path: Option<PathBuf>,
    /// Hard limit on total key and value bytes across namespaces.
    pub max_map_size: u64,
    /// Deletions committed per sub-batch in `delete_many`.
    pub delete_batch_size: usize,
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Journal-backed store rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StoreConfig::default();
        assert!(c.path.is_none());
        assert_eq!(c.max_map_size, 1_099_511_627_776);
        assert_eq!(c.delete_batch_size, 10_000);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
    }

    #[test]
    fn at_sets_path_only() {
        let c = StoreConfig::at("/tmp/phono");
        assert_eq!(c.path.as_deref(), Some(std::path::Path::new("/tmp/phono")));
        assert_eq!(c.delete_batch_size, DEFAULT_DELETE_BATCH_SIZE);
    }
}
