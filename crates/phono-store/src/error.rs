use phono_codec::CodecError;

use crate::traits::Namespace;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `put` without overwrite hit an existing key.
    #[error("key exists in {namespace}: {key}")]
    KeyExists { namespace: Namespace, key: String },

    /// `put_many` without overwrite found existing keys; nothing was written.
    #[error("{count} key(s) of batch already exist in {namespace} (first: {first}); batch not written")]
    BatchConflict {
        namespace: Namespace,
        count: usize,
        first: String,
    },

    /// Stored bytes would exceed the configured map size.
    #[error("map full: {needed} bytes needed, limit {limit}")]
    MapFull { needed: u64, limit: u64 },

    /// Journal frame could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding a store lock.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// A stored key could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    /// Returns `true` for the existence-conflict family.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KeyExists { .. } | Self::BatchConflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
