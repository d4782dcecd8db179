//! Ordered key-value storage for Phono.
//!
//! The store is a pure byte map: it never interprets values and only decodes
//! keys for [`KeyValueStore::all_keys_by_type`]. Two namespaces share one
//! store: [`Namespace::Main`] for typed records and
//! [`Namespace::SpeakerAudio`] for the speaker-audio link index.
//!
//! # Backends
//!
//! - [`OrderedStore`] -- `BTreeMap` tables behind an `RwLock`, optionally made
//!   durable by an append-only [`Journal`]
//!
//! # Guarantees
//!
//! 1. Single writer, many readers: every write takes the table lock once.
//! 2. `put`/`put_many` check existence and write under the same lock.
//! 3. `put_many` is all-or-nothing; it is journaled as one frame.
//! 4. Deletes are idempotent and run in bounded sub-batches.
//! 5. I/O errors propagate unchanged.

pub mod config;
pub mod error;
pub mod journal;
pub mod ordered;
pub mod traits;

pub use config::{StoreConfig, SyncMode};
pub use error::{StoreError, StoreResult};
pub use journal::{Journal, LogOp, LogRecord};
pub use ordered::OrderedStore;
pub use traits::{KeyValueStore, Namespace, RawKey, StoreStats};
