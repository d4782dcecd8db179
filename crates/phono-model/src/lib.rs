//! Domain model and object cache for Phono.
//!
//! Objects are plain values: [`Audio`], [`Speaker`] and [`Segment`] (phrase,
//! word, syllable or phone). Relations between them are never stored as
//! pointers; they are recomputed from key algebra through a [`Session`],
//! which owns the cached objects and hands out [`Identifier`]s.
//!
//! ```no_run
//! use phono_model::{Audio, PhonoConfig, SaveOptions, Segment, Session};
//!
//! let mut session = Session::open(PhonoConfig::at("/data/cgn"))?;
//! let audio = session.add(Audio::new("fn000123.wav"));
//! let phrase = session.add(Segment::phrase("hallo", 0, 850)?);
//! session.add_audio(phrase, audio, true)?;
//! session.save_many(&[audio, phrase], SaveOptions::default())?;
//! # Ok::<(), phono_model::ModelError>(())
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod linking;
pub mod object;
pub mod overlap;
pub mod registry;
pub mod relations;
pub mod session;

#[cfg(test)]
mod scenarios;

pub use config::{CacheConfig, PhonoConfig};
pub use error::{ErrorKind, HierarchyError, ModelError, ModelResult};
pub use ingest::{Interval, PlaybackSpan};
pub use object::{Audio, Gender, Object, PhraseMetadata, Segment, SegmentDetail, Speaker};
pub use overlap::{spans_overlap, RelationPolicy};
pub use registry::{Hydrator, TypeCounters, TypeRegistry};
pub use relations::Relation;
pub use session::{PersistenceGuard, SaveOptions, Session, SessionStats};

pub use phono_store::{KeyValueStore, RawKey};
pub use phono_types::{Identifier, ObjectType};
