//! Foundation types for Phono, a storage engine for time-aligned linguistic
//! annotations.
//!
//! Every other Phono crate depends on `phono-types`.
//!
//! # Key Types
//!
//! - [`Identifier`]: 8-byte random identifier shared by every stored object
//! - [`ObjectType`]: closed rank enum (Audio, Phrase, Word, Syllable, Phone, Speaker)

pub mod error;
pub mod identifier;
pub mod object_type;

pub use error::TypeError;
pub use identifier::Identifier;
pub use object_type::ObjectType;
