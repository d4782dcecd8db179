use std::fmt;

use phono_codec::CodecError;
use phono_store::StoreError;
use phono_types::{Identifier, ObjectType};

/// Caller-visible error category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad key or value bytes, out-of-range numbers, oversized strings.
    Encoding,
    /// A key already exists and overwrite was not requested.
    Conflict,
    /// Illegal link between objects. Always a caller bug.
    Hierarchy,
    /// Unknown key, type, object or attribute.
    LookupMiss,
    /// Failure of the underlying store or file system.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Encoding => "encoding",
            Self::Conflict => "conflict",
            Self::Hierarchy => "hierarchy",
            Self::LookupMiss => "lookup miss",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

/// Violations of the containment and identity rules.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("{child} cannot be a child of {parent}")]
    WrongChildType { parent: ObjectType, child: ObjectType },

    #[error("a Phrase has no parent")]
    PhraseHasNoParent,

    #[error("{field} mismatch: {parent} vs {child}")]
    Mismatch {
        field: &'static str,
        parent: Identifier,
        child: Identifier,
    },

    #[error("{0} is not a segment")]
    NotASegment(ObjectType),

    #[error("{child} [{child_start}, {child_end}] lies outside its parent {parent} [{parent_start}, {parent_end})")]
    OutsideParent {
        parent: Identifier,
        parent_start: u32,
        parent_end: u32,
        child: Identifier,
        child_start: u32,
        child_end: u32,
    },
}

/// Errors from the domain model and the object cache.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// No record under this key.
    #[error("no record for key {0}")]
    NotFound(String),

    /// The identifier is not held by this session.
    #[error("object {0} is not in the cache")]
    NotCached(Identifier),

    /// No hydrator registered for the type.
    #[error("type {0} is not registered")]
    UnregisteredType(ObjectType),

    /// A key from the link index was passed where a record key was expected.
    #[error("key does not address a record")]
    NotARecordKey,

    #[error("object {id} is a {actual}, expected {expected}")]
    WrongType {
        id: Identifier,
        expected: &'static str,
        actual: ObjectType,
    },

    #[error("invalid span: start {start_ms} ms after end {end_ms} ms")]
    InvalidSpan { start_ms: u32, end_ms: u32 },

    #[error("time {0} s is outside the representable millisecond range")]
    InvalidTime(f64),

    #[error("sample fraction {0} not in (0, 1]")]
    InvalidFraction(f64),

    #[error("{0} needs at least one object")]
    EmptyInput(&'static str),

    #[error("segment {0} has no audio")]
    MissingAudio(Identifier),

    #[error("{object_type} has no relation named '{name}'")]
    UnknownRelation { object_type: ObjectType, name: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Codec(_) | Self::InvalidSpan { .. } | Self::InvalidTime(_) | Self::InvalidFraction(_) => {
                ErrorKind::Encoding
            }
            Self::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Store(StoreError::Codec(_)) => ErrorKind::Encoding,
            Self::Store(_) | Self::Io(_) | Self::Config(_) => ErrorKind::Io,
            Self::Hierarchy(_) => ErrorKind::Hierarchy,
            Self::NotFound(_)
            | Self::NotCached(_)
            | Self::UnregisteredType(_)
            | Self::NotARecordKey
            | Self::WrongType { .. }
            | Self::EmptyInput(_)
            | Self::MissingAudio(_)
            | Self::UnknownRelation { .. } => ErrorKind::LookupMiss,
        }
    }
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
