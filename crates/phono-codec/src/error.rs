use phono_types::{ObjectType, TypeError};

/// Errors from packing or unpacking keys and values.
///
/// All of these are encoding errors: fatal to the single operation and never
/// worth retrying.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Key has an unknown length or an inconsistent rank byte.
    #[error("corrupt key ({len} bytes): {reason}")]
    CorruptKey { len: usize, reason: String },

    /// Segment start time does not fit the key's u32 slot.
    #[error("offset {0} ms outside [0, 2^32)")]
    OffsetOutOfRange(i64),

    /// A segment key or scan was requested for a non-segment type.
    #[error("{0} is not a segment type")]
    NotASegment(ObjectType),

    /// Fewer bytes than the fixed header needs.
    #[error("{object}: value too short for fixed header ({actual} < {expected} bytes)")]
    ValueTooShort {
        object: ObjectType,
        expected: usize,
        actual: usize,
    },

    /// Bytes remain after every declared field was consumed.
    #[error("{object}: trailing bytes not described by layout ({count} bytes)")]
    TrailingBytes { object: ObjectType, count: usize },

    /// A length prefix points past the end of the buffer.
    #[error("{object}: truncated {field} at offset {offset}")]
    Truncated {
        object: ObjectType,
        field: String,
        offset: usize,
    },

    /// String longer than its length prefix can express.
    #[error("{object}: {field} is {len} bytes, exceeds {max} byte limit of its length prefix")]
    StringTooLong {
        object: ObjectType,
        field: String,
        len: usize,
        max: usize,
    },

    /// Integer does not fit its declared width.
    #[error("{object}: value {value} out of range for field {field}")]
    IntOutOfRange {
        object: ObjectType,
        field: &'static str,
        value: i64,
    },

    /// A record did not supply a field its layout declares.
    #[error("{object}: missing field {field}")]
    MissingField {
        object: ObjectType,
        field: &'static str,
    },

    /// A record supplied a value of the wrong kind for a declared field.
    #[error("{object}: field {field} has the wrong kind")]
    FieldKindMismatch {
        object: ObjectType,
        field: &'static str,
    },

    /// String payload is not UTF-8.
    #[error("{object}: invalid UTF-8 in {field}")]
    InvalidUtf8 { object: ObjectType, field: String },

    /// Value header carries a version this build cannot read.
    #[error("{object}: unsupported value version {version}")]
    UnsupportedVersion { object: ObjectType, version: u8 },

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
