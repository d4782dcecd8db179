use phono_model::ModelError;
use phono_types::ObjectType;
use thiserror::Error;

/// Errors raised while building or evaluating a queryset.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The path names an attribute the object type does not have.
    #[error("{object_type} has no attribute '{name}'")]
    UnknownAttribute { object_type: ObjectType, name: String },

    #[error("cannot build a queryset from no objects")]
    EmptyQuerySet,

    /// Objects of different types passed to one queryset.
    #[error("mixed object types: expected {expected}, found {found}")]
    TypeMismatch { expected: ObjectType, found: ObjectType },

    /// `get_one` / `get_n` on a filtered or ordered queryset.
    #[error("{0} is only supported on an unfiltered queryset")]
    UnfilteredOnly(&'static str),

    #[error("invalid lookup '{lookup}': {reason}")]
    InvalidLookup { lookup: String, reason: String },

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl QueryError {
    pub(crate) fn invalid(lookup: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLookup {
            lookup: lookup.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
