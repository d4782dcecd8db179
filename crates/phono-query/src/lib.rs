//! Querysets over Phono objects.
//!
//! A [`QuerySet`] covers every stored object of one type, or an explicit
//! list of cached objects, and narrows it with `filter`, `exclude` and
//! `order_by`. Lookups use `__` to walk relations, and a relation that
//! yields several objects matches when any of them does:
//! `("syllables__phones__label", "t")` keeps words with a `t` phone in any
//! syllable.

pub mod attr;
pub mod error;
pub mod lookup;
pub mod queryset;
pub mod value;

#[cfg(test)]
mod scenarios;

pub use error::{QueryError, QueryResult};
pub use lookup::{Lookup, Operator, Path};
pub use queryset::QuerySet;
pub use value::{Descending, Value};
