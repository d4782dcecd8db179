//! Lazy, chainable querysets.

use std::fmt;

use phono_model::{ModelError, RawKey, Session};
use phono_types::{Identifier, ObjectType};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::lookup::{Lookup, Path};
use crate::value::{Descending, Value};

#[derive(Clone, Debug)]
struct Stage {
    exclude: bool,
    lookups: Vec<Lookup>,
}

impl Stage {
    /// All lookups of the stage hold for `id`.
    fn holds(&self, session: &mut Session, id: Identifier) -> QueryResult<bool> {
        for lookup in &self.lookups {
            if !lookup.matches(session, id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.exclude { "exclude(" } else { "filter(" })?;
        for (i, lookup) in self.lookups.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{lookup}")?;
        }
        f.write_str(")")
    }
}

#[derive(Clone, Debug)]
struct OrderField {
    path: Path,
    descending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Asc(Value),
    Desc(Descending<Value>),
}

/// A filtered, ordered view over objects of one type.
///
/// Nothing touches the store until the results are first needed
/// ([`QuerySet::len`], [`QuerySet::to_vec`], [`QuerySet::iter`]); results
/// are then memoized until the next `filter`, `exclude` or `order_by`.
///
/// ```no_run
/// use phono_model::{ObjectType, Session};
/// use phono_query::QuerySet;
///
/// let mut session = Session::in_memory();
/// let mut phrases = QuerySet::of_type(&mut session, ObjectType::Phrase)?
///     .filter([("words__phones__label", "t")])?
///     .order_by(["-start"])?;
/// for id in phrases.to_vec()? {
///     println!("{id}");
/// }
/// # Ok::<(), phono_query::QueryError>(())
/// ```
pub struct QuerySet<'s> {
    session: &'s mut Session,
    object_type: ObjectType,
    keys: Vec<RawKey>,
    objects: Option<Vec<Identifier>>,
    stages: Vec<Stage>,
    ordering: Vec<OrderField>,
    results: Option<Vec<Identifier>>,
}

impl<'s> QuerySet<'s> {
    /// Every stored object of `object_type`.
    pub fn of_type(session: &'s mut Session, object_type: ObjectType) -> QueryResult<Self> {
        if !session.registry().is_registered(object_type) {
            return Err(ModelError::UnregisteredType(object_type).into());
        }
        let keys = session.keys_of_type(object_type)?;
        Ok(Self::new(session, object_type, keys, None))
    }

    /// An explicit list of cached objects, all of one type.
    pub fn from_objects(session: &'s mut Session, ids: &[Identifier]) -> QueryResult<Self> {
        let first = ids.first().ok_or(QueryError::EmptyQuerySet)?;
        let object_type = session.object(*first)?.object_type();
        let mut keys = Vec::with_capacity(ids.len());
        for &id in ids {
            let found = session.object(id)?.object_type();
            if found != object_type {
                return Err(QueryError::TypeMismatch {
                    expected: object_type,
                    found,
                });
            }
            keys.push(session.key_of(id)?);
        }
        Ok(Self::new(session, object_type, keys, Some(ids.to_vec())))
    }

    fn new(
        session: &'s mut Session,
        object_type: ObjectType,
        keys: Vec<RawKey>,
        objects: Option<Vec<Identifier>>,
    ) -> Self {
        Self {
            session,
            object_type,
            keys,
            objects,
            stages: Vec::new(),
            ordering: Vec::new(),
            results: None,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Store keys of the queried objects before any filtering.
    pub fn keys(&self) -> &[RawKey] {
        &self.keys
    }

    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Keep objects for which every lookup matches.
    pub fn filter<I, K, V>(self, lookups: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.stage(false, lookups)
    }

    /// Drop objects for which every lookup matches.
    pub fn exclude<I, K, V>(self, lookups: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.stage(true, lookups)
    }

    fn stage<I, K, V>(mut self, exclude: bool, lookups: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let lookups = lookups
            .into_iter()
            .map(|(raw, value)| Lookup::parse(self.object_type, raw.as_ref(), value.into()))
            .collect::<QueryResult<Vec<_>>>()?;
        if !lookups.is_empty() {
            self.stages.push(Stage { exclude, lookups });
            self.results = None;
        }
        Ok(self)
    }

    /// Sort by the given paths; a leading `-` sorts that field descending.
    /// Replaces any earlier ordering. The sort is stable.
    pub fn order_by<I, F>(mut self, fields: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        self.ordering.clear();
        for field in fields {
            let field = field.as_ref();
            let (descending, raw) = match field.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, field),
            };
            let path = Path::parse(self.object_type, raw)?;
            self.ordering.push(OrderField { path, descending });
        }
        self.results = None;
        Ok(self)
    }

    fn is_unfiltered(&self) -> bool {
        self.stages.is_empty() && self.ordering.is_empty()
    }

    /// First object of an unfiltered queryset.
    pub fn get_one(&mut self) -> QueryResult<Option<Identifier>> {
        if !self.is_unfiltered() {
            return Err(QueryError::UnfilteredOnly("get_one"));
        }
        Ok(self.head(1)?.into_iter().next())
    }

    /// First `n` objects of an unfiltered queryset, loading only those.
    pub fn get_n(&mut self, n: usize) -> QueryResult<Vec<Identifier>> {
        if !self.is_unfiltered() {
            return Err(QueryError::UnfilteredOnly("get_n"));
        }
        self.head(n)
    }

    fn head(&mut self, n: usize) -> QueryResult<Vec<Identifier>> {
        if let Some(ids) = &self.objects {
            return Ok(ids.iter().take(n).copied().collect());
        }
        let n = n.min(self.keys.len());
        Ok(self.session.load_many(&self.keys[..n])?)
    }

    pub fn len(&mut self) -> QueryResult<usize> {
        Ok(self.evaluate()?.len())
    }

    pub fn is_empty(&mut self) -> QueryResult<bool> {
        Ok(self.evaluate()?.is_empty())
    }

    pub fn to_vec(&mut self) -> QueryResult<Vec<Identifier>> {
        Ok(self.evaluate()?.to_vec())
    }

    pub fn iter(&mut self) -> QueryResult<std::slice::Iter<'_, Identifier>> {
        Ok(self.evaluate()?.iter())
    }

    fn evaluate(&mut self) -> QueryResult<&[Identifier]> {
        if self.results.is_none() {
            let ids = self.materialize()?;
            self.results = Some(ids);
        }
        Ok(self.results.as_deref().unwrap_or_default())
    }

    fn materialize(&mut self) -> QueryResult<Vec<Identifier>> {
        let mut ids = match &self.objects {
            Some(ids) => ids.clone(),
            None => {
                if !self.session.is_fully_loaded(self.object_type) {
                    self.session.preload_type(self.object_type)?;
                }
                self.session.load_many(&self.keys)?
            }
        };
        let candidates = ids.len();

        for stage in &self.stages {
            let paths = stage.lookups.iter().map(Lookup::path);
            preload(self.session, paths)?;
            let mut kept = Vec::with_capacity(ids.len());
            for id in ids {
                if stage.holds(self.session, id)? != stage.exclude {
                    kept.push(id);
                }
            }
            ids = kept;
        }

        if !self.ordering.is_empty() {
            preload(self.session, self.ordering.iter().map(|o| &o.path))?;
            let mut keyed = Vec::with_capacity(ids.len());
            for id in ids {
                let mut key = Vec::with_capacity(self.ordering.len());
                for field in &self.ordering {
                    let mut values = field.path.resolve(self.session, id)?;
                    let value = match values.len() {
                        0 => Value::Null,
                        1 => values.remove(0),
                        _ => Value::List(values),
                    };
                    key.push(if field.descending {
                        SortKey::Desc(Descending(value))
                    } else {
                        SortKey::Asc(value)
                    });
                }
                keyed.push((key, id));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            ids = keyed.into_iter().map(|(_, id)| id).collect();
        }

        debug!(
            object_type = %self.object_type,
            candidates,
            matched = ids.len(),
            "queryset evaluated"
        );
        Ok(ids)
    }
}

/// Bulk-load every type the paths reach through one-to-many relations, so
/// per-object traversal hits the cache.
fn preload<'p>(session: &mut Session, paths: impl Iterator<Item = &'p Path>) -> QueryResult<()> {
    let mut types: Vec<ObjectType> = paths.flat_map(Path::bulk_types).collect();
    types.sort();
    types.dedup();
    for object_type in types {
        if !session.is_fully_loaded(object_type) {
            debug!(object_type = %object_type, "preloading related type");
            session.preload_type(object_type)?;
        }
    }
    Ok(())
}

impl fmt::Display for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<QuerySet {}", self.object_type)?;
        let mut sep = ": ";
        for stage in &self.stages {
            write!(f, "{sep}{stage}")?;
            sep = ", ";
        }
        if !self.ordering.is_empty() {
            write!(f, "{sep}order_by(")?;
            for (i, field) in self.ordering.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                if field.descending {
                    f.write_str("-")?;
                }
                write!(f, "{}", field.path)?;
            }
            f.write_str(")")?;
        }
        f.write_str(">")
    }
}

impl fmt::Debug for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("object_type", &self.object_type)
            .field("keys", &self.keys.len())
            .field("stages", &self.stages.len())
            .field("evaluated", &self.results.is_some())
            .finish()
    }
}
