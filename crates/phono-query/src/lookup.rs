//! Lookup strings: `field__subfield__op`.
//!
//! A lookup is parsed once against the queried type. Every path step is
//! checked up front, so a misspelt attribute fails when the queryset is
//! built rather than halfway through evaluation.

use std::collections::HashSet;
use std::fmt;

use phono_model::{Relation, Session};
use phono_types::{Identifier, ObjectType};
use regex::{Regex, RegexBuilder};

use crate::attr::{self, Step};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

const SEPARATOR: &str = "__";

/// Terminal comparison of a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
    In,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IExact,
    Regex,
    IRegex,
    LenEq,
    LenGt,
    LenLt,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Self::Eq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "range" => Self::Range,
            "in" => Self::In,
            "contains" => Self::Contains,
            "icontains" => Self::IContains,
            "startswith" => Self::StartsWith,
            "istartswith" => Self::IStartsWith,
            "endswith" => Self::EndsWith,
            "iendswith" => Self::IEndsWith,
            "iexact" => Self::IExact,
            "regex" => Self::Regex,
            "iregex" => Self::IRegex,
            "len" | "len_eq" => Self::LenEq,
            "len_gt" => Self::LenGt,
            "len_lt" => Self::LenLt,
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Range => "in range",
            Self::In => "in",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::IExact => "iexact",
            Self::Regex => "~",
            Self::IRegex => "~*",
            Self::LenEq => "len ==",
            Self::LenGt => "len >",
            Self::LenLt => "len <",
        }
    }

    fn wants_text(self) -> bool {
        matches!(
            self,
            Self::IContains
                | Self::StartsWith
                | Self::IStartsWith
                | Self::EndsWith
                | Self::IEndsWith
                | Self::IExact
                | Self::Regex
                | Self::IRegex
        )
    }
}

/// A validated attribute path, optionally measured with `len`.
#[derive(Clone, Debug)]
pub struct Path {
    root: ObjectType,
    parts: Vec<(String, Step)>,
    measure_len: bool,
}

impl Path {
    /// Parse a `__`-separated path (no operator) on `root`.
    pub fn parse(root: ObjectType, raw: &str) -> QueryResult<Self> {
        let names: Vec<&str> = raw.split(SEPARATOR).collect();
        Self::from_names(root, raw, &names)
    }

    fn from_names(root: ObjectType, raw: &str, names: &[&str]) -> QueryResult<Self> {
        let mut names = names;
        let mut measure_len = false;
        if names.len() > 1 && names.last() == Some(&"len") {
            measure_len = true;
            names = &names[..names.len() - 1];
        }
        if names.is_empty() || names.iter().any(|n| n.is_empty()) {
            return Err(QueryError::invalid(raw, "empty path segment"));
        }

        let mut owner = root;
        let mut parts = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let step = attr::step(owner, name)?;
            match step {
                Step::Relation(_, target) => owner = target,
                Step::Scalar if i + 1 < names.len() => {
                    return Err(QueryError::invalid(
                        raw,
                        format!("'{name}' is not a relation of {owner}"),
                    ));
                }
                Step::Scalar => {}
            }
            parts.push((name.to_string(), step));
        }
        Ok(Self {
            root,
            parts,
            measure_len,
        })
    }

    /// Types reached through one-to-many relations, in path order. These
    /// are the types worth loading in bulk before evaluating the path.
    pub fn bulk_types(&self) -> Vec<ObjectType> {
        let mut out = Vec::new();
        let mut owner = self.root;
        for (_, step) in &self.parts {
            let Step::Relation(relation, target) = *step else {
                continue;
            };
            if relation.is_many() {
                match (relation, owner.depth(), target.depth()) {
                    (Relation::Descendants(_), Some(from), Some(to)) => {
                        out.extend(
                            ObjectType::SEGMENTS
                                .into_iter()
                                .filter(|t| t.depth().is_some_and(|d| d > from && d <= to)),
                        );
                    }
                    _ => out.push(target),
                }
            }
            owner = target;
        }
        out.dedup();
        out
    }

    /// Every value the path reaches from `id`. Relations fan out, so one
    /// object can yield many values.
    pub fn resolve(&self, session: &mut Session, id: Identifier) -> QueryResult<Vec<Value>> {
        let Some(((last, last_step), init)) = self.parts.split_last() else {
            return Ok(Vec::new());
        };

        let mut frontier = vec![id];
        for (_, step) in init {
            let Step::Relation(relation, _) = *step else {
                continue;
            };
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for owner in frontier {
                for reached in session.follow(owner, relation)? {
                    if seen.insert(reached) {
                        next.push(reached);
                    }
                }
            }
            frontier = next;
        }

        let mut values = Vec::with_capacity(frontier.len());
        for owner in frontier {
            let value = match *last_step {
                Step::Scalar => attr::scalar(session, owner, last)?,
                Step::Relation(relation, _) => {
                    let reached = session.follow(owner, relation)?;
                    if relation.is_many() {
                        Value::List(reached.into_iter().map(Value::Id).collect())
                    } else {
                        reached.first().copied().map(Value::Id).unwrap_or(Value::Null)
                    }
                }
            };
            values.push(value);
        }

        if self.measure_len {
            values = values
                .iter()
                .filter_map(|v| v.len().map(Value::from))
                .collect();
        }
        Ok(values)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, _)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(name)?;
        }
        if self.measure_len {
            f.write_str(".len")?;
        }
        Ok(())
    }
}

/// One parsed `path__op = value` condition.
#[derive(Clone, Debug)]
pub struct Lookup {
    path: Path,
    op: Operator,
    operand: Value,
    pattern: Option<Regex>,
}

impl Lookup {
    pub fn parse(root: ObjectType, raw: &str, operand: Value) -> QueryResult<Self> {
        let mut names: Vec<&str> = raw.split(SEPARATOR).collect();
        let op = match names.last().and_then(|n| Operator::parse(n)) {
            Some(op) if names.len() > 1 => {
                names.pop();
                op
            }
            _ => Operator::Eq,
        };
        let path = Path::from_names(root, raw, &names)?;
        let pattern = Self::check_operand(raw, op, &operand)?;
        Ok(Self {
            path,
            op,
            operand,
            pattern,
        })
    }

    fn check_operand(raw: &str, op: Operator, operand: &Value) -> QueryResult<Option<Regex>> {
        match op {
            Operator::Range => match operand {
                Value::List(bounds) if bounds.len() == 2 => Ok(None),
                _ => Err(QueryError::invalid(raw, "range needs two bounds")),
            },
            Operator::In => match operand {
                Value::List(_) => Ok(None),
                _ => Err(QueryError::invalid(raw, "in needs a list")),
            },
            Operator::LenEq | Operator::LenGt | Operator::LenLt => match operand {
                Value::Int(_) => Ok(None),
                _ => Err(QueryError::invalid(raw, "length must be an integer")),
            },
            Operator::Regex | Operator::IRegex => {
                let source = operand
                    .as_str()
                    .ok_or_else(|| QueryError::invalid(raw, "pattern must be a string"))?;
                let re = RegexBuilder::new(source)
                    .case_insensitive(op == Operator::IRegex)
                    .build()?;
                Ok(Some(re))
            }
            op if op.wants_text() && operand.as_str().is_none() => {
                Err(QueryError::invalid(raw, "operand must be a string"))
            }
            _ => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    /// Existential match: true when any value reached by the path passes.
    pub fn matches(&self, session: &mut Session, id: Identifier) -> QueryResult<bool> {
        let values = self.path.resolve(session, id)?;
        Ok(values.iter().any(|v| self.passes(v)))
    }

    fn passes(&self, value: &Value) -> bool {
        use std::cmp::Ordering::*;

        let operand = &self.operand;
        let text = || value.as_str().zip(operand.as_str());
        match self.op {
            Operator::Eq => value.loosely_eq(operand),
            Operator::Gt => value.compare(operand) == Some(Greater),
            Operator::Gte => matches!(value.compare(operand), Some(Greater | Equal)),
            Operator::Lt => value.compare(operand) == Some(Less),
            Operator::Lte => matches!(value.compare(operand), Some(Less | Equal)),
            Operator::Range => match operand {
                Value::List(bounds) => match bounds.as_slice() {
                    [lo, hi] => {
                        matches!(value.compare(lo), Some(Greater | Equal))
                            && matches!(value.compare(hi), Some(Less | Equal))
                    }
                    _ => false,
                },
                _ => false,
            },
            Operator::In => match operand {
                Value::List(items) => items.iter().any(|i| value.loosely_eq(i)),
                _ => false,
            },
            Operator::Contains => match (value, operand) {
                (Value::Str(s), Value::Str(needle)) => s.contains(needle.as_str()),
                (Value::List(items), needle) => items.iter().any(|i| i.loosely_eq(needle)),
                _ => false,
            },
            Operator::IContains => {
                text().is_some_and(|(s, n)| s.to_lowercase().contains(&n.to_lowercase()))
            }
            Operator::StartsWith => text().is_some_and(|(s, n)| s.starts_with(n)),
            Operator::IStartsWith => {
                text().is_some_and(|(s, n)| s.to_lowercase().starts_with(&n.to_lowercase()))
            }
            Operator::EndsWith => text().is_some_and(|(s, n)| s.ends_with(n)),
            Operator::IEndsWith => {
                text().is_some_and(|(s, n)| s.to_lowercase().ends_with(&n.to_lowercase()))
            }
            Operator::IExact => text().is_some_and(|(s, n)| s.to_lowercase() == n.to_lowercase()),
            Operator::Regex | Operator::IRegex => match (&self.pattern, value.as_str()) {
                (Some(re), Some(s)) => re.is_match(s),
                _ => false,
            },
            Operator::LenEq | Operator::LenGt | Operator::LenLt => {
                let (Some(len), Some(want)) = (value.len(), operand.as_int()) else {
                    return false;
                };
                let len = i64::try_from(len).unwrap_or(i64::MAX);
                match self.op {
                    Operator::LenEq => len == want,
                    Operator::LenGt => len > want,
                    _ => len < want,
                }
            }
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.op.symbol(), self.operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lookup(raw: &str, v: impl Into<Value>) -> Lookup {
        Lookup::parse(ObjectType::Word, raw, v.into()).unwrap()
    }

    #[test]
    fn operator_defaults_to_equality() {
        assert_eq!(lookup("label", "a").operator(), Operator::Eq);
        assert_eq!(lookup("label__icontains", "a").operator(), Operator::IContains);
        assert_eq!(lookup("label__len", 3).operator(), Operator::LenEq);
    }

    #[test]
    fn len_transform_before_operator() {
        let l = lookup("label__len__gt", 3);
        assert_eq!(l.operator(), Operator::Gt);
        assert_eq!(l.to_string(), "label.len > 3");
        assert!(l.passes(&Value::Int(4)));
    }

    #[test]
    fn paths_are_validated() {
        let err = Lookup::parse(ObjectType::Phrase, "words__colour", "x".into()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownAttribute { object_type: ObjectType::Word, .. }));
        let err = Lookup::parse(ObjectType::Phrase, "label__phones", "x".into()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidLookup { .. }));
        assert!(Lookup::parse(ObjectType::Phrase, "words____label", "x".into()).is_err());
    }

    #[test]
    fn operands_are_checked() {
        assert!(Lookup::parse(ObjectType::Word, "start__range", Value::Int(1)).is_err());
        assert!(Lookup::parse(ObjectType::Word, "label__regex", Value::from("(")).is_err());
        assert!(Lookup::parse(ObjectType::Word, "label__len_gt", Value::from("3")).is_err());
        assert!(Lookup::parse(ObjectType::Word, "label__startswith", Value::Int(3)).is_err());
    }

    #[test]
    fn bulk_types_cover_intermediate_levels() {
        let path = Path::parse(ObjectType::Phrase, "words__phones__label").unwrap();
        assert_eq!(
            path.bulk_types(),
            vec![ObjectType::Word, ObjectType::Syllable, ObjectType::Phone]
        );
        let path = Path::parse(ObjectType::Phone, "word__label").unwrap();
        assert!(path.bulk_types().is_empty());
        let path = Path::parse(ObjectType::Audio, "speakers__name").unwrap();
        assert_eq!(path.bulk_types(), vec![ObjectType::Speaker]);
    }

    #[test]
    fn string_operators() {
        let v = Value::from("Hello");
        assert!(lookup("label__istartswith", "he").passes(&v));
        assert!(!lookup("label__startswith", "he").passes(&v));
        assert!(lookup("label__iendswith", "LO").passes(&v));
        assert!(lookup("label__iexact", "hello").passes(&v));
        assert!(lookup("label__contains", "ell").passes(&v));
        assert!(lookup("label__iregex", "^h.l+o$").passes(&v));
        assert!(!lookup("label__regex", "^h").passes(&v));
        assert!(lookup("label__in", ["Hello", "x"]).passes(&v));
        assert!(lookup("label__len_lt", 6).passes(&v));
    }

    proptest! {
        #[test]
        fn range_agrees_with_bounds(x in -1000i64..1000, lo in -500i64..0, hi in 0i64..500) {
            let l = lookup("start__range", [lo, hi]);
            prop_assert_eq!(l.passes(&Value::Int(x)), lo <= x && x <= hi);
            let gte = lookup("start__gte", lo);
            let lte = lookup("start__lte", hi);
            prop_assert_eq!(l.passes(&Value::Int(x)), gte.passes(&Value::Int(x)) && lte.passes(&Value::Int(x)));
        }
    }
}
