//! Query language, sort specifications and cursor options.
//!
//! This module provides:
//! - [`Query`] - Predicate tree over document fields
//! - [`Condition`] - Comparison applied to one field
//! - [`Sort`] - Ordered list of sort keys
//! - [`FindOptions`] - Sort, skip and limit for a cursor

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use skein_foundation::document::ID_FIELD;
use skein_foundation::{Document, ObjectId, Value};

// =============================================================================
// Conditions
// =============================================================================

/// A comparison applied to the value found at one field path.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Field equals the value, or is a list containing it.
    Eq(Value),
    /// Negation of [`Condition::Eq`]. Missing fields match.
    Ne(Value),
    /// Field equals any of the values.
    In(Vec<Value>),
    /// Field equals none of the values. Missing fields match.
    Nin(Vec<Value>),
    /// Field is strictly greater, within the same sort bracket.
    Gt(Value),
    /// Field is greater or equal, within the same sort bracket.
    Gte(Value),
    /// Field is strictly less, within the same sort bracket.
    Lt(Value),
    /// Field is less or equal, within the same sort bracket.
    Lte(Value),
    /// Field presence matches the flag.
    Exists(bool),
}

impl Condition {
    /// Operator name as written in the store's query language.
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Eq(_) => "$eq",
            Self::Ne(_) => "$ne",
            Self::In(_) => "$in",
            Self::Nin(_) => "$nin",
            Self::Gt(_) => "$gt",
            Self::Gte(_) => "$gte",
            Self::Lt(_) => "$lt",
            Self::Lte(_) => "$lte",
            Self::Exists(_) => "$exists",
        }
    }

    /// Tests the value found at a field. `None` means the field is absent.
    #[must_use]
    pub fn test(&self, found: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => equals(found, expected),
            Self::Ne(expected) => !equals(found, expected),
            Self::In(options) => options.iter().any(|o| equals(found, o)),
            Self::Nin(options) => !options.iter().any(|o| equals(found, o)),
            Self::Gt(bound) => compares(found, bound, |o| o == Ordering::Greater),
            Self::Gte(bound) => compares(found, bound, |o| o != Ordering::Less),
            Self::Lt(bound) => compares(found, bound, |o| o == Ordering::Less),
            Self::Lte(bound) => compares(found, bound, |o| o != Ordering::Greater),
            Self::Exists(flag) => found.is_some() == *flag,
        }
    }
}

fn equals(found: Option<&Value>, expected: &Value) -> bool {
    match found {
        None => expected.is_nil(),
        Some(value) if value == expected => true,
        Some(Value::List(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

fn compares(found: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = found else {
        return false;
    };
    match value {
        Value::List(items) if !matches!(bound, Value::List(_)) => items
            .iter()
            .any(|item| item.cmp_same_kind(bound).is_some_and(&accept)),
        _ => value.cmp_same_kind(bound).is_some_and(accept),
    }
}

// =============================================================================
// Query
// =============================================================================

/// Predicate tree evaluated against stored documents.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Query {
    /// Matches every document.
    #[default]
    All,
    /// Applies a condition to the value at a (possibly dotted) field path.
    Field {
        /// Field path; dots descend into nested maps.
        path: String,
        /// Condition applied to the field.
        condition: Condition,
    },
    /// Every sub-query matches. An empty conjunction matches everything.
    And(Vec<Query>),
    /// Any sub-query matches. An empty disjunction matches nothing.
    Or(Vec<Query>),
}

impl Query {
    /// Matches every document.
    #[must_use]
    pub const fn all() -> Self {
        Self::All
    }

    /// Starts a condition on a field path.
    #[must_use]
    pub fn field(path: impl Into<String>) -> FieldQuery {
        FieldQuery { path: path.into() }
    }

    /// `{path: value}`.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path).eq(value)
    }

    /// `{_id: id}`.
    #[must_use]
    pub fn id(id: ObjectId) -> Self {
        Self::eq(ID_FIELD, id)
    }

    /// `{_id: {$in: ids}}`.
    #[must_use]
    pub fn id_in(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Self::field(ID_FIELD).is_in(ids.into_iter().map(Value::Id))
    }

    /// Conjunction of sub-queries.
    #[must_use]
    pub fn and(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::And(queries.into_iter().collect())
    }

    /// Disjunction of sub-queries.
    #[must_use]
    pub fn or(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::Or(queries.into_iter().collect())
    }

    /// Conjoins another query onto this one, flattening nested conjunctions
    /// and dropping `All`.
    #[must_use]
    pub fn and_also(self, other: Query) -> Self {
        match (self, other) {
            (Self::All, q) | (q, Self::All) => q,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), q) => {
                left.push(q);
                Self::And(left)
            }
            (q, Self::And(mut right)) => {
                right.insert(0, q);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Evaluates the query against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Field { path, condition } => condition.test(document.get_path(path)),
            Self::And(queries) => queries.iter().all(|q| q.matches(document)),
            Self::Or(queries) => queries.iter().any(|q| q.matches(document)),
        }
    }

    /// Returns the identity this query pins, if it is exactly `{_id: id}`.
    #[must_use]
    pub fn as_id(&self) -> Option<ObjectId> {
        match self {
            Self::Field {
                path,
                condition: Condition::Eq(Value::Id(id)),
            } if path == ID_FIELD => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, op: &str, queries: &[Query]) -> fmt::Result {
            write!(f, "{{{op}: [")?;
            for (i, q) in queries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{q}")?;
            }
            write!(f, "]}}")
        }

        match self {
            Self::All => write!(f, "{{}}"),
            Self::Field { path, condition } => match condition {
                Condition::Eq(v) => write!(f, "{{{path}: {v}}}"),
                Condition::In(vs) | Condition::Nin(vs) => {
                    write!(f, "{{{path}: {{{}: {}}}}}", condition.operator(), Value::from(vs.clone()))
                }
                Condition::Exists(flag) => write!(f, "{{{path}: {{$exists: {flag}}}}}"),
                Condition::Ne(v)
                | Condition::Gt(v)
                | Condition::Gte(v)
                | Condition::Lt(v)
                | Condition::Lte(v) => write!(f, "{{{path}: {{{}: {v}}}}}", condition.operator()),
            },
            Self::And(queries) => join(f, "$and", queries),
            Self::Or(queries) => join(f, "$or", queries),
        }
    }
}

/// Builder for a single-field condition, returned by [`Query::field`].
#[derive(Clone, Debug)]
pub struct FieldQuery {
    path: String,
}

impl FieldQuery {
    fn with(self, condition: Condition) -> Query {
        Query::Field {
            path: self.path,
            condition,
        }
    }

    /// `{path: value}`.
    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Eq(value.into()))
    }

    /// `{path: {$ne: value}}`.
    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Ne(value.into()))
    }

    /// `{path: {$in: values}}`.
    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// `{path: {$nin: values}}`.
    #[must_use]
    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(Condition::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// `{path: {$gt: value}}`.
    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Gt(value.into()))
    }

    /// `{path: {$gte: value}}`.
    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Gte(value.into()))
    }

    /// `{path: {$lt: value}}`.
    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Lt(value.into()))
    }

    /// `{path: {$lte: value}}`.
    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Query {
        self.with(Condition::Lte(value.into()))
    }

    /// `{path: {$exists: flag}}`.
    #[must_use]
    pub fn exists(self, flag: bool) -> Query {
        self.with(Condition::Exists(flag))
    }
}

// =============================================================================
// Sorting
// =============================================================================

/// Direction of one sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Orients an ascending comparison result for this direction.
    #[must_use]
    pub const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// Ordered list of `(field, direction)` sort keys.
///
/// The default sort is identity descending, which is newest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort(Vec<(String, SortDirection)>);

impl Default for Sort {
    fn default() -> Self {
        Self::by(ID_FIELD, SortDirection::Descending)
    }
}

impl Sort {
    /// A sort with no keys; results come back in store order.
    #[must_use]
    pub const fn unsorted() -> Self {
        Self(Vec::new())
    }

    /// A single-key sort.
    #[must_use]
    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Self(vec![(field.into(), direction)])
    }

    /// Appends a lower-priority key.
    #[must_use]
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    /// Keys in priority order.
    #[must_use]
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.0
    }

    /// The highest-priority key.
    #[must_use]
    pub fn primary(&self) -> Option<(&str, SortDirection)> {
        self.0.first().map(|(f, d)| (f.as_str(), *d))
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compares two documents key by key. Missing fields sort as nil.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let nil = Value::Nil;
        for (field, direction) in &self.0 {
            let left = a.get_path(field).unwrap_or(&nil);
            let right = b.get_path(field).unwrap_or(&nil);
            let ordering = direction.apply(left.cmp(right));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

// =============================================================================
// Find Options
// =============================================================================

/// Sort, skip and limit applied to a cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Result ordering.
    pub sort: Sort,
    /// Number of leading results to discard.
    pub skip: usize,
    /// Maximum number of results, if bounded.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Default options: identity descending, no skip, no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort.
    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the skip count.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
