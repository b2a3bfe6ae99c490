//! Field type descriptors for entity schemas.

use std::fmt;

use time::OffsetDateTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collections::LtVec;
use crate::document::Document;
use crate::value::Value;

/// Primitive or container kind of a declared entity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldType {
    /// Accepts any value; defaults to nil.
    Any,
    /// Boolean; defaults to `false`.
    Bool,
    /// 64-bit integer; defaults to 0.
    Int,
    /// 64-bit float; defaults to 0.0.
    Float,
    /// String; defaults to empty.
    String,
    /// Entity identity; defaults to nil.
    Id,
    /// Timestamp; defaults to the moment the default is requested.
    Timestamp,
    /// List; defaults to empty.
    List,
    /// Nested document; defaults to empty.
    Map,
}

impl FieldType {
    /// The value a fresh entity receives for a field of this type.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Any | Self::Id => Value::Nil,
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::from(""),
            Self::Timestamp => Value::Timestamp(OffsetDateTime::now_utc()),
            Self::List => Value::List(LtVec::new()),
            Self::Map => Value::Map(Document::new()),
        }
    }

    /// Returns true for mutable container kinds.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::List | Self::Map)
    }

    /// Checks whether a value may be stored in a field of this type.
    ///
    /// Nil is accepted everywhere, and a float field accepts ints.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) | (_, Value::Nil) | (Self::Float, Value::Int(_)) => true,
            (expected, value) => expected == value.field_type(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Id => "id",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
        };
        write!(f, "{name}")
    }
}
