//! Core values, identities, and error types for skein.
//!
//! This crate provides:
//! - [`Value`] - The dynamic value type stored in entity fields
//! - [`Document`] - An ordered field map, the unit of persistence
//! - [`ObjectId`] - Creation-ordered, sortable entity identities
//! - [`FieldType`] - Primitive field kinds for schema declarations
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod document;
pub mod error;
pub mod id;
pub mod types;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use document::Document;
pub use error::{Error, ErrorContext, ErrorKind};
pub use id::ObjectId;
pub use types::FieldType;
pub use value::Value;

/// Result type alias using skein's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use skein_foundation::doc;
///
/// let d = doc! { "name" => "ada", "age" => 36 };
/// assert_eq!(d.get("age").and_then(|v| v.as_int()), Some(36));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(
            document.set($key, $crate::Value::from($value));
        )+
        document
    }};
}
