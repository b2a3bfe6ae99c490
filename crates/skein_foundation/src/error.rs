//! Error types for skein.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::id::ObjectId;

/// The main error type for skein operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a naming conflict error.
    #[must_use]
    pub fn naming_conflict(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::new(ErrorKind::NamingConflict {
            name: name.into(),
            owner: owner.into(),
        })
    }

    /// Creates a direction violation error.
    #[must_use]
    pub fn direction_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DirectionViolation(message.into()))
    }

    /// Creates a type mismatch error for a terminal assignment.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates an unknown edge attribute error.
    #[must_use]
    pub fn unknown_attribute(attribute: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownAttribute {
            attribute: attribute.into(),
            terminal: terminal.into(),
        })
    }

    /// Creates an unsupported cache query error.
    #[must_use]
    pub fn unsupported_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedQueryCapability(message.into()))
    }

    /// Creates an inconsistent edge state error.
    #[must_use]
    pub fn inconsistent_edge(edge: ObjectId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentEdgeState {
            edge,
            message: message.into(),
        })
    }

    /// Creates a backing store failure.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store(message.into()))
    }

    /// Returns true if the caller is expected to recover from this error.
    ///
    /// Only an unsupported cache query qualifies: the same query can be
    /// retried against the backing store.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::UnsupportedQueryCapability(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A field, terminal or traversal name collides with a reserved name or another declaration.
    #[error("naming conflict: {name} on {owner}")]
    NamingConflict {
        /// The conflicting name.
        name: String,
        /// The entity type (or terminal) that declared it.
        owner: String,
    },

    /// A mutating operation was attempted against the wrong relationship direction.
    #[error("direction violation: {0}")]
    DirectionViolation(String),

    /// An entity of the wrong collection was assigned to a terminal.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The collection the terminal accepts.
        expected: String,
        /// The collection that was offered.
        actual: String,
    },

    /// An edge attribute that the attributed list does not declare.
    #[error("unknown attribute: {attribute} on terminal {terminal}")]
    UnknownAttribute {
        /// The rejected attribute key.
        attribute: String,
        /// The terminal that rejected it.
        terminal: String,
    },

    /// The cache cannot evaluate the query; retry against the backing store.
    #[error("unsupported cache query: {0}")]
    UnsupportedQueryCapability(String),

    /// An edge's recorded collection contradicts the terminal's declaration.
    #[error("inconsistent edge state on {edge}: {message}")]
    InconsistentEdgeState {
        /// The offending edge.
        edge: ObjectId,
        /// Description of the mismatch.
        message: String,
    },

    /// A bulk update named fields the entity type does not declare.
    #[error("unknown fields {fields:?} on {owner}")]
    UnknownField {
        /// The undeclared field names.
        fields: Vec<String>,
        /// The entity type.
        owner: String,
    },

    /// No terminal with this name is declared.
    #[error("unknown terminal: {name} on {owner}")]
    UnknownTerminal {
        /// The terminal name.
        name: String,
        /// The entity type.
        owner: String,
    },

    /// No traversal with this name is declared.
    #[error("unknown traversal: {name} on {owner}")]
    UnknownTraversal {
        /// The traversal name.
        name: String,
        /// The entity type.
        owner: String,
    },

    /// No entity type is registered for the collection.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// The operation is not supported by this kind of view.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Edge constructor arguments were not usable entities.
    #[error("invalid edge parameter: {0}")]
    InvalidEdgeParameter(String),

    /// The backing store reported a failure.
    #[error("store error: {0}")]
    Store(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Collection of the entity involved.
    pub collection: Option<String>,
    /// Identity of the entity involved.
    pub entity: Option<ObjectId>,
    /// Chain of terminals traversed before the failure.
    pub path: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the entity identity.
    #[must_use]
    pub fn with_entity(mut self, id: ObjectId) -> Self {
        self.entity = Some(id);
        self
    }

    /// Adds a path segment.
    #[must_use]
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(collection) = &self.collection {
            write!(f, "in {collection}")?;
            if let Some(id) = self.entity {
                write!(f, ":{id}")?;
            }
        }
        if !self.path.is_empty() {
            write!(f, " via {}", self.path.join("."))?;
        }
        Ok(())
    }
}
