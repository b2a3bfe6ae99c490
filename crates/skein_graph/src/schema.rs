//! Entity type declarations.
//!
//! An [`EntityType`] names a collection and declares its fields, its
//! relationship terminals and its traversals. Declarations are validated
//! once, when the type is registered with a [`Graph`](crate::Graph).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use skein_foundation::document::ID_FIELD;
use skein_foundation::{Error, ErrorKind, FieldType, Result, Value};
use skein_store::Query;

use crate::node::Node;

/// Creation timestamp field present on every entity.
pub const CREATED_AT: &str = "createdAt";
/// Last write timestamp field present on every entity.
pub const LAST_MODIFIED: &str = "lastModified";
/// Rendered form of the identity. Never stored.
pub const GUID: &str = "guid";

/// Names no field, terminal or traversal may use.
pub const RESERVED_NAMES: [&str; 5] = ["messages", "terminals", "fields", "traversals", GUID];

// =============================================================================
// Direction and kind
// =============================================================================

/// Which side of an edge a terminal stands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// The owner is the edge's outbound endpoint and may create or delete it.
    Outbound,
    /// The owner is the edge's inbound endpoint. Read-only.
    Inbound,
    /// Either role, between entities of the same type.
    Bidirectional,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => write!(f, "OUTBOUND"),
            Self::Inbound => write!(f, "INBOUND"),
            Self::Bidirectional => write!(f, "BIDIRECTIONAL"),
        }
    }
}

/// Cardinality of a terminal, also recorded on its edges as `terminalType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminalKind {
    /// At most one target.
    Node,
    /// Any number of targets.
    List,
}

impl TerminalKind {
    /// The `terminalType` string stored on edges.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::List => "list_of_nodes",
        }
    }

    /// Parses a stored `terminalType` string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(Self::Node),
            "list_of_nodes" => Some(Self::List),
            _ => None,
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

/// Declaration of one stored field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Accepted value kind.
    pub ty: FieldType,
    /// Value used when a document lacks the field.
    pub default: Option<Value>,
    /// Included in `render`.
    pub render: bool,
    /// Assignable through `update`.
    pub update: bool,
}

impl FieldDef {
    /// Creates a rendered, updatable field with the type's default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            render: true,
            update: true,
        }
    }

    /// Sets an explicit default.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Excludes the field from `render`.
    #[must_use]
    pub fn no_render(mut self) -> Self {
        self.render = false;
        self
    }

    /// Excludes the field from `update`.
    #[must_use]
    pub fn no_update(mut self) -> Self {
        self.update = false;
        self
    }

    /// The value a document without this field starts with.
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.ty.default_value())
    }
}

// =============================================================================
// Terminals
// =============================================================================

/// Ordering applied to a list terminal's members.
pub type ListSort = Arc<dyn Fn(&Node, &Node) -> Ordering + Send + Sync>;

/// Declaration of one relationship terminal.
#[derive(Clone)]
pub struct TerminalDef {
    /// Collection of the entities on the other end.
    pub target: String,
    /// Single node or list.
    pub kind: TerminalKind,
    /// Side of the edge the owner stands on.
    pub direction: Direction,
    /// Edge name to match when the owner is the inbound side.
    pub inbound_name: Option<String>,
    /// Create and attach a target on first access when none exists.
    pub create_on_request: bool,
    /// Declared edge attributes; `Some` makes an attributed list.
    pub attributes: Option<Vec<String>>,
    /// Member ordering. Defaults to edge identity, newest first.
    pub sort: Option<ListSort>,
    /// Extra condition on the edge query. Bypasses the cache.
    pub edge_filter: Option<Query>,
    /// Included in the owner's `render`.
    pub render: bool,
    /// Keep a journal of membership changes until the next save.
    pub record_changes: bool,
}

impl TerminalDef {
    fn new(target: impl Into<String>, kind: TerminalKind, direction: Direction) -> Self {
        Self {
            target: target.into(),
            kind,
            direction,
            inbound_name: None,
            create_on_request: false,
            attributes: None,
            sort: None,
            edge_filter: None,
            render: false,
            record_changes: false,
        }
    }

    /// A single outbound reference.
    #[must_use]
    pub fn outbound_node(target: impl Into<String>) -> Self {
        Self::new(target, TerminalKind::Node, Direction::Outbound)
    }

    /// The inbound view of another type's outbound node or list named
    /// `inbound_name`.
    #[must_use]
    pub fn inbound_node(target: impl Into<String>, inbound_name: impl Into<String>) -> Self {
        let mut def = Self::new(target, TerminalKind::Node, Direction::Inbound);
        def.inbound_name = Some(inbound_name.into());
        def
    }

    /// An outbound list.
    #[must_use]
    pub fn outbound_list(target: impl Into<String>) -> Self {
        Self::new(target, TerminalKind::List, Direction::Outbound)
    }

    /// The inbound view of another type's outbound terminal named
    /// `inbound_name`, as a list.
    #[must_use]
    pub fn inbound_list(target: impl Into<String>, inbound_name: impl Into<String>) -> Self {
        let mut def = Self::new(target, TerminalKind::List, Direction::Inbound);
        def.inbound_name = Some(inbound_name.into());
        def
    }

    /// A list that follows edges in both directions. Only valid when the
    /// target is the owner's own type.
    #[must_use]
    pub fn bidirectional_list(target: impl Into<String>) -> Self {
        Self::new(target, TerminalKind::List, Direction::Bidirectional)
    }

    /// Creates a target on first access when none is attached.
    #[must_use]
    pub fn create_on_request(mut self) -> Self {
        self.create_on_request = true;
        self
    }

    /// Declares the attributes each membership edge may carry.
    #[must_use]
    pub fn with_attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Orders members with `sort` instead of edge recency.
    #[must_use]
    pub fn with_sort(mut self, sort: impl Fn(&Node, &Node) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Arc::new(sort));
        self
    }

    /// Restricts the edges the terminal sees.
    #[must_use]
    pub fn with_edge_filter(mut self, filter: Query) -> Self {
        self.edge_filter = Some(filter);
        self
    }

    /// Includes the terminal in the owner's `render`.
    #[must_use]
    pub fn render(mut self) -> Self {
        self.render = true;
        self
    }

    /// Journals membership changes.
    #[must_use]
    pub fn record_changes(mut self) -> Self {
        self.record_changes = true;
        self
    }

    /// Name carried by the edges this terminal reads.
    #[must_use]
    pub fn edge_name<'a>(&'a self, declared: &'a str) -> &'a str {
        self.inbound_name.as_deref().unwrap_or(declared)
    }

    /// Returns true if the attribute is declared.
    #[must_use]
    pub fn allows_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .as_ref()
            .is_some_and(|attrs| attrs.iter().any(|a| a == attribute))
    }
}

impl fmt::Debug for TerminalDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalDef")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("inbound_name", &self.inbound_name)
            .field("create_on_request", &self.create_on_request)
            .field("attributes", &self.attributes)
            .field("sort", &self.sort.is_some())
            .field("edge_filter", &self.edge_filter)
            .field("render", &self.render)
            .field("record_changes", &self.record_changes)
            .finish()
    }
}

// =============================================================================
// Traversals
// =============================================================================

/// Declaration of a read-only value one hop across a terminal.
#[derive(Clone, Debug, PartialEq)]
pub struct TraversalDef {
    /// `terminal.field`.
    pub path: String,
    /// Returned when nothing resolves.
    pub default_value: Value,
    /// Field of the owner consulted before `default_value`.
    pub default_field: Option<String>,
    /// Included in `render`.
    pub render: bool,
}

impl TraversalDef {
    /// Declares a traversal over `terminal.field`. `count` and `exists`
    /// are understood as special fields.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_value: Value::Nil,
            default_field: None,
            render: true,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Falls back to another field of the owner.
    #[must_use]
    pub fn default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = Some(field.into());
        self
    }

    /// Excludes the traversal from `render`.
    #[must_use]
    pub fn no_render(mut self) -> Self {
        self.render = false;
        self
    }

    /// Terminal the traversal reads through.
    #[must_use]
    pub fn terminal_name(&self) -> &str {
        self.path.split_once('.').map_or(self.path.as_str(), |(t, _)| t)
    }

    /// Field read off the target.
    #[must_use]
    pub fn field_name(&self) -> &str {
        self.path.split_once('.').map_or("", |(_, f)| f)
    }
}

// =============================================================================
// Entity types
// =============================================================================

/// A collection together with its fields, terminals and traversals.
#[derive(Clone, Debug)]
pub struct EntityType {
    /// Backing collection name.
    pub collection: String,
    /// Declared fields, defaults first.
    pub fields: Vec<FieldDef>,
    /// Declared terminals in declaration order.
    pub terminals: Vec<(String, TerminalDef)>,
    /// Declared traversals in declaration order.
    pub traversals: Vec<(String, TraversalDef)>,
}

impl EntityType {
    /// Creates a type with the default `_id`, `createdAt` and
    /// `lastModified` fields.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: default_fields(),
            terminals: Vec::new(),
            traversals: Vec::new(),
        }
    }

    /// The built-in edge type stored in `collection`.
    #[must_use]
    pub fn edge(collection: impl Into<String>) -> Self {
        use crate::edge::{
            DATA, INBOUND_COLLECTION, INBOUND_ID, NAME, OUTBOUND_COLLECTION, OUTBOUND_ID,
            TERMINAL_TYPE,
        };

        Self::new(collection)
            .with_field(FieldDef::new(INBOUND_ID, FieldType::Id))
            .with_field(FieldDef::new(INBOUND_COLLECTION, FieldType::String))
            .with_field(FieldDef::new(NAME, FieldType::String))
            .with_field(FieldDef::new(OUTBOUND_ID, FieldType::Id))
            .with_field(FieldDef::new(OUTBOUND_COLLECTION, FieldType::String))
            .with_field(FieldDef::new(TERMINAL_TYPE, FieldType::String))
            .with_field(FieldDef::new(DATA, FieldType::Map))
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a terminal.
    #[must_use]
    pub fn with_terminal(mut self, name: impl Into<String>, terminal: TerminalDef) -> Self {
        self.terminals.push((name.into(), terminal));
        self
    }

    /// Adds a traversal.
    #[must_use]
    pub fn with_traversal(mut self, name: impl Into<String>, traversal: TraversalDef) -> Self {
        self.traversals.push((name.into(), traversal));
        self
    }

    /// Returns the field declaration by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the position of a terminal.
    #[must_use]
    pub fn terminal_index(&self, name: &str) -> Option<usize> {
        self.terminals.iter().position(|(n, _)| n == name)
    }

    /// Returns the terminal declaration by name.
    #[must_use]
    pub fn terminal(&self, name: &str) -> Option<&TerminalDef> {
        self.terminals.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Returns the traversal declaration by name.
    #[must_use]
    pub fn traversal(&self, name: &str) -> Option<&TraversalDef> {
        self.traversals.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Returns true if any field, terminal or traversal uses the name.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.field(name).is_some() || self.terminal(name).is_some() || self.traversal(name).is_some()
    }

    /// Checks the declarations for collisions and unusable terminals.
    ///
    /// # Errors
    ///
    /// - `NamingConflict` if a name is reserved or declared twice, or a
    ///   traversal path is not `terminal.field`
    /// - `UnknownTerminal` if a traversal names an undeclared terminal
    /// - `DirectionViolation` if a bidirectional terminal targets another type
    /// - `UnsupportedOperation` if a single-node terminal declares attributes
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let names = self
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.terminals.iter().map(|(n, _)| n.as_str()))
            .chain(self.traversals.iter().map(|(n, _)| n.as_str()));
        for name in names {
            if RESERVED_NAMES.contains(&name) || !seen.insert(name) {
                return Err(Error::naming_conflict(name, &self.collection));
            }
        }

        for (name, terminal) in &self.terminals {
            if terminal.direction == Direction::Bidirectional && terminal.target != self.collection {
                return Err(Error::direction_violation(format!(
                    "bidirectional terminal {name} on {} targets {}",
                    self.collection, terminal.target
                )));
            }
            if terminal.kind == TerminalKind::Node && terminal.attributes.is_some() {
                return Err(Error::new(ErrorKind::UnsupportedOperation(
                    format!("terminal {name} on {} declares attributes but is not a list", self.collection),
                )));
            }
        }

        for (name, traversal) in &self.traversals {
            if traversal.path.split('.').count() != 2 {
                return Err(Error::naming_conflict(
                    format!("{name} ({})", traversal.path),
                    &self.collection,
                ));
            }
            if self.terminal(traversal.terminal_name()).is_none() {
                return Err(Error::new(ErrorKind::UnknownTerminal {
                    name: traversal.terminal_name().to_string(),
                    owner: self.collection.clone(),
                }));
            }
        }
        Ok(())
    }
}

fn default_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new(ID_FIELD, FieldType::Id).no_render().no_update(),
        FieldDef::new(CREATED_AT, FieldType::Timestamp).no_update(),
        FieldDef::new(LAST_MODIFIED, FieldType::Timestamp).no_update(),
    ]
}

/// Returns true if the name belongs to a default field.
#[must_use]
pub fn is_default_field(name: &str) -> bool {
    matches!(name, ID_FIELD | CREATED_AT | LAST_MODIFIED)
}
