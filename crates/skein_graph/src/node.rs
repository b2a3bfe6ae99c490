//! Entities.
//!
//! A [`Node`] is the single live instance of one stored document. It owns
//! the declared field values, the last document known to be stored, a dirty
//! flag and one state slot per declared terminal. Nodes are shared as
//! [`NodeRef`]s and register themselves with their graph's
//! [`Registry`](crate::Registry) for as long as any strong reference exists.
//!
//! # Locking
//!
//! The field state mutex is a leaf: nothing else is locked while it is held.
//! A terminal slot mutex may be held while the registry, the store or any
//! entity's field state is consulted, but never while another terminal slot
//! is locked. Changes that must be mirrored on the other endpoint are
//! collected as notices and delivered after the slot is released.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::{debug, trace};

use skein_foundation::document::ID_FIELD;
use skein_foundation::{doc, Document, Error, ErrorKind, FieldType, ObjectId, Result, Value};
use skein_store::Query;

use crate::config::SaveOptions;
use crate::edge::{Edge, INBOUND_ID, OUTBOUND_ID};
use crate::graph::Graph;
use crate::schema::{
    is_default_field, EntityType, FieldDef, CREATED_AT, GUID, LAST_MODIFIED, RESERVED_NAMES,
};
use crate::terminal::TerminalState;

/// Shared handle to a live entity.
pub type NodeRef = Arc<Node>;

/// Identities already handled by one cascading save.
pub(crate) type Visited = HashSet<ObjectId>;

struct NodeState {
    values: Document,
    stored: Document,
    extra: Vec<FieldDef>,
    dirty: bool,
    is_new: bool,
}

impl NodeState {
    /// The persistable form of the declared fields, over whatever else the
    /// stored document carried.
    fn merged(&self) -> Document {
        let mut data = self.stored.clone();
        for (key, value) in self.values.iter() {
            merge_value(&mut data, key, value);
        }
        data
    }
}

/// Nil only overwrites a stored value that was not nil, so absent fields
/// stay absent.
fn merge_value(data: &mut Document, key: &str, value: &Value) {
    if !value.is_nil() {
        data.set(key, value.clone());
    } else if data.get(key).is_some_and(|v| !v.is_nil()) {
        data.set(key, Value::Nil);
    }
}

/// A persisted, identity-bearing entity.
pub struct Node {
    id: ObjectId,
    ty: Arc<EntityType>,
    graph: Graph,
    this: Weak<Node>,
    state: Mutex<NodeState>,
    pub(crate) terminals: Vec<Mutex<TerminalState>>,
}

impl Node {
    /// Builds an unregistered instance. `init` becomes the known stored
    /// document; declared fields it lacks take their defaults.
    pub(crate) fn build(
        graph: &Graph,
        ty: Arc<EntityType>,
        id: ObjectId,
        init: Document,
        dirty: bool,
        is_new: bool,
    ) -> NodeRef {
        let mut values = Document::new();
        for field in &ty.fields {
            let value = init
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| field.default_value());
            values.set(field.name.clone(), value);
        }
        values.set(ID_FIELD, id);

        let terminals = ty
            .terminals
            .iter()
            .map(|(_, def)| Mutex::new(TerminalState::empty(def.kind)))
            .collect();

        Arc::new_cyclic(|this| Self {
            id,
            ty,
            graph: graph.clone(),
            this: this.clone(),
            state: Mutex::new(NodeState {
                values,
                stored: init,
                extra: Vec::new(),
                dirty,
                is_new,
            }),
            terminals,
        })
    }

    // ===== Identity =====

    /// Returns the identity.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the collection this entity lives in.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.ty.collection
    }

    /// Returns the entity's type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.ty
    }

    /// Returns the graph this entity belongs to.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The identity as a string.
    #[must_use]
    pub fn guid(&self) -> String {
        self.id.to_string()
    }

    /// `collection:guid`.
    #[must_use]
    pub fn to_key(&self) -> String {
        format!("{}:{}", self.collection(), self.guid())
    }

    /// `{_id, collection}`.
    #[must_use]
    pub fn to_dbref(&self) -> Document {
        doc! { ID_FIELD => self.id, "collection" => self.collection() }
    }

    /// Returns true until the first successful save.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state.lock().is_new
    }

    /// Returns true if the next save must write regardless of the diff.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub(crate) fn handle(&self) -> Result<NodeRef> {
        self.this.upgrade().ok_or_else(|| {
            Error::new(ErrorKind::Internal(format!("{} is being dropped", self.to_key())))
        })
    }

    // ===== Fields =====

    /// Returns a field's value, or nil.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        let state = self.state.lock();
        state
            .values
            .get(name)
            .or_else(|| state.stored.get(name))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Assigns a field. Undeclared names become new fields of the value's
    /// type.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for `_id` or a traversal name
    /// - `NamingConflict` for a reserved or terminal name
    /// - `TypeMismatch` if a declared field does not accept the value
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_assignable(name)?;
        let mut state = self.state.lock();
        match self.declared_type(&state, name) {
            Some(ty) if !ty.accepts(&value) => {
                return Err(Error::type_mismatch(ty.to_string(), value.field_type().to_string())
                    .with_context(self.context()));
            }
            Some(_) => {}
            None => {
                state.extra.push(FieldDef::new(name, value.field_type()));
                state.dirty = true;
            }
        }
        state.values.set(name, value);
        Ok(())
    }

    /// Edits a declared field in place.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the field is not declared, or
    /// `TypeMismatch` if the edited value no longer fits its type.
    pub fn modify(&self, name: &str, edit: impl FnOnce(&mut Value)) -> Result<()> {
        self.check_assignable(name)?;
        let (ty, mut value) = {
            let state = self.state.lock();
            let ty = self.declared_type(&state, name).ok_or_else(|| self.unknown_fields(vec![name.to_string()]))?;
            (ty, state.values.get(name).cloned().unwrap_or(Value::Nil))
        };
        edit(&mut value);
        if !ty.accepts(&value) {
            return Err(Error::type_mismatch(ty.to_string(), value.field_type().to_string()));
        }
        self.state.lock().values.set(name, value);
        Ok(())
    }

    /// Declares a field on this instance only.
    ///
    /// # Errors
    ///
    /// Returns `NamingConflict` if the name is reserved or already used by a
    /// field, terminal or traversal.
    pub fn add_field(&self, field: FieldDef) -> Result<()> {
        let mut state = self.state.lock();
        if RESERVED_NAMES.contains(&field.name.as_str())
            || self.ty.declares(&field.name)
            || state.extra.iter().any(|f| f.name == field.name)
        {
            return Err(Error::naming_conflict(field.name, self.collection()));
        }
        let value = state
            .stored
            .get(&field.name)
            .cloned()
            .unwrap_or_else(|| field.default_value());
        state.values.set(field.name.clone(), value);
        state.extra.push(field);
        state.dirty = true;
        Ok(())
    }

    /// Drops a field's value from memory and from the next write.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for `_id`, `createdAt` and
    /// `lastModified`.
    pub fn remove_field(&self, name: &str) -> Result<()> {
        if is_default_field(name) {
            return Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                "{name} cannot be removed from {}",
                self.to_key()
            ))));
        }
        let mut state = self.state.lock();
        state.values.remove(name);
        state.stored.remove(name);
        state.extra.retain(|f| f.name != name);
        state.dirty = true;
        Ok(())
    }

    /// Names of every declared field, including instance-only ones.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        let state = self.state.lock();
        self.ty
            .fields
            .iter()
            .chain(&state.extra)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Assigns every updatable field present in `data`. Nothing is assigned
    /// if any key is rejected.
    ///
    /// # Errors
    ///
    /// - `UnknownField` if a key is not a field, terminal, traversal or
    ///   `guid` (only when the graph checks errors)
    /// - `TypeMismatch` if a value does not fit its field
    pub fn update(&self, data: &Document) -> Result<()> {
        let mut state = self.state.lock();
        if self.graph.config().check_errors {
            let unknown: Vec<String> = data
                .keys()
                .filter(|k| {
                    k.as_str() != GUID
                        && !self.ty.declares(k)
                        && !state.extra.iter().any(|f| &f.name == *k)
                })
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(self.unknown_fields(unknown));
            }
        }

        let mut assignments = Vec::new();
        for field in self.ty.fields.iter().chain(&state.extra).filter(|f| f.update) {
            if let Some(value) = data.get(&field.name) {
                if !field.ty.accepts(value) {
                    return Err(Error::type_mismatch(
                        field.ty.to_string(),
                        value.field_type().to_string(),
                    ));
                }
                assignments.push((field.name.clone(), value.clone()));
            }
        }
        for (name, value) in assignments {
            state.values.set(name, value);
        }
        Ok(())
    }

    /// A field or traversal value as seen from another entity. `None` if
    /// the name is neither declared nor stored.
    pub(crate) fn lookup_value(&self, name: &str) -> Result<Option<Value>> {
        if self.ty.traversal(name).is_some() {
            return self.traversal(name).map(Some);
        }
        let state = self.state.lock();
        Ok(state.values.get(name).or_else(|| state.stored.get(name)).cloned())
    }

    /// The value last read from or written to the store.
    pub(crate) fn stored_value(&self, name: &str) -> Option<Value> {
        self.state.lock().stored.get(name).cloned()
    }

    /// Current in-memory document, used for cache queries.
    pub(crate) fn snapshot(&self) -> Document {
        let state = self.state.lock();
        state.stored.overlay(&state.values)
    }

    fn declared_type(&self, state: &NodeState, name: &str) -> Option<FieldType> {
        self.ty
            .field(name)
            .or_else(|| state.extra.iter().find(|f| f.name == name))
            .map(|f| f.ty)
    }

    fn check_assignable(&self, name: &str) -> Result<()> {
        if name == ID_FIELD || self.ty.traversal(name).is_some() {
            return Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                "{name} on {} is read-only",
                self.collection()
            ))));
        }
        if self.ty.terminal(name).is_some() || RESERVED_NAMES.contains(&name) {
            return Err(Error::naming_conflict(name, self.collection()));
        }
        Ok(())
    }

    fn unknown_fields(&self, fields: Vec<String>) -> Error {
        Error::new(ErrorKind::UnknownField {
            fields,
            owner: self.collection().to_string(),
        })
    }

    pub(crate) fn context(&self) -> skein_foundation::ErrorContext {
        skein_foundation::ErrorContext::new()
            .with_collection(self.collection())
            .with_entity(self.id)
    }

    // ===== Documents =====

    /// The document a save would write: declared fields, traversal values
    /// and any other stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a traversal cannot be evaluated.
    pub fn to_document(&self) -> Result<Document> {
        let traversals = self.traversal_values()?;
        let mut data = self.state.lock().merged();
        for (name, value) in &traversals {
            merge_value(&mut data, name, value);
        }
        Ok(data)
    }

    /// Renders the entity and its rendered terminals.
    ///
    /// # Errors
    ///
    /// Returns an error if a traversal or terminal cannot be resolved.
    pub fn render(&self) -> Result<Document> {
        self.render_with(true)
    }

    /// Renders rendered fields and traversals plus `guid`, and, when
    /// `render_terminals` is set, every existing terminal declared with
    /// `render`. Targets are rendered without their own terminals.
    ///
    /// # Errors
    ///
    /// Returns an error if a traversal or terminal cannot be resolved.
    pub fn render_with(&self, render_terminals: bool) -> Result<Document> {
        let mut data = self.to_document()?;
        let hidden: Vec<String> = {
            let state = self.state.lock();
            self.ty
                .fields
                .iter()
                .chain(&state.extra)
                .filter(|f| !f.render)
                .map(|f| f.name.clone())
                .collect()
        };
        for name in hidden {
            data.remove(&name);
        }
        for (name, traversal) in &self.ty.traversals {
            if !traversal.render {
                data.remove(name);
            }
        }
        if render_terminals {
            for (name, terminal) in &self.ty.terminals {
                if terminal.render && self.exists(name)? {
                    data.set(name.clone(), self.render_terminal(name)?);
                }
            }
        }
        data.set(GUID, self.guid());
        Ok(data)
    }

    /// Timestamps and `guid` only.
    #[must_use]
    pub fn pre_render(&self) -> Document {
        let state = self.state.lock();
        let mut data = Document::new();
        for field in [CREATED_AT, LAST_MODIFIED] {
            if let Some(value) = state.values.get(field).or_else(|| state.stored.get(field)) {
                data.set(field, value.clone());
            }
        }
        data.set(GUID, self.guid());
        data
    }

    // ===== Persistence =====

    /// Saves the entity and cascades into its activated terminals.
    ///
    /// # Errors
    ///
    /// Returns the first store failure. Entities not yet written keep their
    /// dirty state, so the save can be retried.
    pub fn save(&self) -> Result<()> {
        self.save_with(SaveOptions {
            update_last_modified: self.graph.config().update_last_modified,
            save_terminals: true,
        })
    }

    /// Saves with explicit options.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn save_with(&self, options: SaveOptions) -> Result<()> {
        let mut visited = Visited::new();
        self.save_visited(&mut visited, options)
    }

    pub(crate) fn save_visited(&self, visited: &mut Visited, options: SaveOptions) -> Result<()> {
        if !visited.insert(self.id) {
            return Ok(());
        }
        self.flush(options)?;
        if options.save_terminals {
            for index in 0..self.terminals.len() {
                self.save_terminal(index, visited, options)?;
            }
        }
        Ok(())
    }

    /// Writes own fields if dirty or changed since the last known store
    /// state. In-memory state only changes after the write succeeds.
    fn flush(&self, options: SaveOptions) -> Result<()> {
        let mut data = self.to_document()?;
        {
            let state = self.state.lock();
            if !state.dirty && data == state.stored {
                trace!(node = %self.to_key(), "graph.node.save.skipped");
                return Ok(());
            }
        }

        let now = OffsetDateTime::now_utc();
        if options.update_last_modified {
            data.set(LAST_MODIFIED, now);
        }
        self.graph
            .store()
            .save(self.collection(), &data)
            .map_err(|e| e.with_context(self.context()))?;

        let mut state = self.state.lock();
        if options.update_last_modified {
            state.values.set(LAST_MODIFIED, now);
        }
        state.stored = data;
        state.dirty = false;
        state.is_new = false;
        debug!(node = %self.to_key(), "graph.node.save");
        Ok(())
    }

    /// Deletes the entity and every edge touching it. Resident entities on
    /// the other end of those edges drop their reference first.
    ///
    /// # Errors
    ///
    /// Returns the first store failure or edge consistency violation.
    pub fn remove(&self) -> Result<()> {
        let registry = self.graph.registry();
        for edge in self.outbound_edges()? {
            if let Some(other) = registry.lookup(edge.inbound_id(), edge.inbound_collection()) {
                other.remove_inbound_edge(edge.name(), &edge)?;
            }
            edge.remove()?;
        }
        for edge in self.inbound_edges()? {
            if let Some(other) = registry.lookup(edge.outbound_id(), edge.outbound_collection()) {
                other.remove_outbound_edge(edge.name(), &edge)?;
            }
            edge.remove()?;
        }

        self.graph
            .store()
            .remove(self.collection(), self.id)
            .map_err(|e| e.with_context(self.context()))?;
        registry.deregister(self.id);
        self.release_terminals();
        debug!(node = %self.to_key(), "graph.node.remove");
        Ok(())
    }

    /// Edges pointing at this entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge query fails.
    pub fn inbound_edges(&self) -> Result<Vec<Edge>> {
        self.edges_where(INBOUND_ID)
    }

    /// Edges leaving this entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge query fails.
    pub fn outbound_edges(&self) -> Result<Vec<Edge>> {
        self.edges_where(OUTBOUND_ID)
    }

    fn edges_where(&self, field: &str) -> Result<Vec<Edge>> {
        self.graph
            .find(self.graph.edge_collection(), &Query::eq(field, self.id))?
            .map(|node| node.and_then(Edge::from_node))
            .collect()
    }

    /// Resets every terminal to unactivated. Released state is dropped
    /// after its slot is unlocked.
    pub(crate) fn release_terminals(&self) {
        for (slot, (_, def)) in self.terminals.iter().zip(&self.ty.terminals) {
            let released = std::mem::replace(&mut *slot.lock(), TerminalState::empty(def.kind));
            drop(released);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("collection", &self.ty.collection)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.graph.registry().evict(self.id);
    }
}
