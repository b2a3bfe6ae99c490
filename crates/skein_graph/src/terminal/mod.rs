//! Relationship terminals.
//!
//! Every declared terminal owns one slot on its entity. A slot starts
//! unactivated and loads its edges from the graph on first use. Afterwards
//! it is kept in sync by notifications from the other endpoint: when a
//! terminal creates or deletes an edge, the resident entity on the other
//! end updates its mirror terminal without touching the store.
//!
//! The outbound side of an edge holds its target strongly. The inbound side
//! pins its source only until the edge is saved, so an unsaved owner cannot
//! vanish while an edge to it is still waiting to be written. After that, and
//! for any self-reference, it holds a weak pointer plus the identity so the
//! target can be re-hydrated if it was released.

mod attributed;
mod list;
mod node;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use skein_foundation::{Document, Error, ErrorKind, ObjectId, Result};
use skein_store::Query;

use crate::config::SaveOptions;
use crate::edge::{Edge, INBOUND_ID, NAME, OUTBOUND_COLLECTION, OUTBOUND_ID};
use crate::graph::Graph;
use crate::node::{Node, NodeRef, Visited};
use crate::schema::{Direction, TerminalDef, TerminalKind};

pub use list::ListView;

// =============================================================================
// Slot state
// =============================================================================

/// In-memory state of one terminal.
pub(crate) enum TerminalState {
    Node(NodeSlot),
    List(ListSlot),
}

#[derive(Default)]
pub(crate) struct NodeSlot {
    pub(crate) activated: bool,
    pub(crate) edge: Option<Edge>,
    pub(crate) target: Option<Target>,
    pub(crate) changes: Vec<TerminalChange>,
}

/// Edges are keyed by the identity of the entity on the other end.
#[derive(Default)]
pub(crate) struct ListSlot {
    pub(crate) activated: bool,
    pub(crate) edges: BTreeMap<ObjectId, Edge>,
    pub(crate) members: Vec<Target>,
    pub(crate) changes: Vec<TerminalChange>,
}

impl TerminalState {
    pub(crate) fn empty(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Node => Self::Node(NodeSlot::default()),
            TerminalKind::List => Self::List(ListSlot::default()),
        }
    }

    pub(crate) fn activated(&self) -> bool {
        match self {
            Self::Node(slot) => slot.activated,
            Self::List(slot) => slot.activated,
        }
    }

    pub(crate) fn node_slot(&mut self) -> Result<&mut NodeSlot> {
        match self {
            Self::Node(slot) => Ok(slot),
            Self::List(_) => Err(Error::new(ErrorKind::Internal(
                "list state behind a node terminal".to_string(),
            ))),
        }
    }

    pub(crate) fn list_slot(&mut self) -> Result<&mut ListSlot> {
        match self {
            Self::List(slot) => Ok(slot),
            Self::Node(_) => Err(Error::new(ErrorKind::Internal(
                "node state behind a list terminal".to_string(),
            ))),
        }
    }

    fn changes(&self) -> &[TerminalChange] {
        match self {
            Self::Node(slot) => &slot.changes,
            Self::List(slot) => &slot.changes,
        }
    }

    fn clear_changes(&mut self) {
        match self {
            Self::Node(slot) => slot.changes.clear(),
            Self::List(slot) => slot.changes.clear(),
        }
    }

    /// Releases the pins this slot holds on the owners of its saved edges.
    /// `peer` narrows the release to one member.
    fn settle(&mut self, holder: ObjectId, peer: Option<ObjectId>) {
        match self {
            Self::Node(slot) => slot.settle(holder, peer),
            Self::List(slot) => slot.settle(holder, peer),
        }
    }

    /// Resident targets and every known edge, for a cascading save.
    fn save_plan(&self) -> (Vec<NodeRef>, Vec<Edge>) {
        match self {
            Self::Node(slot) => (
                slot.target.iter().filter_map(Target::peek).collect(),
                slot.edge.iter().cloned().collect(),
            ),
            Self::List(slot) => (
                slot.members.iter().filter_map(Target::peek).collect(),
                slot.edges.values().cloned().collect(),
            ),
        }
    }
}

// =============================================================================
// Targets
// =============================================================================

/// A terminal's reference to the entity on the other end.
#[derive(Clone)]
pub(crate) enum Target {
    Strong(NodeRef),
    Weak(Weak<Node>, ObjectId),
}

impl Target {
    /// Never strong for a self-reference.
    pub(crate) fn new(node: &NodeRef, strong: bool) -> Self {
        if strong {
            Self::Strong(Arc::clone(node))
        } else {
            Self::Weak(Arc::downgrade(node), node.id())
        }
    }

    pub(crate) fn id(&self) -> ObjectId {
        match self {
            Self::Strong(node) => node.id(),
            Self::Weak(_, id) => *id,
        }
    }

    /// Downgrades a strong target to a weak one.
    pub(crate) fn release(&mut self) {
        if let Self::Strong(node) = self {
            *self = Self::Weak(Arc::downgrade(node), node.id());
        }
    }

    /// The target if it is still in memory.
    pub(crate) fn peek(&self) -> Option<NodeRef> {
        match self {
            Self::Strong(node) => Some(Arc::clone(node)),
            Self::Weak(node, _) => node.upgrade(),
        }
    }

    /// The target, re-hydrated from the registry or store if released.
    pub(crate) fn resolve(&self, graph: &Graph, collection: &str) -> Result<Option<NodeRef>> {
        match self.peek() {
            Some(node) => Ok(Some(node)),
            None => graph.from_id(collection, self.id()),
        }
    }
}

// =============================================================================
// Public views
// =============================================================================

/// The value of a terminal, whichever its cardinality.
#[derive(Clone, Debug)]
pub enum Relationship {
    /// A single-node terminal.
    Node(Option<NodeRef>),
    /// A list terminal.
    List(Vec<NodeRef>),
}

/// What happened to a terminal member since the last save.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// An edge was created.
    Added,
    /// An edge was deleted.
    Removed,
    /// An edge's attributes changed.
    Updated,
}

/// One recorded change on a terminal declared with `record_changes`.
#[derive(Clone, Debug, PartialEq)]
pub struct TerminalChange {
    /// Declared terminal name.
    pub terminal: String,
    /// What happened.
    pub action: ChangeAction,
    /// Changed attributes, for [`ChangeAction::Updated`].
    pub attributes: Document,
    /// The member entity.
    pub node: ObjectId,
}

impl TerminalChange {
    pub(crate) fn new(terminal: &str, action: ChangeAction, node: ObjectId) -> Self {
        Self {
            terminal: terminal.to_string(),
            action,
            attributes: Document::new(),
            node,
        }
    }

    #[must_use]
    pub(crate) fn with_attributes(mut self, attributes: Document) -> Self {
        self.attributes = attributes;
        self
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// A mirror update for the entity on the other end of an edge, delivered
/// once the originating slot is unlocked.
pub(crate) enum Notice {
    AddInbound {
        target: NodeRef,
        name: String,
        edge: Edge,
        source: NodeRef,
    },
    AddOutbound {
        target: NodeRef,
        name: String,
        edge: Edge,
        source: NodeRef,
    },
    RemoveInbound {
        target: NodeRef,
        name: String,
        edge: Edge,
    },
    RemoveOutbound {
        target: NodeRef,
        name: String,
        edge: Edge,
    },
}

impl Notice {
    fn deliver(self) -> Result<()> {
        match self {
            Self::AddInbound { target, name, edge, source } => {
                target.add_inbound_edge(&name, &edge, &source)
            }
            Self::AddOutbound { target, name, edge, source } => {
                target.add_outbound_edge(&name, &edge, &source)
            }
            Self::RemoveInbound { target, name, edge } => target.remove_inbound_edge(&name, &edge),
            Self::RemoveOutbound { target, name, edge } => target.remove_outbound_edge(&name, &edge),
        }
    }
}

pub(crate) fn dispatch(notices: Vec<Notice>) -> Result<()> {
    notices.into_iter().try_for_each(Notice::deliver)
}

// =============================================================================
// Edge queries
// =============================================================================

fn directed_query(owner: ObjectId, def: &TerminalDef, declared: &str, direction: Direction) -> Query {
    let name = def.edge_name(declared);
    match direction {
        Direction::Outbound => Query::and([Query::eq(OUTBOUND_ID, owner), Query::eq(NAME, name)]),
        Direction::Inbound => Query::and([
            Query::eq(INBOUND_ID, owner),
            Query::eq(OUTBOUND_COLLECTION, def.target.as_str()),
            Query::eq(NAME, name),
        ]),
        Direction::Bidirectional => Query::or([
            directed_query(owner, def, declared, Direction::Inbound),
            directed_query(owner, def, declared, Direction::Outbound),
        ]),
    }
}

/// Edges visible to a terminal when read in `direction`, narrowed by the
/// terminal's edge filter.
pub(crate) fn edge_query(owner: ObjectId, def: &TerminalDef, declared: &str, direction: Direction) -> Query {
    let query = directed_query(owner, def, declared, direction);
    match &def.edge_filter {
        Some(filter) => query.and_also(filter.clone()),
        None => query,
    }
}

// =============================================================================
// Entity operations
// =============================================================================

impl Node {
    /// The declared terminal with its slot index.
    pub(crate) fn terminal_def(&self, name: &str) -> Result<(usize, &TerminalDef)> {
        let ty = self.entity_type();
        let index = ty.terminal_index(name).ok_or_else(|| {
            Error::new(ErrorKind::UnknownTerminal {
                name: name.to_string(),
                owner: self.collection().to_string(),
            })
        })?;
        Ok((index, &ty.terminals[index].1))
    }

    /// Like [`terminal_def`](Self::terminal_def), rejecting the other kind.
    pub(crate) fn terminal_of(&self, name: &str, kind: TerminalKind) -> Result<(usize, &TerminalDef)> {
        let (index, def) = self.terminal_def(name)?;
        if def.kind != kind {
            return Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                "{name} on {} is a {} terminal",
                self.collection(),
                def.kind.as_str()
            ))));
        }
        Ok((index, def))
    }

    /// Reads a terminal, activating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTerminal` if no terminal has the name, or any error
    /// raised while loading its edges.
    pub fn relationship(&self, name: &str) -> Result<Relationship> {
        let (_, def) = self.terminal_def(name)?;
        match def.kind {
            TerminalKind::Node => Ok(Relationship::Node(self.single(name)?)),
            TerminalKind::List => Ok(Relationship::List(self.list(name)?.nodes()?)),
        }
    }

    /// Replaces a terminal's value.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if the value's shape does not match the
    ///   terminal kind
    /// - `DirectionViolation` for inbound terminals
    /// - `TypeMismatch` for targets from the wrong collection
    pub fn set_relationship(&self, name: &str, value: Relationship) -> Result<()> {
        let (_, def) = self.terminal_def(name)?;
        match (def.kind, value) {
            (TerminalKind::Node, Relationship::Node(node)) => self.set_single(name, node.as_ref()),
            (TerminalKind::List, Relationship::List(nodes)) => self.list(name)?.set(&nodes),
            (kind, _) => Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                "{name} on {} holds {}",
                self.collection(),
                kind.as_str()
            )))),
        }
    }

    /// Deletes every edge of an outbound terminal.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound terminals.
    pub fn delete_relationship(&self, name: &str) -> Result<()> {
        let (_, def) = self.terminal_def(name)?;
        match def.kind {
            TerminalKind::Node => self.set_single(name, None),
            TerminalKind::List => self.list(name)?.delete(),
        }
    }

    /// Returns true if the terminal has at least one edge. Unactivated
    /// terminals answer from the store without activating.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTerminal` if no terminal has the name, or a store
    /// failure.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let (index, def) = self.terminal_def(name)?;
        if def.kind == TerminalKind::List {
            return self.list(name)?.exists();
        }
        {
            let mut guard = self.terminals[index].lock();
            let slot = guard.node_slot()?;
            if slot.activated {
                return Ok(slot.edge.is_some());
            }
        }
        let graph = self.graph();
        let query = edge_query(self.id(), def, name, def.direction);
        Ok(graph.find(graph.edge_collection(), &query)?.total()? > 0)
    }

    /// Returns true once the terminal has loaded its edges.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTerminal` if no terminal has the name.
    pub fn is_activated(&self, name: &str) -> Result<bool> {
        let (index, _) = self.terminal_def(name)?;
        Ok(self.terminals[index].lock().activated())
    }

    /// Changes recorded since the last save.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTerminal` if no terminal has the name.
    pub fn terminal_changes(&self, name: &str) -> Result<Vec<TerminalChange>> {
        let (index, _) = self.terminal_def(name)?;
        Ok(self.terminals[index].lock().changes().to_vec())
    }

    pub(crate) fn render_terminal(&self, name: &str) -> Result<skein_foundation::Value> {
        let (_, def) = self.terminal_def(name)?;
        match def.kind {
            TerminalKind::Node => Ok(match self.single(name)? {
                Some(target) => target.render_with(false)?.into(),
                None => Document::new().into(),
            }),
            TerminalKind::List => Ok(self.list(name)?.render()?.into()),
        }
    }

    /// Saves resident targets, then edges, then forgets recorded changes.
    pub(crate) fn save_terminal(&self, index: usize, visited: &mut Visited, options: SaveOptions) -> Result<()> {
        let (targets, edges) = self.terminals[index].lock().save_plan();
        for target in targets {
            target.save_visited(visited, options)?;
        }
        for edge in &edges {
            edge.save_visited(visited, options)?;
        }
        {
            let mut guard = self.terminals[index].lock();
            guard.clear_changes();
            guard.settle(self.id(), None);
        }

        // The resident peers of edges we own may still pin us.
        for edge in edges.iter().filter(|edge| edge.outbound_id() == self.id()) {
            if edge.inbound_id() == self.id() {
                continue;
            }
            if let Some(peer) = self.graph().registry().get(edge.inbound_id()) {
                peer.settle_inbound_edge(edge);
            }
        }
        Ok(())
    }

    /// `edge` was saved by its owner; stop pinning the owner.
    fn settle_inbound_edge(&self, edge: &Edge) {
        if let Some(index) = self.inbound_terminal(edge.name(), edge) {
            self.terminals[index].lock().settle(self.id(), Some(edge.outbound_id()));
        }
    }

    // ===== Mirror notifications =====

    /// The inbound or bidirectional terminal that reads edges named `name`
    /// coming from the edge's outbound collection.
    fn inbound_terminal(&self, name: &str, edge: &Edge) -> Option<usize> {
        self.entity_type().terminals.iter().position(|(declared, def)| {
            def.direction != Direction::Outbound
                && def.edge_name(declared) == name
                && def.target == edge.outbound_collection()
        })
    }

    /// The outbound or bidirectional terminal declared as `name`.
    fn outbound_terminal(&self, name: &str) -> Option<usize> {
        let ty = self.entity_type();
        ty.terminal_index(name)
            .filter(|&index| ty.terminals[index].1.direction != Direction::Inbound)
    }

    /// `source` created `edge` pointing at this entity.
    pub(crate) fn add_inbound_edge(&self, name: &str, edge: &Edge, source: &NodeRef) -> Result<()> {
        let Some(index) = self.inbound_terminal(name, edge) else {
            return Ok(());
        };
        let (declared, def) = &self.entity_type().terminals[index];
        let mut guard = self.terminals[index].lock();
        match &mut *guard {
            TerminalState::Node(slot) => {
                slot.accept(edge, Target::new(source, source.id() != self.id()));
                Ok(())
            }
            TerminalState::List(slot) => {
                if !slot.activated {
                    self.activate_list(declared, def, slot)?;
                }
                let target = Target::new(source, source.id() != self.id());
                if slot.insert(edge.outbound_id(), edge.clone(), target) {
                    self.sort_members(def, slot)?;
                }
                Ok(())
            }
        }
    }

    /// This entity turned out to own `edge`, found from its inbound end.
    pub(crate) fn add_outbound_edge(&self, name: &str, edge: &Edge, source: &NodeRef) -> Result<()> {
        let Some(index) = self.outbound_terminal(name) else {
            return Ok(());
        };
        let mut guard = self.terminals[index].lock();
        if let TerminalState::Node(slot) = &mut *guard {
            slot.activated = true;
            slot.edge = Some(edge.clone());
            slot.target = Some(Target::new(source, source.id() != self.id()));
        }
        Ok(())
    }

    /// An edge pointing at this entity was deleted.
    pub(crate) fn remove_inbound_edge(&self, name: &str, edge: &Edge) -> Result<()> {
        let Some(index) = self.inbound_terminal(name, edge) else {
            return Ok(());
        };
        let mut guard = self.terminals[index].lock();
        match &mut *guard {
            TerminalState::Node(slot) => slot.forget(edge),
            TerminalState::List(slot) => {
                slot.detach(edge.outbound_id(), edge.id());
            }
        }
        Ok(())
    }

    /// An edge leaving this entity was deleted from its inbound end.
    pub(crate) fn remove_outbound_edge(&self, name: &str, edge: &Edge) -> Result<()> {
        let ty = self.entity_type();
        let Some(index) = ty.terminal_index(name) else {
            return Ok(());
        };
        let def = &ty.terminals[index].1;
        if self.graph().config().check_errors
            && (def.direction == Direction::Inbound || def.target != edge.inbound_collection())
        {
            return Err(Error::inconsistent_edge(
                edge.id(),
                format!(
                    "{name} on {} is {} to {}, cannot release an edge to {}",
                    self.collection(),
                    def.direction,
                    def.target,
                    edge.inbound_collection()
                ),
            ));
        }
        let mut guard = self.terminals[index].lock();
        match &mut *guard {
            TerminalState::Node(slot) => slot.forget(edge),
            TerminalState::List(slot) => {
                slot.detach(edge.inbound_id(), edge.id());
            }
        }
        Ok(())
    }
}
