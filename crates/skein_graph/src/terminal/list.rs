//! List terminals.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use skein_foundation::{Document, Error, ObjectId, Result};
use skein_store::FindOptions;

use super::{dispatch, edge_query, ChangeAction, ListSlot, Notice, Target, TerminalChange};
use crate::edge::Edge;
use crate::node::{Node, NodeRef};
use crate::schema::{Direction, TerminalDef, TerminalKind};

impl ListSlot {
    /// Adds a member unless one with the same identity exists. Returns
    /// whether it was added.
    pub(crate) fn insert(&mut self, key: ObjectId, edge: Edge, target: Target) -> bool {
        if self.edges.contains_key(&key) {
            return false;
        }
        self.edges.insert(key, edge);
        self.members.push(target);
        true
    }

    /// Drops the member at `key` if it is held through `edge_id`.
    pub(crate) fn detach(&mut self, key: ObjectId, edge_id: ObjectId) -> Option<Edge> {
        if !self.edges.get(&key).is_some_and(|edge| edge.id() == edge_id) {
            return None;
        }
        self.members.retain(|target| target.id() != key);
        self.edges.remove(&key)
    }

    /// Releases members whose edges are owned by the other end.
    pub(crate) fn settle(&mut self, holder: ObjectId, peer: Option<ObjectId>) {
        for target in &mut self.members {
            let key = target.id();
            if peer.is_some_and(|id| id != key) {
                continue;
            }
            if self.edges.get(&key).is_some_and(|edge| edge.outbound_id() != holder) {
                target.release();
            }
        }
    }
}

impl Node {
    /// A view over a list terminal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTerminal` if no terminal has the name, or
    /// `UnsupportedOperation` if it holds a single node.
    pub fn list<'a>(&'a self, name: &'a str) -> Result<ListView<'a>> {
        let (index, def) = self.terminal_of(name, TerminalKind::List)?;
        Ok(ListView {
            node: self,
            index,
            name,
            def,
        })
    }

    /// Loads up to `list_fetch_limit` edges per direction and hydrates the
    /// members.
    pub(crate) fn activate_list(&self, declared: &str, def: &TerminalDef, slot: &mut ListSlot) -> Result<()> {
        let graph = self.graph();
        let check = graph.config().check_errors;
        let options = FindOptions::new().with_limit(graph.config().list_fetch_limit);
        let skip_cache = def.edge_filter.is_some();

        let mut edges = BTreeMap::new();
        if def.direction != Direction::Outbound {
            let query = edge_query(self.id(), def, declared, Direction::Inbound);
            for record in graph.find_with(graph.edge_collection(), &query, options.clone(), skip_cache)? {
                let edge = Edge::from_node(record?)?;
                edges.insert(edge.outbound_id(), edge);
            }
        }
        if def.direction != Direction::Inbound {
            let query = edge_query(self.id(), def, declared, Direction::Outbound);
            for record in graph.find_with(graph.edge_collection(), &query, options, skip_cache)? {
                let edge = Edge::from_node(record?)?;
                if check && edge.inbound_collection() != def.target {
                    return Err(Error::inconsistent_edge(
                        edge.id(),
                        format!("{declared} expects {}, edge points at {}", def.target, edge.inbound_collection()),
                    ));
                }
                edges.insert(edge.inbound_id(), edge);
            }
        }

        let ids: Vec<ObjectId> = edges.keys().copied().collect();
        let members = graph
            .from_ids(&def.target, &ids)?
            .iter()
            .filter_map(|node| {
                let edge = edges.get(&node.id())?;
                let strong = edge.outbound_id() == self.id() && node.id() != self.id();
                Some(Target::new(node, strong))
            })
            .collect();

        debug!(node = %self.to_key(), terminal = declared, edges = edges.len(), "graph.terminal.activate");
        slot.edges = edges;
        slot.members = members;
        slot.activated = true;
        self.sort_members(def, slot)
    }

    /// Newest edge first, or the declared sort.
    pub(crate) fn sort_members(&self, def: &TerminalDef, slot: &mut ListSlot) -> Result<()> {
        let Some(sort) = &def.sort else {
            let edges = &slot.edges;
            slot.members
                .sort_by_key(|target| Reverse(edges.get(&target.id()).map(Edge::id)));
            return Ok(());
        };

        let mut resolved = Vec::with_capacity(slot.members.len());
        for target in slot.members.drain(..) {
            let node = target.resolve(self.graph(), &def.target)?;
            resolved.push((target, node));
        }
        resolved.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => sort(&**a, &**b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        slot.members = resolved.into_iter().map(|(target, _)| target).collect();
        Ok(())
    }

    fn add_member(&self, declared: &str, index: usize, def: &TerminalDef, target: &NodeRef) -> Result<()> {
        let me = self.handle()?;
        let edge_name = def.edge_name(declared);
        let mut notices = Vec::new();
        {
            let mut guard = self.terminals[index].lock();
            let slot = guard.list_slot()?;
            if !slot.activated {
                self.activate_list(declared, def, slot)?;
            }
            if !slot.edges.contains_key(&target.id()) {
                let edge = Edge::from_nodes(self, target, edge_name, TerminalKind::List)?;
                slot.insert(
                    target.id(),
                    edge.clone(),
                    Target::new(target, target.id() != self.id()),
                );
                self.sort_members(def, slot)?;
                if def.record_changes {
                    slot.changes.push(TerminalChange::new(declared, ChangeAction::Added, target.id()));
                }
                notices.push(Notice::AddInbound {
                    target: NodeRef::clone(target),
                    name: edge_name.to_string(),
                    edge,
                    source: me,
                });
            }
        }
        dispatch(notices)
    }

    fn remove_member(&self, declared: &str, index: usize, def: &TerminalDef, id: ObjectId) -> Result<bool> {
        let edge_name = def.edge_name(declared);
        let mut notices = Vec::new();
        let removed = {
            let mut guard = self.terminals[index].lock();
            let slot = guard.list_slot()?;
            if !slot.activated {
                self.activate_list(declared, def, slot)?;
            }
            match slot.edges.get(&id).cloned() {
                None => false,
                Some(edge) => {
                    edge.remove()?;
                    let resident = slot
                        .members
                        .iter()
                        .find(|target| target.id() == id)
                        .and_then(Target::peek)
                        .or_else(|| self.graph().registry().lookup(id, &def.target));
                    slot.detach(id, edge.id());
                    if def.record_changes {
                        slot.changes.push(TerminalChange::new(declared, ChangeAction::Removed, id));
                    }
                    if let Some(resident) = resident {
                        let notice = if edge.inbound_id() == id {
                            Notice::RemoveInbound {
                                target: resident,
                                name: edge_name.to_string(),
                                edge,
                            }
                        } else {
                            Notice::RemoveOutbound {
                                target: resident,
                                name: edge.name().to_string(),
                                edge,
                            }
                        };
                        notices.push(notice);
                    }
                    true
                }
            }
        };
        dispatch(notices)?;
        Ok(removed)
    }
}

/// A borrowed view over one list terminal of an entity.
///
/// Every read activates the terminal first. Mutations are only allowed on
/// outbound and bidirectional lists and fail with `DirectionViolation`
/// before touching anything otherwise.
#[derive(Clone, Copy)]
pub struct ListView<'a> {
    pub(super) node: &'a Node,
    pub(super) index: usize,
    pub(super) name: &'a str,
    pub(super) def: &'a TerminalDef,
}

impl ListView<'_> {
    pub(super) fn with_slot<R>(&self, read: impl FnOnce(&mut ListSlot) -> R) -> Result<R> {
        let mut guard = self.node.terminals[self.index].lock();
        let slot = guard.list_slot()?;
        if !slot.activated {
            self.node.activate_list(self.name, self.def, slot)?;
        }
        Ok(read(slot))
    }

    fn check_mutable(&self) -> Result<()> {
        if self.def.direction == Direction::Inbound {
            return Err(Error::direction_violation(format!(
                "{} on {} is INBOUND; only outbound and bidirectional lists can be modified",
                self.name,
                self.node.collection()
            )));
        }
        Ok(())
    }

    fn check_target(&self, target: &Node) -> Result<()> {
        if target.collection() != self.def.target {
            return Err(Error::type_mismatch(&self.def.target, target.collection()));
        }
        Ok(())
    }

    fn resolve(&self, target: &Target) -> Result<Option<NodeRef>> {
        target.resolve(self.node.graph(), &self.def.target)
    }

    /// The declared terminal name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Number of loaded edges.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub fn len(&self) -> Result<usize> {
        self.with_slot(|slot| slot.edges.len())
    }

    /// Returns true if no edge is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of matching edges in the store and cache, ignoring the fetch
    /// limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn count(&self) -> Result<usize> {
        let graph = self.node.graph();
        let query = edge_query(self.node.id(), self.def, self.name, self.def.direction);
        graph
            .find_with(graph.edge_collection(), &query, FindOptions::new(), self.def.edge_filter.is_some())?
            .total()
    }

    /// Returns true if the list has any member.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub fn exists(&self) -> Result<bool> {
        Ok(!self.is_empty()?)
    }

    /// The member at `index`, in list order.
    ///
    /// # Errors
    ///
    /// Returns an error if activation or hydration fails.
    pub fn get(&self, index: usize) -> Result<Option<NodeRef>> {
        match self.with_slot(|slot| slot.members.get(index).cloned())? {
            Some(target) => self.resolve(&target),
            None => Ok(None),
        }
    }

    /// The first member.
    ///
    /// # Errors
    ///
    /// Returns an error if activation or hydration fails.
    pub fn first(&self) -> Result<Option<NodeRef>> {
        self.get(0)
    }

    /// Every member, in list order. Members that no longer exist are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if activation or hydration fails.
    pub fn nodes(&self) -> Result<Vec<NodeRef>> {
        let targets = self.with_slot(|slot| slot.members.clone())?;
        let mut nodes = Vec::with_capacity(targets.len());
        for target in &targets {
            if let Some(node) = self.resolve(target)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Iterates over [`nodes`](Self::nodes).
    ///
    /// # Errors
    ///
    /// Returns an error if activation or hydration fails.
    pub fn iter(&self) -> Result<std::vec::IntoIter<NodeRef>> {
        Ok(self.nodes()?.into_iter())
    }

    /// Returns true if `node` is a member.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub fn contains(&self, node: &Node) -> Result<bool> {
        self.with_slot(|slot| slot.edges.contains_key(&node.id()))
    }

    /// The edge linking `node` into the list.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub fn edge_for(&self, node: &Node) -> Result<Option<Edge>> {
        self.with_slot(|slot| slot.edges.get(&node.id()).cloned())
    }

    /// Adds a member. Adding an existing member does nothing.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound lists or `TypeMismatch` for
    /// targets of the wrong type.
    pub fn append(&self, node: &NodeRef) -> Result<()> {
        self.check_mutable()?;
        self.check_target(node)?;
        self.node.add_member(self.name, self.index, self.def, node)
    }

    /// Adds each node in turn.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`append`](Self::append).
    pub fn extend<'n>(&self, nodes: impl IntoIterator<Item = &'n NodeRef>) -> Result<()> {
        nodes.into_iter().try_for_each(|node| self.append(node))
    }

    /// Removes a member and deletes its edge. Returns whether it was a
    /// member.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound lists.
    pub fn remove(&self, node: &Node) -> Result<bool> {
        self.check_mutable()?;
        self.node.remove_member(self.name, self.index, self.def, node.id())
    }

    /// Removes and returns the last member.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound lists.
    pub fn pop(&self) -> Result<Option<NodeRef>> {
        self.check_mutable()?;
        let Some(last) = self.with_slot(|slot| slot.members.last().cloned())? else {
            return Ok(None);
        };
        let node = self.resolve(&last)?;
        self.node.remove_member(self.name, self.index, self.def, last.id())?;
        Ok(node)
    }

    /// Makes the list hold exactly `nodes`. Members not in `nodes` are
    /// removed first, then missing ones are added.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound lists or `TypeMismatch` if
    /// any node has the wrong type. Both are checked before any change.
    pub fn set(&self, nodes: &[NodeRef]) -> Result<()> {
        self.check_mutable()?;
        for node in nodes {
            self.check_target(node)?;
        }
        let wanted: HashSet<ObjectId> = nodes.iter().map(|node| node.id()).collect();
        let stale: Vec<ObjectId> =
            self.with_slot(|slot| slot.edges.keys().filter(|id| !wanted.contains(*id)).copied().collect())?;
        for id in stale {
            self.node.remove_member(self.name, self.index, self.def, id)?;
        }
        for node in nodes.iter().rev() {
            self.node.add_member(self.name, self.index, self.def, node)?;
        }
        Ok(())
    }

    /// Removes every member.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound lists.
    pub fn delete(&self) -> Result<()> {
        self.set(&[])
    }

    /// Renders each member without its terminals, merged over its edge
    /// attributes for attributed lists.
    ///
    /// # Errors
    ///
    /// Returns an error if a member cannot be rendered.
    pub fn render(&self) -> Result<Vec<Document>> {
        self.nodes()?
            .iter()
            .map(|node| {
                if self.def.attributes.is_some() {
                    self.render_one(node)
                } else {
                    node.render_with(false)
                }
            })
            .collect()
    }

    /// Changes recorded since the last save.
    #[must_use]
    pub fn changes(&self) -> Vec<TerminalChange> {
        self.node.terminals[self.index].lock().changes().to_vec()
    }
}

impl fmt::Debug for ListView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListView")
            .field("owner", &self.node.to_key())
            .field("terminal", &self.name)
            .field("direction", &self.def.direction)
            .finish_non_exhaustive()
    }
}
