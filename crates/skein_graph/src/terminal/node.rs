//! Single-node terminals.

use tracing::debug;

use skein_foundation::{Error, ObjectId, Result};

use super::{dispatch, edge_query, ChangeAction, NodeSlot, Notice, Target, TerminalChange};
use crate::edge::Edge;
use crate::node::{Node, NodeRef};
use crate::schema::{Direction, TerminalDef, TerminalKind};

impl NodeSlot {
    /// Takes `edge` from a notification unless the slot already holds it.
    pub(crate) fn accept(&mut self, edge: &Edge, target: Target) {
        if self.edge.as_ref().is_some_and(|held| held.id() != edge.id()) {
            self.target = None;
        }
        if self.target.is_none() {
            self.activated = true;
            self.edge = Some(edge.clone());
            self.target = Some(target);
        }
    }

    /// Releases the target if another entity owns the held edge.
    pub(crate) fn settle(&mut self, holder: ObjectId, peer: Option<ObjectId>) {
        let Some(edge) = &self.edge else {
            return;
        };
        if edge.outbound_id() == holder || peer.is_some_and(|id| id != edge.outbound_id()) {
            return;
        }
        if let Some(target) = &mut self.target {
            target.release();
        }
    }

    /// Clears the slot if it holds `edge`.
    pub(crate) fn forget(&mut self, edge: &Edge) {
        if self.edge.as_ref().is_some_and(|held| held.id() == edge.id()) {
            self.edge = None;
            self.target = None;
        }
    }
}

impl Node {
    /// Reads a single-node terminal.
    ///
    /// Terminals declared with `create_on_request` create, link and return a
    /// new target when empty.
    ///
    /// # Errors
    ///
    /// - `UnknownTerminal` / `UnsupportedOperation` for a missing or list
    ///   terminal
    /// - `InconsistentEdgeState` if the stored edge contradicts the
    ///   declaration (only when the graph checks errors)
    pub fn single(&self, name: &str) -> Result<Option<NodeRef>> {
        let (index, def) = self.terminal_of(name, TerminalKind::Node)?;
        let mut notices = Vec::new();
        let target = {
            let mut guard = self.terminals[index].lock();
            let slot = guard.node_slot()?;
            if !slot.activated {
                notices = self.activate_single(name, def, slot)?;
            }
            slot.target.clone()
        };
        dispatch(notices)?;

        let resolved = match target {
            Some(target) => target.resolve(self.graph(), &def.target)?,
            None => None,
        };
        if resolved.is_none() && def.create_on_request && def.direction == Direction::Outbound {
            let created = self.graph().create(&def.target)?;
            self.set_single(name, Some(&created))?;
            return Ok(Some(created));
        }
        Ok(resolved)
    }

    /// Points an outbound single-node terminal at `target`, deleting the
    /// previous edge. `None` clears the terminal.
    ///
    /// # Errors
    ///
    /// - `DirectionViolation` for inbound and bidirectional terminals
    /// - `TypeMismatch` if `target` is not of the declared type
    ///
    /// Both are raised before anything changes.
    pub fn set_single(&self, name: &str, target: Option<&NodeRef>) -> Result<()> {
        let (index, def) = self.terminal_of(name, TerminalKind::Node)?;
        if def.direction != Direction::Outbound {
            return Err(Error::direction_violation(format!(
                "{name} on {} is {}; only outbound terminals can be assigned",
                self.collection(),
                def.direction
            )));
        }
        if let Some(node) = target {
            if node.collection() != def.target {
                return Err(Error::type_mismatch(&def.target, node.collection())
                    .with_context(self.context()));
            }
        }

        let me = self.handle()?;
        let edge_name = def.edge_name(name);
        let mut notices = Vec::new();
        {
            let mut guard = self.terminals[index].lock();
            let slot = guard.node_slot()?;
            if !slot.activated {
                notices.extend(self.activate_single(name, def, slot)?);
            }
            let current = slot.edge.as_ref().map(|edge| edge.other_end(self.id()));
            if current != target.map(|node| node.id()) {
                if let Some(old) = slot.edge.clone() {
                    old.remove()?;
                    let other = old.other_end(self.id());
                    let resident = slot
                        .target
                        .as_ref()
                        .and_then(Target::peek)
                        .or_else(|| self.graph().registry().lookup(other, &def.target));
                    if let Some(resident) = resident {
                        notices.push(Notice::RemoveInbound {
                            target: resident,
                            name: edge_name.to_string(),
                            edge: old,
                        });
                    }
                    if def.record_changes {
                        slot.changes.push(TerminalChange::new(name, ChangeAction::Removed, other));
                    }
                    slot.edge = None;
                    slot.target = None;
                }
                if let Some(node) = target {
                    let edge = Edge::from_nodes(self, node, edge_name, TerminalKind::Node)?;
                    notices.push(Notice::AddInbound {
                        target: NodeRef::clone(node),
                        name: edge_name.to_string(),
                        edge: edge.clone(),
                        source: NodeRef::clone(&me),
                    });
                    slot.edge = Some(edge);
                    slot.target = Some(Target::new(node, node.id() != self.id()));
                    if def.record_changes {
                        slot.changes.push(TerminalChange::new(name, ChangeAction::Added, node.id()));
                    }
                }
            }
        }
        dispatch(notices)
    }

    /// Deletes the edge of an outbound single-node terminal.
    ///
    /// # Errors
    ///
    /// Returns `DirectionViolation` for inbound terminals.
    pub fn delete_single(&self, name: &str) -> Result<()> {
        self.set_single(name, None)
    }

    /// Loads the terminal's edge. Returns the mirror notification for the
    /// target, if one was found.
    fn activate_single(&self, name: &str, def: &TerminalDef, slot: &mut NodeSlot) -> Result<Vec<Notice>> {
        let graph = self.graph();
        let query = edge_query(self.id(), def, name, def.direction);
        let Some(record) = graph.find_one(graph.edge_collection(), &query)? else {
            slot.activated = true;
            return Ok(Vec::new());
        };
        let edge = Edge::from_node(record)?;
        let check = graph.config().check_errors;
        if check && def.direction == Direction::Outbound && edge.inbound_collection() != def.target {
            return Err(Error::inconsistent_edge(
                edge.id(),
                format!("{name} expects {}, edge points at {}", def.target, edge.inbound_collection()),
            ));
        }

        let other = edge.other_end(self.id());
        let Some(target) = graph.from_id(&def.target, other)? else {
            if check {
                return Err(Error::inconsistent_edge(
                    edge.id(),
                    format!("{}:{other} does not exist", def.target),
                ));
            }
            slot.activated = true;
            return Ok(Vec::new());
        };

        let me = self.handle()?;
        let owns_edge = edge.outbound_id() == self.id();
        let notice = if def.direction == Direction::Outbound {
            Notice::AddInbound {
                target: NodeRef::clone(&target),
                name: edge.name().to_string(),
                edge: edge.clone(),
                source: me,
            }
        } else {
            Notice::AddOutbound {
                target: NodeRef::clone(&target),
                name: edge.name().to_string(),
                edge: edge.clone(),
                source: me,
            }
        };
        debug!(node = %self.to_key(), terminal = name, edge = %edge.id(), "graph.terminal.activate");
        slot.target = Some(Target::new(&target, owns_edge && target.id() != self.id()));
        slot.edge = Some(edge);
        slot.activated = true;
        Ok(vec![notice])
    }
}
