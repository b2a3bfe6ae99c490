//! Attributed lists: list terminals whose edges carry a declared set of
//! attribute keys.

use skein_foundation::{Document, Error, ErrorKind, Result};

use super::{ChangeAction, ListView, TerminalChange};
use crate::edge::Edge;
use crate::node::{Node, NodeRef};

impl ListView<'_> {
    fn check_attributes(&self, attributes: &Document) -> Result<()> {
        let Some(declared) = &self.def.attributes else {
            return Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                "{} on {} does not carry attributes",
                self.name,
                self.node.collection()
            ))));
        };
        match attributes.keys().find(|key| !declared.contains(*key)) {
            Some(key) => Err(Error::unknown_attribute(key.as_str(), self.name)),
            None => Ok(()),
        }
    }

    fn member_edge(&self, node: &Node) -> Result<Edge> {
        self.edge_for(node)?.ok_or_else(|| {
            Error::new(ErrorKind::InvalidEdgeParameter(format!(
                "{} is not in {}",
                node.to_key(),
                self.name
            )))
        })
    }

    /// Merges `attributes` into the edge linking `node`. One `Updated`
    /// change listing only the keys whose value changed is recorded, and
    /// none if nothing changed.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if the list declares no attributes
    /// - `UnknownAttribute` for an undeclared key, before anything changes
    /// - `InvalidEdgeParameter` if `node` is not a member
    pub fn update(&self, node: &Node, attributes: &Document) -> Result<()> {
        self.check_attributes(attributes)?;
        let edge = self.member_edge(node)?;

        let current = edge.data();
        let changed: Document = attributes
            .iter()
            .filter(|(key, value)| current.get(key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if changed.is_empty() {
            return Ok(());
        }
        edge.set_data(current.overlay(attributes))?;
        if self.def.record_changes {
            self.with_slot(|slot| {
                slot.changes.push(
                    TerminalChange::new(self.name, ChangeAction::Updated, node.id()).with_attributes(changed),
                );
            })?;
        }
        Ok(())
    }

    /// Appends `node` and sets the edge's attributes.
    ///
    /// # Errors
    ///
    /// Everything [`append`](Self::append) and [`update`](Self::update)
    /// return. Attribute keys are checked before the edge is created.
    pub fn append_with(&self, node: &NodeRef, attributes: &Document) -> Result<()> {
        self.check_attributes(attributes)?;
        self.append(node)?;
        self.update(node, attributes)
    }

    /// A member rendered over its edge attributes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEdgeParameter` if `node` is not a member.
    pub fn render_one(&self, node: &Node) -> Result<Document> {
        let edge = self.member_edge(node)?;
        Ok(edge.data().overlay(&node.render_with(false)?))
    }

    /// One attribute of a member's edge.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEdgeParameter` if `node` is not a member.
    pub fn attribute(&self, node: &Node, key: &str) -> Result<Option<skein_foundation::Value>> {
        Ok(self.member_edge(node)?.attribute(key))
    }
}
