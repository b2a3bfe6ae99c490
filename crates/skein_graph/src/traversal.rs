//! Traversals: read-only fields computed through a terminal.
//!
//! A traversal `terminal.field` reads `field` off the terminal's target, or
//! off the first member of a list. `exists` and, for lists, `count` are
//! computed from the terminal itself. Evaluating a traversal never
//! activates its terminal: until the terminal is activated the value last
//! written to the store is returned.

use skein_foundation::{Error, ErrorKind, Result, Value};

use crate::node::{Node, NodeRef};
use crate::schema::{TerminalKind, TraversalDef};

const EXISTS: &str = "exists";
const COUNT: &str = "count";

impl Node {
    /// Evaluates a traversal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTraversal` if no traversal has the name, or any error
    /// raised while reading the terminal.
    pub fn traversal(&self, name: &str) -> Result<Value> {
        let def = self.entity_type().traversal(name).ok_or_else(|| {
            Error::new(ErrorKind::UnknownTraversal {
                name: name.to_string(),
                owner: self.collection().to_string(),
            })
        })?;
        let terminal_name = def.terminal_name();
        let (index, terminal) = self.terminal_def(terminal_name)?;

        let activated = self.terminals[index].lock().activated();
        if !activated {
            return match self.stored_value(name) {
                Some(value) => Ok(value),
                None => self.traversal_default(def),
            };
        }

        let field = def.field_name();
        if field == EXISTS {
            return self.exists(terminal_name).map(Value::Bool);
        }
        let target = match terminal.kind {
            TerminalKind::List => {
                let list = self.list(terminal_name)?;
                if field == COUNT {
                    let count = list.count()?;
                    return Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)));
                }
                list.first()?
            }
            TerminalKind::Node => self.current_target(index, &terminal.target)?,
        };

        match target {
            Some(target) => match target.lookup_value(field)? {
                Some(value) => Ok(value),
                None => self.traversal_default(def),
            },
            None => self.traversal_default(def),
        }
    }

    /// Every traversal value, in declaration order.
    pub(crate) fn traversal_values(&self) -> Result<Vec<(String, Value)>> {
        self.entity_type()
            .traversals
            .iter()
            .map(|(name, _)| Ok((name.clone(), self.traversal(name)?)))
            .collect()
    }

    fn traversal_default(&self, def: &TraversalDef) -> Result<Value> {
        if let Some(field) = &def.default_field {
            if let Some(value) = self.lookup_value(field)? {
                if !value.is_nil() {
                    return Ok(value);
                }
            }
        }
        Ok(def.default_value.clone())
    }

    /// The target of an activated single-node terminal, without creating
    /// one on request.
    fn current_target(&self, index: usize, collection: &str) -> Result<Option<NodeRef>> {
        let target = {
            let mut guard = self.terminals[index].lock();
            guard.node_slot()?.target.clone()
        };
        match target {
            Some(target) => target.resolve(self.graph(), collection),
            None => Ok(None),
        }
    }
}
