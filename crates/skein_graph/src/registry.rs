//! Weak-reference registry of live entities.
//!
//! The registry never keeps an entity alive. Each slot holds a weak pointer
//! and the collection the entity was registered under; once the last strong
//! owner releases the entity its slot reads as empty and is evicted.
//!
//! One mutex guards both the identity map and the per-collection index.
//! Upgraded references are always returned to the caller before any of them
//! can be dropped, so an entity's destructor never runs while the lock is
//! held.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use skein_foundation::{ObjectId, Result};
use skein_store::{Query, Sort};

use crate::matcher;
use crate::node::{Node, NodeRef};

struct Slot {
    collection: String,
    node: Weak<Node>,
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<ObjectId, Slot>,
    by_collection: HashMap<String, BTreeSet<ObjectId>>,
}

impl Slots {
    fn unlink(&mut self, id: ObjectId) -> bool {
        let Some(slot) = self.by_id.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_collection.get_mut(&slot.collection) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_collection.remove(&slot.collection);
            }
        }
        true
    }
}

/// Process-local map from identity to the single live instance.
#[derive(Default)]
pub struct Registry {
    slots: Mutex<Slots>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity, replacing any slot with the same identity.
    pub fn register(&self, node: &NodeRef) {
        let mut slots = self.slots.lock();
        slots.unlink(node.id());
        slots.by_id.insert(
            node.id(),
            Slot {
                collection: node.collection().to_string(),
                node: Arc::downgrade(node),
            },
        );
        slots
            .by_collection
            .entry(node.collection().to_string())
            .or_default()
            .insert(node.id());
    }

    /// Registers `node` unless a live instance with its identity exists, in
    /// which case that instance is returned and `node` is discarded.
    pub(crate) fn insert_or_get(&self, node: NodeRef) -> NodeRef {
        let existing = {
            let mut slots = self.slots.lock();
            let live = slots.by_id.get(&node.id()).and_then(|s| s.node.upgrade());
            if live.is_none() {
                slots.unlink(node.id());
                slots.by_id.insert(
                    node.id(),
                    Slot {
                        collection: node.collection().to_string(),
                        node: Arc::downgrade(&node),
                    },
                );
                slots
                    .by_collection
                    .entry(node.collection().to_string())
                    .or_default()
                    .insert(node.id());
            }
            live
        };
        match existing {
            Some(live) => {
                trace!(id = %live.id(), "graph.cache.hit");
                live
            }
            None => node,
        }
    }

    /// Removes an identity. Returns whether it was registered.
    pub fn deregister(&self, id: ObjectId) -> bool {
        self.slots.lock().unlink(id)
    }

    /// Removes the slot for `id` if its entity is gone.
    pub(crate) fn evict(&self, id: ObjectId) {
        let mut slots = self.slots.lock();
        let dead = slots.by_id.get(&id).is_some_and(|s| s.node.strong_count() == 0);
        if dead {
            slots.unlink(id);
            trace!(%id, "graph.cache.evict");
        }
    }

    /// Returns the live instance for an identity, in any collection.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<NodeRef> {
        self.slots.lock().by_id.get(&id).and_then(|s| s.node.upgrade())
    }

    /// Returns the live instance only if it was registered under
    /// `collection`.
    #[must_use]
    pub fn lookup(&self, id: ObjectId, collection: &str) -> Option<NodeRef> {
        self.slots
            .lock()
            .by_id
            .get(&id)
            .filter(|s| s.collection == collection)
            .and_then(|s| s.node.upgrade())
    }

    /// Returns true if a live instance with the identity exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.slots
            .lock()
            .by_id
            .get(&id)
            .is_some_and(|s| s.node.strong_count() > 0)
    }

    /// Every live instance registered under `collection`, in identity order.
    #[must_use]
    pub fn resident(&self, collection: &str) -> Vec<NodeRef> {
        let slots = self.slots.lock();
        slots
            .by_collection
            .get(collection)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| slots.by_id.get(id))
                    .filter_map(|s| s.node.upgrade())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every live instance.
    #[must_use]
    pub fn all(&self) -> Vec<NodeRef> {
        self.slots
            .lock()
            .by_id
            .values()
            .filter_map(|s| s.node.upgrade())
            .collect()
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .by_id
            .values()
            .filter(|s| s.node.strong_count() > 0)
            .count()
    }

    /// Returns true if no instance is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every slot. Live instances stay valid but are no longer
    /// found by lookups.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.by_id.clear();
        slots.by_collection.clear();
    }

    /// Evaluates a query against the resident instances of a collection.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedQueryCapability` if the query is outside the
    /// subset the cache understands.
    pub fn find(&self, collection: &str, query: &Query, sort: &Sort) -> Result<Vec<NodeRef>> {
        if let Some(id) = query.as_id() {
            matcher::check(query)?;
            return Ok(self.lookup(id, collection).into_iter().collect());
        }
        matcher::evaluate(query, self.resident(collection), sort)
    }

    /// First match under the default sort.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedQueryCapability` if the query is outside the
    /// subset the cache understands.
    pub fn find_one(&self, collection: &str, query: &Query) -> Result<Option<NodeRef>> {
        Ok(self.find(collection, query, &Sort::default())?.into_iter().next())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("live", &self.len()).finish()
    }
}
