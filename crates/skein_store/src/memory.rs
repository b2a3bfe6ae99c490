//! In-process document store.
//!
//! [`MemoryStore`] implements the full [`Query`] language over a map of
//! collections. Alongside the contract it counts every call it serves and
//! can be told to fail upcoming writes, which is how cascade behavior is
//! tested.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use skein_foundation::{Document, Error, ObjectId, Result};

use crate::query::{FindOptions, Query};
use crate::store::{DocumentCursor, DocumentStore};

pub(crate) type Collections = BTreeMap<String, BTreeMap<ObjectId, Document>>;

/// Snapshot of a [`MemoryStore`]'s call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful `save` calls.
    pub writes: u64,
    /// Successful `remove` calls that found a document.
    pub removes: u64,
    /// `find` and `count` calls.
    pub queries: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    writes: AtomicU64,
    removes: AtomicU64,
    queries: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> StoreStats {
        StoreStats {
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.writes.store(0, Ordering::Relaxed);
        self.removes.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
    }
}

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) collections: RwLock<Collections>,
    stats: StatCounters,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_collections(collections: Collections) -> Self {
        Self {
            collections: RwLock::new(collections),
            ..Self::default()
        }
    }

    /// Returns the call counters accumulated since creation or the last reset.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }

    /// Zeroes the call counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Makes the next `n` writes (saves and removes) fail with a store error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns true if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Names of every non-empty collection.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .read()
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Reads one document by identity without touching the counters.
    #[must_use]
    pub fn get(&self, collection: &str, id: ObjectId) -> Option<Document> {
        self.collections.read().get(collection)?.get(&id).cloned()
    }

    fn check_write(&self, op: &str, collection: &str) -> Result<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            warn!(op, collection, "store.memory.write_failed");
            return Err(Error::store(format!("injected failure on {op} to {collection}")));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> Result<DocumentCursor> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let mut matched: Vec<Document> = self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.values().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| options.sort.compare(a, b));
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        let page: Vec<Document> = matched.into_iter().skip(options.skip).take(limit).collect();
        trace!(collection, %query, results = page.len(), "store.memory.find");
        Ok(DocumentCursor::from_documents(page))
    }

    fn count(&self, collection: &str, query: &Query) -> Result<usize> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.values().filter(|d| query.matches(d)).count()))
    }

    fn save(&self, collection: &str, document: &Document) -> Result<()> {
        let id = document
            .id()
            .ok_or_else(|| Error::store(format!("document saved to {collection} has no _id")))?;
        self.check_write("save", collection)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document.clone());
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        trace!(collection, %id, "store.memory.save");
        Ok(())
    }

    fn remove(&self, collection: &str, id: ObjectId) -> Result<bool> {
        self.check_write("remove", collection)?;
        let existed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(&id))
            .is_some();
        if existed {
            self.stats.removes.fetch_add(1, Ordering::Relaxed);
        }
        trace!(collection, %id, existed, "store.memory.remove");
        Ok(existed)
    }

    fn drop_collection(&self, collection: &str) -> Result<()> {
        self.check_write("drop", collection)?;
        let dropped = self
            .collections
            .write()
            .remove(collection)
            .map_or(0, |docs| docs.len());
        debug!(collection, dropped, "store.memory.drop");
        Ok(())
    }
}
