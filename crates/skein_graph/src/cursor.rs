//! Merged cache and store results.
//!
//! A [`NodeCursor`] interleaves the cache-resident matches of a query with
//! the backing store's cursor for the same query and sort. Both sources are
//! already ordered; the merge compares their heads by the primary sort key:
//!
//! - the cache head is emitted while it strictly precedes the store head
//! - heads with the same identity are emitted once, as the cached instance,
//!   since it carries any unsaved edits
//! - otherwise the store document is hydrated through the registry
//!
//! An identity is never emitted twice, even if an unsaved edit moved the
//! cached instance away from its stored position.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use skein_foundation::document::ID_FIELD;
use skein_foundation::{Document, ObjectId, Result, Value};
use skein_store::{DocumentCursor, Query, SortDirection};

use crate::graph::Graph;
use crate::node::NodeRef;

/// Iterator over the merged results of [`Graph::find`].
pub struct NodeCursor {
    graph: Graph,
    collection: String,
    query: Query,
    key: (String, SortDirection),
    cached: VecDeque<(Value, NodeRef)>,
    pending: Option<Document>,
    documents: DocumentCursor,
    emitted: HashSet<ObjectId>,
}

impl NodeCursor {
    /// Builds the cursor and discards the first `skip` merged results.
    ///
    /// `cached` must already be in the order of `sort`.
    pub(crate) fn new(
        graph: Graph,
        collection: &str,
        query: Query,
        key: (String, SortDirection),
        cached: Vec<NodeRef>,
        documents: DocumentCursor,
        skip: usize,
    ) -> Result<Self> {
        let cached = cached
            .into_iter()
            .map(|node| (sort_value(&node.snapshot(), &key.0), node))
            .collect();
        let mut cursor = Self {
            graph,
            collection: collection.to_string(),
            query,
            key,
            cached,
            pending: None,
            documents,
            emitted: HashSet::new(),
        };
        for _ in 0..skip {
            if cursor.next().transpose()?.is_none() {
                break;
            }
        }
        Ok(cursor)
    }

    /// Number of stored matches plus the never-saved resident matches not
    /// yet consumed. The store side ignores skip and limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the store count fails.
    pub fn total(&self) -> Result<usize> {
        let unsaved = self.cached.iter().filter(|(_, node)| node.is_new()).count();
        Ok(self.graph.store().count(&self.collection, &self.query)? + unsaved)
    }

    fn fill(&mut self) -> Result<()> {
        if self.pending.is_none() {
            self.pending = self.documents.next().transpose()?;
        }
        Ok(())
    }

    /// Next merged entity, duplicates included.
    fn merge_next(&mut self) -> Result<Option<NodeRef>> {
        self.fill()?;
        let Some(document) = self.pending.take() else {
            return Ok(self.cached.pop_front().map(|(_, node)| node));
        };
        let Some((head_key, head)) = self.cached.front() else {
            return self.graph.from_document(&self.collection, document).map(Some);
        };

        if document.id() == Some(head.id()) {
            return Ok(self.cached.pop_front().map(|(_, node)| node));
        }
        let document_key = sort_value(&document, &self.key.0);
        if self.key.1.apply(head_key.cmp(&document_key)).is_lt() {
            self.pending = Some(document);
            return Ok(self.cached.pop_front().map(|(_, node)| node));
        }
        self.graph.from_document(&self.collection, document).map(Some)
    }
}

fn sort_value(document: &Document, field: &str) -> Value {
    if field == ID_FIELD {
        return document.id().map_or(Value::Nil, Value::Id);
    }
    document.get_path(field).cloned().unwrap_or(Value::Nil)
}

impl Iterator for NodeCursor {
    type Item = Result<NodeRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.merge_next() {
                Ok(Some(node)) => {
                    if self.emitted.insert(node.id()) {
                        return Some(Ok(node));
                    }
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl fmt::Debug for NodeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCursor")
            .field("collection", &self.collection)
            .field("query", &self.query)
            .field("cached", &self.cached.len())
            .field("emitted", &self.emitted.len())
            .finish_non_exhaustive()
    }
}
