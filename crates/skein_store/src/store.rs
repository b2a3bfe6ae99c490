//! The backing store contract.

use std::fmt;

use skein_foundation::{Document, ObjectId, Result, Value};

use crate::query::{FindOptions, Query, Sort};

/// Durable document storage the object graph is layered over.
///
/// Implementations own durability, sorting and the full [`Query`] language.
/// Every call is blocking; timeouts and retries are the implementation's
/// concern. A failed call must leave previously stored data untouched.
pub trait DocumentStore: Send + Sync {
    /// Returns a cursor over matching documents, sorted, skipped and limited
    /// per `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot run the query.
    fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> Result<DocumentCursor>;

    /// Counts matching documents, ignoring skip and limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot run the query.
    fn count(&self, collection: &str, query: &Query) -> Result<usize>;

    /// Inserts or replaces a document by its `_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no identity or the write fails.
    fn save(&self, collection: &str, document: &Document) -> Result<()>;

    /// Removes a document, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn remove(&self, collection: &str, id: ObjectId) -> Result<bool>;

    /// Removes every document in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Returns the first matching document under `sort`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot run the query.
    fn find_one(&self, collection: &str, query: &Query, sort: &Sort) -> Result<Option<Document>> {
        let options = FindOptions::new().with_sort(sort.clone()).with_limit(1);
        self.find(collection, query, &options)?.next().transpose()
    }

    /// Returns the distinct values of a field across the collection, in
    /// ascending order. List fields contribute each element.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot run the query.
    fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        let options = FindOptions::new().with_sort(Sort::unsorted());
        for document in self.find(collection, &Query::All, &options)? {
            match document?.get_path(field) {
                Some(Value::List(items)) => values.extend(items.iter().cloned()),
                Some(value) => values.push(value.clone()),
                None => {}
            }
        }
        values.sort();
        values.dedup();
        Ok(values)
    }
}

/// Forward-only stream of documents returned by [`DocumentStore::find`].
pub struct DocumentCursor {
    inner: Box<dyn Iterator<Item = Result<Document>> + Send>,
}

impl DocumentCursor {
    /// Wraps any fallible document iterator.
    pub fn new(inner: impl Iterator<Item = Result<Document>> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// A cursor over already materialized documents.
    #[must_use]
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self::new(documents.into_iter().map(Ok))
    }

    /// A cursor that yields nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_documents(Vec::new())
    }
}

impl Iterator for DocumentCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for DocumentCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCursor").finish_non_exhaustive()
    }
}
