//! The graph context: entity types, the backing store and the registry.
//!
//! A [`Graph`] is a cheap, cloneable handle. Every entity keeps one, so the
//! schema, configuration and cache it was created under stay reachable for
//! as long as the entity lives.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use skein_foundation::document::ID_FIELD;
use skein_foundation::{Document, Error, ErrorKind, ObjectId, Result, Value};
use skein_store::{DocumentStore, FindOptions, Query, SortDirection};

use crate::config::GraphConfig;
use crate::cursor::NodeCursor;
use crate::node::{Node, NodeRef};
use crate::registry::Registry;
use crate::schema::EntityType;

struct GraphInner {
    store: Arc<dyn DocumentStore>,
    registry: Registry,
    types: RwLock<HashMap<String, Arc<EntityType>>>,
    config: GraphConfig,
}

/// Shared handle to one object graph.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    /// Creates a graph over `store` with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, GraphConfig::default())
    }

    /// Creates a graph with explicit configuration. The edge type is
    /// registered under the configured edge collection.
    #[must_use]
    pub fn with_config(store: Arc<dyn DocumentStore>, config: GraphConfig) -> Self {
        let mut types = HashMap::new();
        types.insert(
            config.edge_collection.clone(),
            Arc::new(EntityType::edge(config.edge_collection.as_str())),
        );
        Self {
            inner: Arc::new(GraphInner {
                store,
                registry: Registry::new(),
                types: RwLock::new(types),
                config,
            }),
        }
    }

    // ===== Schema =====

    /// Validates and registers an entity type.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or `NamingConflict` if the collection
    /// already has a type.
    pub fn register(&self, ty: EntityType) -> Result<Arc<EntityType>> {
        ty.validate()?;
        let mut types = self.inner.types.write();
        if types.contains_key(&ty.collection) {
            return Err(Error::naming_conflict(ty.collection, "graph"));
        }
        let ty = Arc::new(ty);
        types.insert(ty.collection.clone(), Arc::clone(&ty));
        debug!(
            collection = %ty.collection,
            fields = ty.fields.len(),
            terminals = ty.terminals.len(),
            traversals = ty.traversals.len(),
            "graph.type.register"
        );
        Ok(ty)
    }

    /// The type registered for a collection.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if none is registered.
    pub fn entity_type(&self, collection: &str) -> Result<Arc<EntityType>> {
        self.inner
            .types
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::UnknownEntityType(collection.to_string())))
    }

    // ===== Accessors =====

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// The live entity registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Collection holding edge records.
    #[must_use]
    pub fn edge_collection(&self) -> &str {
        &self.inner.config.edge_collection
    }

    /// Returns true if both handles refer to the same graph.
    #[must_use]
    pub fn same_graph(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ===== Construction =====

    /// Creates a fresh entity with default field values.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the collection has no type.
    pub fn create(&self, collection: &str) -> Result<NodeRef> {
        self.create_with(collection, Document::new())
    }

    /// Creates a fresh entity from initial values. The entity is new and
    /// dirty until saved.
    ///
    /// # Errors
    ///
    /// - `UnknownEntityType` if the collection has no type
    /// - `UnsupportedOperation` if `_id` names an entity already in memory
    /// - `TypeMismatch` if a declared field is given a value of another type
    pub fn create_with(&self, collection: &str, mut data: Document) -> Result<NodeRef> {
        let ty = self.entity_type(collection)?;
        let id = match data.get(ID_FIELD) {
            None | Some(Value::Nil) => ObjectId::new(),
            Some(Value::Id(id)) => {
                if self.registry().contains(*id) {
                    return Err(Error::new(ErrorKind::UnsupportedOperation(format!(
                        "{collection}:{id} is already in memory"
                    ))));
                }
                *id
            }
            Some(other) => return Err(Error::type_mismatch("id", other.field_type().to_string())),
        };
        for field in &ty.fields {
            if let Some(value) = data.get(&field.name) {
                if !field.ty.accepts(value) {
                    return Err(Error::type_mismatch(field.ty.to_string(), value.field_type().to_string()));
                }
            }
        }
        data.set(ID_FIELD, id);

        let node = Node::build(self, ty, id, data, true, true);
        self.registry().register(&node);
        trace!(node = %node.to_key(), "graph.node.create");
        Ok(node)
    }

    /// Returns the live instance for a stored document, building and
    /// registering one if none is in memory. Documents without `_id` get a
    /// new identity and start out new.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the identity is live in another collection
    /// or `_id` is not an identity.
    pub fn from_document(&self, collection: &str, document: Document) -> Result<NodeRef> {
        let ty = self.entity_type(collection)?;
        let (id, is_new) = match document.get(ID_FIELD) {
            None => (ObjectId::new(), true),
            Some(Value::Id(id)) => (*id, false),
            Some(other) => return Err(Error::type_mismatch("id", other.field_type().to_string())),
        };
        if let Some(live) = self.registry().get(id) {
            if live.collection() != collection {
                return Err(Error::type_mismatch(collection, live.collection()));
            }
            return Ok(live);
        }
        let node = Node::build(self, ty, id, document, is_new, is_new);
        Ok(self.registry().insert_or_get(node))
    }

    // ===== Retrieval =====

    /// The entity with an identity, from memory or the store.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub fn from_id(&self, collection: &str, id: ObjectId) -> Result<Option<NodeRef>> {
        if let Some(node) = self.registry().lookup(id, collection) {
            return Ok(Some(node));
        }
        self.store()
            .find_one(collection, &Query::id(id), &self.config().default_sort)?
            .map(|document| self.from_document(collection, document))
            .transpose()
    }

    /// Entities for several identities, in the order given. Missing ones
    /// are skipped. The store is asked once, for the non-resident ones.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub fn from_ids(&self, collection: &str, ids: &[ObjectId]) -> Result<Vec<NodeRef>> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.registry().lookup(id, collection) {
                Some(node) => {
                    found.insert(id, node);
                }
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            let documents = self
                .store()
                .find(collection, &Query::id_in(missing), &FindOptions::new())?;
            for document in documents {
                let node = self.from_document(collection, document?)?;
                found.insert(node.id(), node);
            }
        }
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Merged cache and store results under the default options.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` or a store failure.
    pub fn find(&self, collection: &str, query: &Query) -> Result<NodeCursor> {
        self.find_with(collection, query, FindOptions::new(), false)
    }

    /// Merged cache and store results.
    ///
    /// An empty sort is replaced by the configured default. `skip` discards
    /// merged results; `limit` bounds the documents read from the store.
    /// With `skip_cache`, or when the cache cannot evaluate the query, only
    /// the store is consulted.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` or a store failure.
    pub fn find_with(
        &self,
        collection: &str,
        query: &Query,
        options: FindOptions,
        skip_cache: bool,
    ) -> Result<NodeCursor> {
        self.entity_type(collection)?;
        let sort = if options.sort.is_empty() {
            self.config().default_sort.clone()
        } else {
            options.sort
        };
        let key = sort
            .primary()
            .map_or((ID_FIELD.to_string(), SortDirection::Descending), |(field, direction)| {
                (field.to_string(), direction)
            });

        let cached = if skip_cache {
            Vec::new()
        } else {
            match self.registry().find(collection, query, &sort) {
                Ok(nodes) => nodes,
                Err(e) if e.is_recoverable() => {
                    warn!(collection, %query, error = %e, "graph.cache.fallback");
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        };

        let store_options = FindOptions {
            sort,
            skip: 0,
            limit: options.limit.map(|limit| limit.saturating_add(options.skip)),
        };
        let documents = self.store().find(collection, query, &store_options)?;
        NodeCursor::new(self.clone(), collection, query.clone(), key, cached, documents, options.skip)
    }

    /// The first match, from the cache if any resident entity matches.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` or a store failure.
    pub fn find_one(&self, collection: &str, query: &Query) -> Result<Option<NodeRef>> {
        self.entity_type(collection)?;
        match self.registry().find_one(collection, query) {
            Ok(Some(node)) => return Ok(Some(node)),
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                warn!(collection, %query, error = %e, "graph.cache.fallback");
            }
            Err(e) => return Err(e),
        }
        self.store()
            .find_one(collection, query, &self.config().default_sort)?
            .map(|document| self.from_document(collection, document))
            .transpose()
    }

    /// Stored matches plus resident matches never saved.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` or a store failure.
    pub fn count(&self, collection: &str, query: &Query) -> Result<usize> {
        self.find(collection, query)?.total()
    }

    /// Distinct stored values of a field.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>> {
        self.store().distinct(collection, field)
    }

    // ===== Maintenance =====

    /// Removes every entity of a type, with their edges.
    ///
    /// # Errors
    ///
    /// Returns the first failure; entities before it stay removed.
    pub fn drop_type(&self, collection: &str) -> Result<()> {
        let nodes = self.find(collection, &Query::All)?.collect::<Result<Vec<_>>>()?;
        let removed = nodes.len();
        for node in nodes {
            node.remove()?;
        }
        debug!(collection, removed, "graph.type.drop");
        Ok(())
    }

    /// Forgets every resident entity and resets their terminals, which
    /// also releases reference cycles between them.
    pub fn clear_cache(&self) {
        let resident = self.registry().all();
        for node in &resident {
            node.release_terminals();
        }
        self.registry().clear();
        debug!(released = resident.len(), "graph.cache.clear");
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<String> = self.inner.types.read().keys().cloned().collect();
        f.debug_struct("Graph")
            .field("types", &types)
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
