//! Edge records.
//!
//! An [`Edge`] is an entity in the graph's edge collection recording one
//! directed, named relationship between two entities. Edges are created and
//! deleted by the terminals that own them; they have no cascade of their own.

use std::fmt;

use skein_foundation::{doc, Document, Error, ErrorKind, ObjectId, Result, Value};

use crate::config::SaveOptions;
use crate::graph::Graph;
use crate::node::{Node, NodeRef, Visited};
use crate::schema::TerminalKind;

/// Identity of the inbound endpoint.
pub const INBOUND_ID: &str = "inboundId";
/// Collection of the inbound endpoint.
pub const INBOUND_COLLECTION: &str = "inboundCollection";
/// Relationship name.
pub const NAME: &str = "name";
/// Identity of the outbound endpoint.
pub const OUTBOUND_ID: &str = "outboundId";
/// Collection of the outbound endpoint.
pub const OUTBOUND_COLLECTION: &str = "outboundCollection";
/// `node` or `list_of_nodes`.
pub const TERMINAL_TYPE: &str = "terminalType";
/// Attribute map carried by attributed lists.
pub const DATA: &str = "data";

/// A typed view of one edge entity.
#[derive(Clone)]
pub struct Edge {
    node: NodeRef,
    outbound_id: ObjectId,
    outbound_collection: String,
    inbound_id: ObjectId,
    inbound_collection: String,
    name: String,
    kind: TerminalKind,
}

impl Edge {
    /// Reads the endpoint fields of an edge entity.
    ///
    /// # Errors
    ///
    /// Returns `InconsistentEdgeState` if a field is missing or malformed.
    pub fn from_node(node: NodeRef) -> Result<Self> {
        let id_field = |field: &str| {
            node.get(field)
                .as_id()
                .ok_or_else(|| Error::inconsistent_edge(node.id(), format!("missing {field}")))
        };
        let text_field = |field: &str| {
            node.get(field)
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::inconsistent_edge(node.id(), format!("missing {field}")))
        };

        let outbound_id = id_field(OUTBOUND_ID)?;
        let inbound_id = id_field(INBOUND_ID)?;
        let outbound_collection = text_field(OUTBOUND_COLLECTION)?;
        let inbound_collection = text_field(INBOUND_COLLECTION)?;
        let name = text_field(NAME)?;
        let kind_name = text_field(TERMINAL_TYPE)?;
        let kind = TerminalKind::parse(&kind_name).ok_or_else(|| {
            Error::inconsistent_edge(node.id(), format!("unknown terminalType {kind_name}"))
        })?;

        Ok(Self {
            node,
            outbound_id,
            outbound_collection,
            inbound_id,
            inbound_collection,
            name,
            kind,
        })
    }

    /// Builds a new, unsaved edge record.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot create entities in its edge
    /// collection.
    pub fn create(
        graph: &Graph,
        outbound: (ObjectId, &str),
        inbound: (ObjectId, &str),
        name: &str,
        kind: TerminalKind,
    ) -> Result<Self> {
        let record = doc! {
            INBOUND_ID => inbound.0,
            INBOUND_COLLECTION => inbound.1,
            NAME => name,
            OUTBOUND_ID => outbound.0,
            OUTBOUND_COLLECTION => outbound.1,
            TERMINAL_TYPE => kind.as_str(),
            DATA => Document::new(),
        };
        let node = graph.create_with(graph.edge_collection(), record)?;
        tracing::debug!(
            edge = %node.id(),
            relationship = name,
            outbound = %outbound.0,
            inbound = %inbound.0,
            "graph.edge.create"
        );
        Self::from_node(node)
    }

    /// Builds a new edge from `outbound` to `inbound`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEdgeParameter` if either endpoint is itself an edge
    /// or the endpoints belong to different graphs.
    pub fn from_nodes(outbound: &Node, inbound: &Node, name: &str, kind: TerminalKind) -> Result<Self> {
        let graph = outbound.graph();
        if !graph.same_graph(inbound.graph()) {
            return Err(Error::new(ErrorKind::InvalidEdgeParameter(
                "endpoints belong to different graphs".to_string(),
            )));
        }
        for endpoint in [outbound, inbound] {
            if endpoint.collection() == graph.edge_collection() {
                return Err(Error::new(ErrorKind::InvalidEdgeParameter(format!(
                    "{} is an edge",
                    endpoint.to_key()
                ))));
            }
        }
        Self::create(
            graph,
            (outbound.id(), outbound.collection()),
            (inbound.id(), inbound.collection()),
            name,
            kind,
        )
    }

    /// Edge identity.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.node.id()
    }

    /// The underlying entity.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Identity of the outbound endpoint.
    #[must_use]
    pub fn outbound_id(&self) -> ObjectId {
        self.outbound_id
    }

    /// Collection of the outbound endpoint.
    #[must_use]
    pub fn outbound_collection(&self) -> &str {
        &self.outbound_collection
    }

    /// Identity of the inbound endpoint.
    #[must_use]
    pub fn inbound_id(&self) -> ObjectId {
        self.inbound_id
    }

    /// Collection of the inbound endpoint.
    #[must_use]
    pub fn inbound_collection(&self) -> &str {
        &self.inbound_collection
    }

    /// Relationship name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cardinality of the terminal that created the edge.
    #[must_use]
    pub fn kind(&self) -> TerminalKind {
        self.kind
    }

    /// The endpoint that is not `id`. For a self-loop, `id` itself.
    #[must_use]
    pub fn other_end(&self, id: ObjectId) -> ObjectId {
        if self.outbound_id == id {
            self.inbound_id
        } else {
            self.outbound_id
        }
    }

    /// The attribute map.
    #[must_use]
    pub fn data(&self) -> Document {
        self.node.get(DATA).as_map().cloned().unwrap_or_default()
    }

    /// One attribute, if set.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.data().get(key).cloned()
    }

    pub(crate) fn set_data(&self, data: Document) -> Result<()> {
        self.node.set(DATA, data)
    }

    /// Writes the edge if it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save(&self) -> Result<()> {
        self.node.save_with(SaveOptions::shallow())
    }

    pub(crate) fn save_visited(&self, visited: &mut Visited, options: SaveOptions) -> Result<()> {
        self.node.save_visited(visited, options)
    }

    /// Deletes the edge record and forgets it. Terminals holding the edge
    /// are not notified.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub fn remove(&self) -> Result<()> {
        let graph = self.node.graph();
        graph.store().remove(graph.edge_collection(), self.id())?;
        graph.registry().deregister(self.id());
        tracing::trace!(edge = %self.id(), relationship = %self.name, "graph.edge.remove");
        Ok(())
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Edge {}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Edge {} {}::{}->{}>",
            self.id(),
            self.name,
            self.outbound_collection,
            self.inbound_collection
        )
    }
}
