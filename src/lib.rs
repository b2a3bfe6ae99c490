//! Skein - Graph-structured object mapper over a document store
//!
//! This crate re-exports all layers of the skein system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: skein_graph       Entities, edges, terminals, traversals, cache
//! Layer 1: skein_store       Document store contract, queries, MemoryStore
//! Layer 0: skein_foundation  Core types (Value, Document, ObjectId, Error)
//! ```

pub use skein_foundation as foundation;
pub use skein_graph as graph;
pub use skein_store as store;
