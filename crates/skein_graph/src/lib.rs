//! Entities, edges, relationship terminals and the live-entity cache for skein.
//!
//! This crate provides:
//! - [`Graph`] - Schema registry, store handle and cache for one object graph
//! - [`EntityType`] - Field, terminal and traversal declarations
//! - [`Node`] - A persisted entity; the single live instance per identity
//! - [`Edge`] - A stored, named relationship between two entities
//! - [`ListView`] / [`Relationship`] - Access to single-node and list terminals
//! - [`Registry`] - Weak-reference map of live entities with query evaluation
//! - [`NodeCursor`] - Merged, duplicate-free cache and store results

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod cursor;
pub mod edge;
pub mod graph;
pub mod matcher;
pub mod node;
pub mod registry;
pub mod schema;
pub mod terminal;
mod traversal;

pub use config::{GraphConfig, SaveOptions};
pub use cursor::NodeCursor;
pub use edge::Edge;
pub use graph::Graph;
pub use node::{Node, NodeRef};
pub use registry::Registry;
pub use schema::{Direction, EntityType, FieldDef, TerminalDef, TerminalKind, TraversalDef};
pub use terminal::{ChangeAction, ListView, Relationship, TerminalChange};

pub use skein_foundation::{Error, ErrorKind, Result};
