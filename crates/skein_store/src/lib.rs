//! Backing document store for skein.
//!
//! This crate provides:
//! - [`DocumentStore`] - The contract every backing store implements
//! - [`Query`] / [`Condition`] - The store's query language
//! - [`Sort`] / [`FindOptions`] - Cursor ordering, skip and limit
//! - [`MemoryStore`] - An in-process store with write statistics,
//!   failure injection and `MessagePack` snapshots

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod memory;
pub mod query;
pub mod snapshot;
pub mod store;

pub use memory::{MemoryStore, StoreStats};
pub use query::{Condition, FieldQuery, FindOptions, Query, Sort, SortDirection};
pub use store::{DocumentCursor, DocumentStore};

pub use skein_foundation::{Error, ErrorKind, Result};
