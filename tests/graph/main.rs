//! Integration tests for Layer 2: Graph
//!
//! Entities, terminals, traversals and the cache, run against a
//! `MemoryStore` whose write counters stand in for a mocked database.

mod cache;
mod entities;
mod fixtures;
mod traversals;
