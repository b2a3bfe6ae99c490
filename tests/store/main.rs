//! Integration tests for Layer 1: Store
//!
//! Tests for the query language, the in-memory store and its snapshots.

mod memory;
