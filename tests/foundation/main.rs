//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, Document, ObjectId, FieldType, Error, and
//! persistent collections.

mod documents;
