//! Integration tests for Document and ObjectId
//!
//! Tests the doc! macro, dotted paths, overlays, change detection, and
//! identity parsing.

use proptest::prelude::*;
use skein::foundation::document::ID_FIELD;
use skein::foundation::{doc, Document, ErrorKind, ObjectId, Value};

// =============================================================================
// Construction
// =============================================================================

#[test]
fn doc_macro_builds_key_ordered_documents() {
    let d = doc! { "b" => 2, "a" => 1, "c" => "three" };
    let keys: Vec<&String> = d.keys().collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(d.len(), 3);
    assert!(doc! {}.is_empty());
}

#[test]
fn default_document_is_empty() {
    let d = Document::default();
    assert!(d.is_empty());
    assert_eq!(d, Document::new());
}

#[test]
fn documents_collect_from_pairs() {
    let d: Document = [("x", 1), ("y", 2)].into_iter().collect();
    assert_eq!(d, doc! { "x" => 1, "y" => 2 });
}

#[test]
fn with_returns_an_extended_copy() {
    let base = doc! { "name" => "ada" };
    let extended = base.clone().with("age", 36);
    assert_eq!(base.len(), 1);
    assert_eq!(extended.get("age"), Some(&Value::from(36)));
}

// =============================================================================
// Paths and Identity
// =============================================================================

#[test]
fn paths_descend_into_maps_only() {
    let d = doc! {
        "address" => doc! { "geo" => doc! { "lat" => 48.8 } },
        "tags" => vec!["a"],
    };
    assert_eq!(d.get_path("address.geo.lat"), Some(&Value::from(48.8)));
    assert!(d.get_path("address.zip").is_none());
    assert!(d.get_path("tags.0").is_none());
    assert!(d.get_path("").is_none());
}

#[test]
fn id_requires_an_identity_value() {
    let id = ObjectId::new();
    assert_eq!(doc! { ID_FIELD => id }.id(), Some(id));
    assert_eq!(doc! { ID_FIELD => id.to_string() }.id(), None);
    assert_eq!(Document::new().id(), None);
}

#[test]
fn ids_parse_their_display_form() {
    let id = ObjectId::new();
    assert_eq!(ObjectId::parse(&id.to_string()).unwrap(), id);
    assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);

    let err = ObjectId::parse("not-an-id").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SerializationError(_)));
}

#[test]
fn id_timestamps_are_recent() {
    let before = time::OffsetDateTime::now_utc() - time::Duration::seconds(1);
    assert!(ObjectId::new().timestamp() >= before);
}

// =============================================================================
// Overlays and Changes
// =============================================================================

#[test]
fn overlay_keeps_untouched_fields() {
    let stored = doc! { "name" => "ada", "age" => 36 };
    let edits = doc! { "age" => 37, "city" => "London" };
    let merged = stored.overlay(&edits);
    assert_eq!(merged, doc! { "name" => "ada", "age" => 37, "city" => "London" });
    assert_eq!(stored.get("age"), Some(&Value::from(36)));
}

#[test]
fn changed_keys_reports_edits_additions_and_removals() {
    let stored = doc! { "name" => "ada", "age" => 36, "gone" => true };
    let current = doc! { "name" => "ada", "age" => 37, "new" => 1 };
    assert_eq!(current.changed_keys(&stored), vec!["age", "gone", "new"]);
    assert!(stored.changed_keys(&stored.clone()).is_empty());
}

#[test]
fn nested_edits_are_changes() {
    let stored = doc! { "meta" => doc! { "n" => 1 } };
    let current = doc! { "meta" => doc! { "n" => 2 } };
    assert_eq!(current.changed_keys(&stored), vec!["meta"]);
}

proptest! {
    #[test]
    fn overlay_with_self_is_identity(pairs in prop::collection::vec(("[a-e]", any::<i64>()), 0..8)) {
        let d: Document = pairs.into_iter().collect();
        prop_assert_eq!(d.overlay(&d), d.clone());
        prop_assert!(d.changed_keys(&d).is_empty());
    }
}
