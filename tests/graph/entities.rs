//! Entity fields, rendering and persistence.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skein::foundation::{doc, ErrorKind, FieldType, Value};
use skein::graph::schema::{CREATED_AT, LAST_MODIFIED};
use skein::graph::{FieldDef, GraphConfig, SaveOptions};
use skein::store::Query;
use time::OffsetDateTime;

use crate::fixtures::{Fixture, DOCS, PARENTS, USERS};

// =============================================================================
// Saving
// =============================================================================

#[test]
fn save_writes_only_when_something_changed() {
    let fx = Fixture::new();
    let d = fx
        .graph
        .create_with(
            DOCS,
            doc! {
                "some_prop" => "prop",
                "some_dict" => doc! { "hey" => "heyhey", "um" => doc! { "yeah" => "thats right" } },
                "some_list" => vec!["a", "b", "c"],
            },
        )
        .unwrap();
    assert!(d.is_new());

    d.save().unwrap();
    assert_eq!(fx.writes(), 1);
    assert!(!d.is_new());
    assert!(!d.is_dirty());

    d.save().unwrap();
    assert_eq!(fx.writes(), 1);

    d.set("myJaws", "Big.").unwrap();
    d.save().unwrap();
    assert_eq!(fx.writes(), 2);

    d.save().unwrap();
    assert_eq!(fx.writes(), 2);

    d.set(LAST_MODIFIED, OffsetDateTime::now_utc()).unwrap();
    d.save().unwrap();
    assert_eq!(fx.writes(), 3);

    d.modify("some_dict", |v| {
        if let Value::Map(map) = v {
            map.set("hey", "heyheyhey");
        }
    })
    .unwrap();
    d.save().unwrap();
    assert_eq!(fx.writes(), 4);

    d.modify("some_dict", |v| {
        if let Value::Map(map) = v {
            if let Some(Value::Map(inner)) = map.get("um").cloned() {
                map.set("um", inner.with("yeah", "what you say?"));
            }
        }
    })
    .unwrap();
    d.save().unwrap();
    assert_eq!(fx.writes(), 5);

    d.modify("some_list", |v| {
        if let Value::List(items) = v {
            items.push_back_mut(Value::from("f"));
        }
    })
    .unwrap();
    d.save().unwrap();
    assert_eq!(fx.writes(), 6);

    let stored = fx.store.get(DOCS, d.id()).unwrap();
    assert_eq!(stored.get_path("some_dict.um.yeah"), Some(&Value::from("what you say?")));
    assert_eq!(stored.get("some_prop"), Some(&Value::from("prop")));
    assert_eq!(stored.get("some_list").and_then(Value::as_list).map(|l| l.len()), Some(4));
}

#[test]
fn reloaded_entity_has_nothing_to_save() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "Very big." }).unwrap();
    d.save().unwrap();
    let id = d.id();
    drop(d);
    fx.graph.clear_cache();
    fx.store.reset_stats();

    let again = fx.graph.from_id(DOCS, id).unwrap().unwrap();
    assert!(!again.is_new());
    assert_eq!(again.get("myJaws"), Value::from("Very big."));
    again.save().unwrap();
    assert_eq!(fx.writes(), 0);
}

#[test]
fn save_stamps_last_modified_unless_told_not_to() {
    let fx = Fixture::with_config(GraphConfig::default().with_update_last_modified(false));
    let d = fx.graph.create(DOCS).unwrap();
    let created = d.get(LAST_MODIFIED);
    d.save().unwrap();
    assert_eq!(d.get(LAST_MODIFIED), created);

    thread::sleep(Duration::from_millis(2));
    d.set("myJaws", "x").unwrap();
    d.save_with(SaveOptions::default()).unwrap();
    assert!(d.get(LAST_MODIFIED).as_timestamp() > created.as_timestamp());
}

#[test]
fn failed_save_can_be_retried() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "x" }).unwrap();

    fx.store.fail_next_writes(1);
    let err = d.save().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Store(_)));
    assert!(d.is_new());
    assert!(fx.store.get(DOCS, d.id()).is_none());

    d.save().unwrap();
    assert!(!d.is_new());
    assert_eq!(fx.store.len(DOCS), 1);
}

#[test]
fn remove_deletes_and_forgets() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    d.save().unwrap();
    assert_eq!(fx.graph.count(DOCS, &Query::All).unwrap(), 1);

    d.remove().unwrap();
    assert_eq!(fx.graph.count(DOCS, &Query::All).unwrap(), 0);
    assert!(fx.graph.from_id(DOCS, d.id()).unwrap().is_none());
    assert!(!fx.graph.registry().contains(d.id()));
}

// =============================================================================
// Fields
// =============================================================================

#[test]
fn set_checks_names_and_types() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();

    let err = d.set("_id", skein::foundation::ObjectId::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsupportedOperation(_)));

    let err = d.set("myJaws", 5).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));

    let err = d.set("messages", 1).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NamingConflict { .. }));

    let parent = fx.graph.create(PARENTS).unwrap();
    let err = parent.set("sub_node", 1).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NamingConflict { .. }));

    let user = fx.graph.create(USERS).unwrap();
    let err = user.set("email", "a@b.c").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsupportedOperation(_)));
}

#[test]
fn undeclared_names_become_instance_fields() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    d.save().unwrap();
    assert!(!d.is_dirty());

    d.set("nickname", "jaws").unwrap();
    assert!(d.is_dirty());
    assert!(d.field_names().contains(&"nickname".to_string()));
    let err = d.set("nickname", 3).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}

#[test]
fn instance_fields_survive_a_reload() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    d.set("nickname", "jaws").unwrap();
    d.save().unwrap();
    let id = d.id();
    drop(d);
    fx.graph.clear_cache();

    let again = fx.graph.from_id(DOCS, id).unwrap().unwrap();
    assert_eq!(again.get("nickname"), Value::from("jaws"));

    again.add_field(FieldDef::new("nickname", FieldType::String)).unwrap();
    assert_eq!(again.get("nickname"), Value::from("jaws"));
    again.set("nickname", "even bigger").unwrap();
    again.save().unwrap();
    assert_eq!(
        fx.store.get(DOCS, id).unwrap().get("nickname"),
        Some(&Value::from("even bigger"))
    );

    let err = again.add_field(FieldDef::new("myJaws", FieldType::String)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NamingConflict { .. }));
}

#[test]
fn remove_field_drops_it_from_the_next_write() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    d.set("nickname", "jaws").unwrap();
    d.save().unwrap();

    d.remove_field("nickname").unwrap();
    assert!(d.is_dirty());
    assert_eq!(d.get("nickname"), Value::Nil);
    d.save().unwrap();
    assert!(fx.store.get(DOCS, d.id()).unwrap().get("nickname").is_none());

    let err = d.remove_field(CREATED_AT).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsupportedOperation(_)));
}

#[test]
fn update_rejects_unknown_fields_atomically() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();

    let err = d
        .update(&doc! { "myJaws" => "Very big.", "someOtherProp" => true })
        .unwrap_err();
    match err.kind {
        ErrorKind::UnknownField { fields, owner } => {
            assert_eq!(fields, vec!["someOtherProp".to_string()]);
            assert_eq!(owner, DOCS);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(d.get("myJaws"), Value::from(""));

    d.update(&doc! { "myJaws" => "Very big.", "guid" => "ignored" }).unwrap();
    assert_eq!(d.get("myJaws"), Value::from("Very big."));
}

#[test]
fn update_skips_protected_fields() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    let created = d.get(CREATED_AT);
    d.update(&doc! { CREATED_AT => OffsetDateTime::UNIX_EPOCH }).unwrap();
    assert_eq!(d.get(CREATED_AT), created);
}

#[test]
fn update_ignores_unknown_fields_without_checks() {
    let fx = Fixture::with_config(GraphConfig::default().with_check_errors(false));
    let d = fx.graph.create(DOCS).unwrap();
    d.update(&doc! { "myJaws" => "Very big.", "someOtherProp" => true }).unwrap();
    assert_eq!(d.get("myJaws"), Value::from("Very big."));
    assert_eq!(d.get("someOtherProp"), Value::Nil);
}

// =============================================================================
// Identity and rendering
// =============================================================================

#[test]
fn render_hides_identity_and_adds_guid() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "So big." }).unwrap();
    let rendered = d.render().unwrap();
    assert_eq!(rendered.get("myJaws"), Some(&Value::from("So big.")));
    assert!(!rendered.contains_key("_id"));
    assert_eq!(rendered.get("guid"), Some(&Value::from(d.guid())));

    let pre = d.pre_render();
    assert!(pre.contains_key(CREATED_AT));
    assert!(pre.contains_key("guid"));
    assert!(!pre.contains_key("myJaws"));
}

#[test]
fn keys_and_references() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    assert_eq!(d.to_key(), format!("{DOCS}:{}", d.id()));
    let dbref = d.to_dbref();
    assert_eq!(dbref.get("collection"), Some(&Value::from(DOCS)));
    assert_eq!(dbref.id(), Some(d.id()));
}

#[test]
fn one_live_instance_per_identity() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "x" }).unwrap();
    let same = fx.graph.from_document(DOCS, d.to_document().unwrap()).unwrap();
    assert!(Arc::ptr_eq(&d, &same));

    let err = fx.graph.create_with(DOCS, doc! { "_id" => d.id() }).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsupportedOperation(_)));

    let err = fx.graph.from_document(PARENTS, d.to_document().unwrap()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}

#[test]
fn unknown_collections_are_rejected() {
    let fx = Fixture::new();
    let err = fx.graph.create("nowhere").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownEntityType(_)));
}
