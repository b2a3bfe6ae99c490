//! Integration tests for MemoryStore

use skein::foundation::{doc, ErrorKind, ObjectId, Value};
use skein::store::{DocumentStore, FindOptions, MemoryStore, Query, Sort, SortDirection, StoreStats};

fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    for (raw, name, age) in [(1, "ada", 36), (2, "bea", 20), (3, "cid", 52)] {
        store
            .save("people", &doc! { "_id" => ObjectId::from_u128(raw), "name" => name, "age" => age })
            .unwrap();
    }
    store
}

fn names(store: &MemoryStore, query: &Query, options: &FindOptions) -> Vec<String> {
    store
        .find("people", query, options)
        .unwrap()
        .map(|d| d.unwrap().get("name").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect()
}

#[test]
fn find_applies_sort_skip_and_limit() {
    let store = seeded();
    assert_eq!(names(&store, &Query::All, &FindOptions::new()), vec!["cid", "bea", "ada"]);

    let by_age = FindOptions::new().with_sort(Sort::by("age", SortDirection::Ascending));
    assert_eq!(names(&store, &Query::All, &by_age), vec!["bea", "ada", "cid"]);
    assert_eq!(names(&store, &Query::All, &by_age.clone().with_skip(1).with_limit(1)), vec!["ada"]);
    assert_eq!(names(&store, &Query::field("age").gt(30), &by_age), vec!["ada", "cid"]);
}

#[test]
fn count_ignores_paging() {
    let store = seeded();
    assert_eq!(store.count("people", &Query::All).unwrap(), 3);
    assert_eq!(store.count("people", &Query::eq("name", "ada")).unwrap(), 1);
    assert_eq!(store.count("nobody", &Query::All).unwrap(), 0);
}

#[test]
fn save_replaces_the_whole_document() {
    let store = seeded();
    let id = ObjectId::from_u128(1);
    store.save("people", &doc! { "_id" => id, "name" => "ada lovelace" }).unwrap();
    let saved = store.get("people", id).unwrap();
    assert_eq!(saved.get("name"), Some(&Value::from("ada lovelace")));
    assert!(saved.get("age").is_none());
    assert_eq!(store.len("people"), 3);
}

#[test]
fn save_requires_an_identity() {
    let store = MemoryStore::new();
    let err = store.save("people", &doc! { "name" => "anon" }).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Store(_)));
    assert!(store.is_empty("people"));
}

#[test]
fn remove_and_drop() {
    let store = seeded();
    assert!(store.remove("people", ObjectId::from_u128(2)).unwrap());
    assert!(!store.remove("people", ObjectId::from_u128(2)).unwrap());
    assert_eq!(store.len("people"), 2);

    store.drop_collection("people").unwrap();
    assert!(store.is_empty("people"));
    assert!(store.collection_names().is_empty());
}

#[test]
fn find_one_and_distinct() {
    let store = seeded();
    let oldest = store
        .find_one("people", &Query::All, &Sort::by("age", SortDirection::Descending))
        .unwrap()
        .unwrap();
    assert_eq!(oldest.get("name"), Some(&Value::from("cid")));
    assert!(store.find_one("people", &Query::eq("name", "zed"), &Sort::default()).unwrap().is_none());

    store.save("people", &doc! { "_id" => ObjectId::from_u128(4), "name" => "ada", "age" => 1 }).unwrap();
    assert_eq!(store.distinct("people", "name").unwrap().len(), 3);
}

#[test]
fn stats_and_injected_failures() {
    let store = seeded();
    assert_eq!(store.stats().writes, 3);
    store.reset_stats();
    assert_eq!(store.stats(), StoreStats::default());

    store.fail_next_writes(2);
    let id = ObjectId::from_u128(9);
    assert!(store.save("people", &doc! { "_id" => id }).is_err());
    assert!(store.remove("people", ObjectId::from_u128(1)).is_err());
    store.save("people", &doc! { "_id" => id }).unwrap();

    store.count("people", &Query::All).unwrap();
    let stats = store.stats();
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.removes, 0);
    assert_eq!(stats.queries, 1);
}
