//! Registry residency and merged cache/store queries.

use std::sync::Arc;

use skein::foundation::{doc, ObjectId, Result, Value};
use skein::graph::{NodeCursor, NodeRef};
use skein::store::{DocumentStore, FindOptions, Query, Sort, SortDirection};

use crate::fixtures::{Fixture, DOCS, PARENTS, PLAYERS, SUBS};

fn ids(cursor: NodeCursor) -> Vec<u128> {
    cursor.map(|node| node.unwrap().id().to_u128()).collect()
}

fn seed(fx: &Fixture, raw: u128, jaws: &str) {
    fx.store
        .save(DOCS, &doc! { "_id" => ObjectId::from_u128(raw), "myJaws" => jaws })
        .unwrap();
}

fn ascending(field: &str) -> FindOptions {
    FindOptions::new().with_sort(Sort::by(field, SortDirection::Ascending))
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn registry_holds_entities_weakly() {
    let fx = Fixture::new();
    let d = fx.graph.create(DOCS).unwrap();
    let id = d.id();
    assert!(fx.graph.registry().contains(id));
    assert_eq!(fx.graph.registry().resident(DOCS).len(), 1);

    drop(d);
    assert!(!fx.graph.registry().contains(id));
    assert!(fx.graph.registry().resident(DOCS).is_empty());
}

#[test]
fn clear_cache_releases_linked_entities() {
    let fx = Fixture::new();
    let parent = fx.graph.create(PARENTS).unwrap();
    let sub = parent.single("sub_node").unwrap().unwrap();
    parent.save().unwrap();
    let weak = Arc::downgrade(&sub);
    drop(sub);
    assert!(weak.upgrade().is_some());

    fx.graph.clear_cache();
    assert!(fx.graph.registry().is_empty());
    assert!(weak.upgrade().is_none());
    assert!(!parent.is_activated("sub_node").unwrap());
}

// =============================================================================
// Merging
// =============================================================================

#[test]
fn merge_interleaves_cache_and_store() {
    let fx = Fixture::new();
    for raw in [25, 20, 5] {
        seed(&fx, raw, "stored");
    }
    let _newest = fx.graph.create_with(DOCS, doc! { "_id" => ObjectId::from_u128(30) }).unwrap();
    let shared = fx.graph.from_id(DOCS, ObjectId::from_u128(20)).unwrap().unwrap();
    let _oldest = fx.graph.create_with(DOCS, doc! { "_id" => ObjectId::from_u128(10) }).unwrap();
    assert_eq!(fx.graph.registry().resident(DOCS).len(), 3);

    let cursor = fx.graph.find(DOCS, &Query::All).unwrap();
    assert_eq!(cursor.total().unwrap(), 5);
    let merged: Vec<NodeRef> = cursor.collect::<Result<_>>().unwrap();
    let raw: Vec<u128> = merged.iter().map(|node| node.id().to_u128()).collect();
    assert_eq!(raw, vec![30, 25, 20, 10, 5]);
    assert!(Arc::ptr_eq(&merged[2], &shared));
}

#[test]
fn merge_with_disjoint_sources() {
    let fx = Fixture::new();
    for raw in [30, 20, 10] {
        seed(&fx, raw, "stored");
    }
    let _a = fx.graph.create_with(DOCS, doc! { "_id" => ObjectId::from_u128(25) }).unwrap();
    let _b = fx.graph.create_with(DOCS, doc! { "_id" => ObjectId::from_u128(5) }).unwrap();

    let cursor = fx.graph.find(DOCS, &Query::All).unwrap();
    assert_eq!(cursor.total().unwrap(), 5);
    assert_eq!(ids(cursor), vec![30, 25, 20, 10, 5]);
}

#[test]
fn in_queries_over_resident_entities() {
    let fx = Fixture::new();
    let players: Vec<NodeRef> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|name| fx.graph.create_with(PLAYERS, doc! { "name" => name }).unwrap())
        .collect();

    let wanted = Query::field("name").is_in(["a", "b"]);
    let found = ids(fx.graph.find(PLAYERS, &wanted).unwrap());
    assert_eq!(found, vec![players[1].id().to_u128(), players[0].id().to_u128()]);

    let either = Query::or([Query::eq("name", "a"), Query::eq("name", "b")]);
    assert_eq!(ids(fx.graph.find(PLAYERS, &either).unwrap()), found);
}

#[test]
fn cached_copy_wins_identity_ties() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "stored" }).unwrap();
    d.save().unwrap();
    d.set("myJaws", "edited").unwrap();

    let found: Vec<NodeRef> = fx.graph.find(DOCS, &Query::All).unwrap().collect::<Result<_>>().unwrap();
    assert_eq!(found.len(), 1);
    assert!(Arc::ptr_eq(&found[0], &d));
    assert_eq!(found[0].get("myJaws"), Value::from("edited"));
}

#[test]
fn moved_entities_are_emitted_once() {
    let fx = Fixture::new();
    let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "b" }).unwrap();
    d.save().unwrap();
    d.set("myJaws", "z").unwrap();

    let cursor = fx.graph.find_with(DOCS, &Query::All, ascending("myJaws"), false).unwrap();
    assert_eq!(ids(cursor), vec![d.id().to_u128()]);
}

#[test]
fn stored_results_come_back_newest_first() {
    let fx = Fixture::new();
    let dees: Vec<_> = (0..3).map(|_| fx.graph.create(DOCS).unwrap()).collect();
    for d in &dees {
        d.save().unwrap();
    }
    let expected: Vec<u128> = dees.iter().rev().map(|d| d.id().to_u128()).collect();
    drop(dees);
    fx.graph.clear_cache();

    let mut cursor = fx.graph.find(DOCS, &Query::All).unwrap();
    assert_eq!(cursor.next().unwrap().unwrap().id().to_u128(), expected[0]);
    assert_eq!(ids(fx.graph.find(DOCS, &Query::All).unwrap()), expected);
}

#[test]
fn id_in_queries() {
    let fx = Fixture::new();
    let dees: Vec<_> = (0..4).map(|_| fx.graph.create(DOCS).unwrap()).collect();
    for d in &dees {
        d.save().unwrap();
    }
    assert_eq!(ids(fx.graph.find(DOCS, &Query::All).unwrap()).len(), 4);

    let wanted = Query::id_in(dees[..3].iter().map(|d| d.id()));
    assert_eq!(ids(fx.graph.find(DOCS, &wanted).unwrap()).len(), 3);
}

#[test]
fn or_queries_count_unsaved_entities() {
    let fx = Fixture::new();
    let _dees: Vec<_> = ["big", "small", "just right"]
        .into_iter()
        .map(|jaws| fx.graph.create_with(DOCS, doc! { "myJaws" => jaws }).unwrap())
        .collect();

    let count = |query: Query| fx.graph.count(DOCS, &query).unwrap();
    assert_eq!(count(Query::eq("myJaws", "big")), 1);
    assert_eq!(
        count(Query::or([Query::eq("myJaws", "big"), Query::eq("myJaws", "small")])),
        2
    );
    assert_eq!(
        count(Query::or([
            Query::eq("myJaws", "big"),
            Query::eq("myJaws", "small"),
            Query::eq("myJaws", "just right"),
        ])),
        3
    );
    assert_eq!(count(Query::field("myJaws").ne("big")), 2);
}

#[test]
fn skip_discards_merged_results() {
    let fx = Fixture::new();
    let _dees: Vec<_> = ["1", "2", "3"]
        .into_iter()
        .map(|jaws| fx.graph.create_with(DOCS, doc! { "myJaws" => jaws }).unwrap())
        .collect();

    let skipped = |options: FindOptions| fx.graph.find_with(DOCS, &Query::All, options, false).unwrap();
    assert_eq!(skipped(FindOptions::new().with_skip(2)).total().unwrap(), 1);
    assert_eq!(
        skipped(ascending("myJaws").with_skip(2)).next().unwrap().unwrap().get("myJaws"),
        Value::from("3")
    );
    assert_eq!(skipped(FindOptions::new().with_skip(4)).total().unwrap(), 0);
}

#[test]
fn limit_bounds_stored_documents() {
    let fx = Fixture::new();
    for raw in 1..=5 {
        seed(&fx, raw, "stored");
    }
    let cursor = fx
        .graph
        .find_with(DOCS, &Query::All, FindOptions::new().with_limit(2), false)
        .unwrap();
    assert_eq!(ids(cursor), vec![5, 4]);
}

#[test]
fn a_hundred_identical_keys() {
    let fx = Fixture::new();
    let dees: Vec<_> = (0..100)
        .map(|_| {
            let d = fx.graph.create_with(DOCS, doc! { "myJaws" => "so sweaty" }).unwrap();
            d.save().unwrap();
            d
        })
        .collect();

    let cursor = fx.graph.find_with(DOCS, &Query::All, ascending("myJaws"), false).unwrap();
    assert_eq!(cursor.count(), dees.len());
}

#[test]
fn unsupported_cache_queries_fall_back_to_the_store() {
    let fx = Fixture::new();
    let saved = fx.graph.create_with(DOCS, doc! { "myJaws" => "a" }).unwrap();
    saved.save().unwrap();
    let _unsaved = fx.graph.create_with(DOCS, doc! { "myJaws" => "b" }).unwrap();

    let found = ids(fx.graph.find(DOCS, &Query::field("myJaws").lt("m")).unwrap());
    assert_eq!(found, vec![saved.id().to_u128()]);
    assert_eq!(fx.graph.count(DOCS, &Query::All).unwrap(), 2);
}

#[test]
fn find_one_prefers_the_cache() {
    let fx = Fixture::new();
    seed(&fx, 1, "stored");
    let unsaved = fx.graph.create_with(DOCS, doc! { "myJaws" => "fresh" }).unwrap();

    let hit = fx.graph.find_one(DOCS, &Query::eq("myJaws", "fresh")).unwrap().unwrap();
    assert!(Arc::ptr_eq(&hit, &unsaved));
    let loaded = fx.graph.find_one(DOCS, &Query::eq("myJaws", "stored")).unwrap().unwrap();
    assert_eq!(loaded.id(), ObjectId::from_u128(1));
    assert!(fx.graph.find_one(DOCS, &Query::eq("myJaws", "none")).unwrap().is_none());
}

#[test]
fn from_ids_keeps_the_requested_order() {
    let fx = Fixture::new();
    for raw in [1, 2, 3] {
        seed(&fx, raw, "stored");
    }
    let resident = fx.graph.from_id(DOCS, ObjectId::from_u128(2)).unwrap().unwrap();
    let requested = [3, 9, 2, 1].map(ObjectId::from_u128);

    let nodes = fx.graph.from_ids(DOCS, &requested).unwrap();
    let found: Vec<u128> = nodes.iter().map(|n| n.id().to_u128()).collect();
    assert_eq!(found, vec![3, 2, 1]);
    assert!(Arc::ptr_eq(&nodes[1], &resident));
}

#[test]
fn distinct_reads_stored_values() {
    let fx = Fixture::new();
    seed(&fx, 1, "a");
    seed(&fx, 2, "a");
    seed(&fx, 3, "c");
    let values = fx.graph.distinct(DOCS, "myJaws").unwrap();
    assert_eq!(values.len(), 2);
    assert!(values.contains(&Value::from("c")));
}

#[test]
fn drop_type_removes_entities_and_their_edges() {
    let fx = Fixture::new();
    for _ in 0..2 {
        let parent = fx.graph.create(PARENTS).unwrap();
        parent.single("sub_node").unwrap();
        parent.save().unwrap();
    }
    assert_eq!(fx.store.len("edges"), 2);

    fx.graph.drop_type(PARENTS).unwrap();
    assert_eq!(fx.store.len(PARENTS), 0);
    assert_eq!(fx.store.len("edges"), 0);
    assert_eq!(fx.store.len(SUBS), 2);
}
