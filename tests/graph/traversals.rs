//! Traversals computed through terminals, and the cascading save they ride on.

use skein::foundation::{doc, Document, ObjectId, Value};
use skein::store::{DocumentStore, Query};
use time::OffsetDateTime;

use crate::fixtures::{Fixture, CONTACTS, EMAILS, USERS};

const MY_EMAIL: &str = "boogers@brains.com";
const NEW_EMAIL: &str = "boogers2@brains.com";

#[test]
fn traversals_follow_live_terminals() {
    let fx = Fixture::new();
    let e = fx.graph.create_with(EMAILS, doc! { "email" => MY_EMAIL }).unwrap();
    let user = e.single("user").unwrap().unwrap();
    assert!(user.single("contactInfo").unwrap().is_none());
    assert_eq!(user.traversal("hasContactInfo").unwrap(), Value::from(false));

    let contact = fx.graph.create(CONTACTS).unwrap();
    user.set_single("contactInfo", Some(&contact)).unwrap();
    assert_eq!(user.traversal("email").unwrap(), Value::from(MY_EMAIL));
    assert_eq!(user.traversal("hasContactInfo").unwrap(), Value::from(true));
    assert_eq!(contact.traversal("email").unwrap(), Value::from(MY_EMAIL));

    let e2 = fx.graph.create_with(EMAILS, doc! { "email" => NEW_EMAIL }).unwrap();
    e2.set_single("user", Some(&user)).unwrap();
    assert_eq!(user.traversal("email").unwrap(), Value::from(NEW_EMAIL));
    assert_eq!(user.traversal("emailCount").unwrap(), Value::from(2));
    assert_eq!(contact.traversal("email").unwrap(), Value::from(NEW_EMAIL));
    assert_eq!(
        e2.single("user").unwrap().unwrap().single("contactInfo").unwrap().as_ref(),
        Some(&contact)
    );

    // Two emails with two edges to one user, with one edge to one contact.
    e.save().unwrap();
    assert_eq!(fx.writes(), 7);

    let stored = fx.store.get(USERS, user.id()).unwrap();
    assert_eq!(stored.get("email"), Some(&Value::from(NEW_EMAIL)));
    assert_eq!(stored.get("hasContactInfo"), Some(&Value::from(true)));
}

#[test]
fn traversal_defaults() {
    let fx = Fixture::new();
    let contact = fx
        .graph
        .create_with(CONTACTS, doc! { "phoneNumber" => "555-0100" })
        .unwrap();
    assert_eq!(contact.traversal("displayName").unwrap(), Value::from("555-0100"));
    assert_eq!(contact.traversal("email").unwrap(), Value::from(""));

    let user = fx.graph.create_with(USERS, doc! { "firstName" => "Ada" }).unwrap();
    user.set_single("contactInfo", Some(&contact)).unwrap();
    assert_eq!(contact.traversal("displayName").unwrap(), Value::from("Ada"));

    assert!(user.list("emails").unwrap().is_empty().unwrap());
    assert_eq!(user.traversal("email").unwrap(), Value::from(""));
    assert_eq!(user.traversal("emailCount").unwrap(), Value::from(0));
}

#[test]
fn traversals_are_read_only() {
    let fx = Fixture::new();
    let user = fx.graph.create(USERS).unwrap();
    assert!(user.set("email", "x").is_err());
    assert!(user.traversal("nope").is_err());
    let rendered = user.render().unwrap();
    assert!(rendered.contains_key("email"));
    assert!(!rendered.contains_key("emails"));
}

// =============================================================================
// Loaded from the store
// =============================================================================

const EMAIL_ID: u128 = 0x52d5_d7c9_2cc8_2304_71fe_df99;
const USER_ID: u128 = 0x52d5_d7c9_2cc8_2304_71fe_df9a;
const USER_EDGE_ID: u128 = 0x52d5_d7c9_2cc8_2304_71fe_df9b;
const CONTACT_ID: u128 = 0x52d5_d7c9_2cc8_2304_71fe_df9c;
const CONTACT_EDGE_ID: u128 = 0x52d5_d7c9_2cc8_2304_71fe_df9d;

fn stamped(document: Document) -> Document {
    let at = OffsetDateTime::from_unix_timestamp(1_389_717_321).unwrap();
    document.with("createdAt", at).with("lastModified", at)
}

fn edge(id: u128, from: (u128, &str), to: (u128, &str), name: &str) -> Document {
    stamped(doc! {
        "_id" => ObjectId::from_u128(id),
        "outboundId" => ObjectId::from_u128(from.0),
        "outboundCollection" => from.1,
        "inboundId" => ObjectId::from_u128(to.0),
        "inboundCollection" => to.1,
        "name" => name,
        "terminalType" => "node",
        "data" => Document::new(),
    })
}

fn load_objects(fx: &Fixture) {
    let store = &fx.store;
    store
        .save(EMAILS, &stamped(doc! { "_id" => ObjectId::from_u128(EMAIL_ID), "email" => MY_EMAIL }))
        .unwrap();
    store
        .save(
            USERS,
            &stamped(doc! {
                "_id" => ObjectId::from_u128(USER_ID),
                "firstName" => "",
                "email" => MY_EMAIL,
                "hasContactInfo" => true,
            }),
        )
        .unwrap();
    store
        .save(
            CONTACTS,
            &stamped(doc! {
                "_id" => ObjectId::from_u128(CONTACT_ID),
                "phoneNumber" => "",
                "email" => MY_EMAIL,
            }),
        )
        .unwrap();
    store
        .save("edges", &edge(USER_EDGE_ID, (EMAIL_ID, EMAILS), (USER_ID, USERS), "user"))
        .unwrap();
    store
        .save(
            "edges",
            &edge(CONTACT_EDGE_ID, (USER_ID, USERS), (CONTACT_ID, CONTACTS), "contactInfo"),
        )
        .unwrap();
}

#[test]
fn traversals_over_stored_graph() {
    let fx = Fixture::new();
    load_objects(&fx);

    let e = fx.graph.find_one(EMAILS, &Query::All).unwrap().unwrap();
    assert_eq!(e.get("email"), Value::from(MY_EMAIL));

    let user = e.single("user").unwrap().unwrap();
    assert_eq!(user.id(), ObjectId::from_u128(USER_ID));

    let e2 = fx.graph.create_with(EMAILS, doc! { "email" => NEW_EMAIL }).unwrap();
    e2.set_single("user", Some(&user)).unwrap();

    let contact = user.single("contactInfo").unwrap().unwrap();
    assert_eq!(contact.id(), ObjectId::from_u128(CONTACT_ID));
    assert_eq!(contact.traversal("email").unwrap(), Value::from(NEW_EMAIL));
}

#[test]
fn inactive_traversals_read_the_stored_value() {
    let fx = Fixture::new();
    load_objects(&fx);

    let user = fx.graph.from_id(USERS, ObjectId::from_u128(USER_ID)).unwrap().unwrap();
    assert_eq!(user.traversal("email").unwrap(), Value::from(MY_EMAIL));
    assert_eq!(user.traversal("hasContactInfo").unwrap(), Value::from(true));
    assert_eq!(user.traversal("emailCount").unwrap(), Value::from(0));
    assert!(!user.is_activated("emails").unwrap());

    assert_eq!(user.list("emails").unwrap().len().unwrap(), 1);
    assert_eq!(user.traversal("emailCount").unwrap(), Value::from(1));
    assert!(user.exists("contactInfo").unwrap());
    assert!(!user.is_activated("contactInfo").unwrap());
}
