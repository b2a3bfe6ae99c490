//! Entity types and graph setup shared by the graph tests.

use std::sync::Arc;

use skein::foundation::FieldType;
use skein::graph::{EntityType, FieldDef, Graph, GraphConfig, TerminalDef, TraversalDef};
use skein::store::{DocumentStore, MemoryStore};
use tracing_subscriber::EnvFilter;

pub const DOCS: &str = "D3";
pub const EMAILS: &str = "users_emails";
pub const USERS: &str = "users_users";
pub const CONTACTS: &str = "users_contactinfo";
pub const PARENTS: &str = "parent_collection";
pub const SUBS: &str = "subnode_collection";
pub const TREES: &str = "treenode_collection";
pub const PEOPLE: &str = "people";
pub const TEAMS: &str = "teams";
pub const PLAYERS: &str = "players";

/// Sends `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A graph over a fresh `MemoryStore` with every test type registered.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub graph: Graph,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn DocumentStore> = store.clone();
        let graph = Graph::with_config(shared, config);
        for ty in [
            documents(),
            emails(),
            users(),
            contacts(),
            parents(),
            subs(),
            trees(),
            people(),
            teams(),
            players(),
        ] {
            graph.register(ty).expect("fixture types are valid");
        }
        Self { store, graph }
    }

    /// Successful store writes so far.
    pub fn writes(&self) -> u64 {
        self.store.stats().writes
    }
}

// =============================================================================
// Types
// =============================================================================

fn documents() -> EntityType {
    EntityType::new(DOCS)
        .with_field(FieldDef::new("myJaws", FieldType::String))
        .with_field(FieldDef::new("some_dict", FieldType::Map))
        .with_field(FieldDef::new("some_list", FieldType::List))
}

fn emails() -> EntityType {
    EntityType::new(EMAILS)
        .with_field(FieldDef::new("email", FieldType::String))
        .with_terminal("user", TerminalDef::outbound_node(USERS).create_on_request())
}

fn users() -> EntityType {
    EntityType::new(USERS)
        .with_field(FieldDef::new("firstName", FieldType::String))
        .with_terminal("emails", TerminalDef::inbound_list(EMAILS, "user"))
        .with_terminal("contactInfo", TerminalDef::outbound_node(CONTACTS))
        .with_traversal("email", TraversalDef::new("emails.email").default_value(""))
        .with_traversal("emailCount", TraversalDef::new("emails.count").default_value(0))
        .with_traversal(
            "hasContactInfo",
            TraversalDef::new("contactInfo.exists").default_value(false),
        )
}

fn contacts() -> EntityType {
    EntityType::new(CONTACTS)
        .with_field(FieldDef::new("phoneNumber", FieldType::String))
        .with_terminal("user", TerminalDef::inbound_node(USERS, "contactInfo"))
        .with_traversal("email", TraversalDef::new("user.email").default_value(""))
        .with_traversal(
            "displayName",
            TraversalDef::new("user.firstName")
                .default_field("phoneNumber")
                .default_value("anonymous"),
        )
}

fn parents() -> EntityType {
    EntityType::new(PARENTS)
        .with_field(FieldDef::new("parent_prop", FieldType::String))
        .with_terminal("sub_node", TerminalDef::outbound_node(SUBS).create_on_request())
        .with_terminal("sub_node_list", TerminalDef::outbound_list(SUBS))
}

fn subs() -> EntityType {
    EntityType::new(SUBS)
        .with_field(FieldDef::new("sub_prop", FieldType::String))
        .with_terminal("parent", TerminalDef::inbound_node(PARENTS, "sub_node"))
        .with_terminal("parents", TerminalDef::inbound_list(PARENTS, "sub_node_list"))
}

fn trees() -> EntityType {
    EntityType::new(TREES)
        .with_field(FieldDef::new("name", FieldType::String))
        .with_terminal("parent", TerminalDef::outbound_node(TREES))
        .with_terminal("children", TerminalDef::inbound_list(TREES, "parent"))
}

fn people() -> EntityType {
    EntityType::new(PEOPLE)
        .with_field(FieldDef::new("name", FieldType::String))
        .with_terminal("friends", TerminalDef::bidirectional_list(PEOPLE))
}

fn teams() -> EntityType {
    EntityType::new(TEAMS)
        .with_field(FieldDef::new("name", FieldType::String))
        .with_terminal(
            "members",
            TerminalDef::outbound_list(PLAYERS)
                .with_attributes(["role", "number"])
                .record_changes()
                .render(),
        )
        .with_terminal(
            "roster",
            TerminalDef::outbound_list(PLAYERS).with_sort(|a, b| a.get("name").cmp(&b.get("name"))),
        )
}

fn players() -> EntityType {
    EntityType::new(PLAYERS).with_field(FieldDef::new("name", FieldType::String))
}
