//! Configuration for a [`Graph`](crate::Graph).

use skein_store::Sort;

/// Configuration shared by every entity bound to one graph.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphConfig {
    /// Collection that holds edge records.
    pub edge_collection: String,

    /// Maximum number of edges fetched when a list terminal activates.
    pub list_fetch_limit: usize,

    /// Whether `save` stamps `lastModified` by default.
    pub update_last_modified: bool,

    /// Enables edge consistency assertions and bulk update field checks.
    pub check_errors: bool,

    /// Sort used by `find` when the caller supplies none.
    pub default_sort: Sort,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_collection: "edges".to_string(),
            list_fetch_limit: 200,
            update_last_modified: true,
            check_errors: true,
            default_sort: Sort::default(),
        }
    }
}

impl GraphConfig {
    /// Builder method to set the edge collection.
    #[must_use]
    pub fn with_edge_collection(mut self, collection: impl Into<String>) -> Self {
        self.edge_collection = collection.into();
        self
    }

    /// Builder method to set the list fetch limit.
    #[must_use]
    pub fn with_list_fetch_limit(mut self, limit: usize) -> Self {
        self.list_fetch_limit = limit;
        self
    }

    /// Builder method to enable/disable `lastModified` stamping.
    #[must_use]
    pub fn with_update_last_modified(mut self, update: bool) -> Self {
        self.update_last_modified = update;
        self
    }

    /// Builder method to enable/disable consistency checks.
    #[must_use]
    pub fn with_check_errors(mut self, check: bool) -> Self {
        self.check_errors = check;
        self
    }

    /// Builder method to set the default sort.
    #[must_use]
    pub fn with_default_sort(mut self, sort: Sort) -> Self {
        self.default_sort = sort;
        self
    }
}

/// Options for one cascading save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// Stamp `lastModified` on every entity written.
    pub update_last_modified: bool,
    /// Cascade into activated terminals.
    pub save_terminals: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            update_last_modified: true,
            save_terminals: true,
        }
    }
}

impl SaveOptions {
    /// Saves only the entity's own fields.
    #[must_use]
    pub fn shallow() -> Self {
        Self {
            save_terminals: false,
            ..Self::default()
        }
    }

    /// Builder method to enable/disable `lastModified` stamping.
    #[must_use]
    pub fn with_update_last_modified(mut self, update: bool) -> Self {
        self.update_last_modified = update;
        self
    }
}
