//! Test fixtures.

use std::sync::Arc;

use serde_json::json;

use stratus_persistence::managed::{ManagedStore, ManagedStoreConfig};
use stratus_persistence::tenant::TenantId;
use stratus_persistence::types::StorableObject;

use super::spies::{CountingCache, CountingSearch, CountingStorage};

/// A managed store wired to counting collaborators.
pub struct Harness {
    /// The store under test.
    pub store: ManagedStore,
    /// Table store spy.
    pub storage: Arc<CountingStorage>,
    /// Cache spy.
    pub cache: Arc<CountingCache>,
    /// Search index spy.
    pub search: Arc<CountingSearch>,
}

impl Harness {
    /// Builds a harness with every side store enabled.
    pub fn new() -> Self {
        Self::with_config(ManagedStoreConfig::default())
    }

    /// Builds a harness with the given store configuration.
    pub fn with_config(config: ManagedStoreConfig) -> Self {
        let storage = Arc::new(CountingStorage::new());
        let cache = Arc::new(CountingCache::new());
        let search = Arc::new(CountingSearch::new());
        let store = ManagedStore::new(storage.clone(), config)
            .expect("valid config")
            .with_cache(cache.clone())
            .with_search(search.clone());
        Self {
            store,
            storage,
            cache,
            search,
        }
    }

    /// Forgets every call recorded so far.
    pub fn reset_counts(&self) {
        self.storage.reset();
        self.cache.reset();
        self.search.reset();
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a tenant id.
pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id)
}

/// A user object with a name attribute.
pub fn user(id: &str, name: &str) -> StorableObject {
    StorableObject::new("user", id).with_attribute("name", json!(name))
}
