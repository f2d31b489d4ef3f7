//! Map-backed [`CacheBackend`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::CacheBackend;
use crate::error::StorageResult;
use crate::tenant::TenantId;
use crate::types::StorableObject;

type CacheKey = (TenantId, String);

/// Object cache held in process memory. Entries never expire.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, StorableObject>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached objects across all tenants.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Evicts everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn cache_key(tenant: &TenantId, key: &str) -> CacheKey {
    (tenant.clone(), key.to_string())
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory-cache"
    }

    async fn get(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        Ok(self.entries.read().get(&cache_key(tenant, key)).cloned())
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        let entries = self.entries.read();
        Ok(keys
            .iter()
            .filter_map(|k| {
                entries
                    .get(&cache_key(tenant, k))
                    .map(|o| (k.clone(), o.clone()))
            })
            .collect())
    }

    async fn put(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.entries
            .write()
            .insert(cache_key(tenant, object.id()), object.clone());
        Ok(())
    }

    async fn put_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        let mut entries = self.entries.write();
        for object in objects {
            entries.insert(cache_key(tenant, object.id()), object.clone());
        }
        Ok(())
    }

    async fn remove(&self, tenant: &TenantId, key: &str) -> StorageResult<()> {
        self.entries.write().remove(&cache_key(tenant, key));
        Ok(())
    }

    async fn remove_all(&self, tenant: &TenantId, keys: &[String]) -> StorageResult<()> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(&cache_key(tenant, key));
        }
        Ok(())
    }

    async fn contains(&self, tenant: &TenantId, key: &str) -> StorageResult<bool> {
        Ok(self.entries.read().contains_key(&cache_key(tenant, key)))
    }
}
