//! Cache collaborator trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::tenant::TenantId;
use crate::types::StorableObject;

/// A tenant-scoped object cache keyed by object id.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns a human-readable name for this cache.
    fn backend_name(&self) -> &'static str;

    /// Looks up one object.
    async fn get(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>>;

    /// Looks up many objects. Misses are absent from the map.
    async fn get_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>>;

    /// Stores one object under its id.
    async fn put(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()>;

    /// Stores many objects.
    async fn put_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()>;

    /// Evicts one object.
    async fn remove(&self, tenant: &TenantId, key: &str) -> StorageResult<()>;

    /// Evicts many objects.
    async fn remove_all(&self, tenant: &TenantId, keys: &[String]) -> StorageResult<()>;

    /// Returns `true` if the key is cached.
    async fn contains(&self, tenant: &TenantId, key: &str) -> StorageResult<bool>;
}
