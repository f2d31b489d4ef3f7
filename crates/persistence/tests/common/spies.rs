//! Counting collaborators.
//!
//! Each spy delegates to the in-memory backend and records the operation
//! name together with the ids it was called with.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use stratus_persistence::backends::memory::{MemoryCache, MemorySearch, MemoryStorage};
use stratus_persistence::core::{CacheBackend, SearchBackend, StorageBackend};
use stratus_persistence::error::StorageResult;
use stratus_persistence::tenant::TenantId;
use stratus_persistence::types::{Pager, StorableObject};

/// One recorded call: the operation and the ids it touched.
pub type Call = (&'static str, Vec<String>);

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<Call>>);

impl CallLog {
    fn record(&self, op: &'static str, ids: Vec<String>) {
        self.0.lock().push((op, ids));
    }

    fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    fn count(&self, op: &str) -> usize {
        self.0.lock().iter().filter(|(o, _)| *o == op).count()
    }

    fn clear(&self) {
        self.0.lock().clear();
    }
}

fn ids(objects: &[StorableObject]) -> Vec<String> {
    objects.iter().map(|o| o.id().to_string()).collect()
}

/// Table store spy over [`MemoryStorage`].
#[derive(Debug, Default)]
pub struct CountingStorage {
    /// The wrapped store.
    pub inner: MemoryStorage,
    log: CallLog,
}

impl CountingStorage {
    /// Creates an empty spy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.log.count(op)
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.log.clear();
    }
}

#[async_trait]
impl StorageBackend for CountingStorage {
    fn backend_name(&self) -> &'static str {
        "counting-storage"
    }

    async fn create(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        self.log.record("create", vec![object.id().to_string()]);
        self.inner.create(tenant, object).await
    }

    async fn read(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        self.log.record("read", vec![key.to_string()]);
        self.inner.read(tenant, key).await
    }

    async fn update(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        self.log.record("update", vec![object.id().to_string()]);
        self.inner.update(tenant, object).await
    }

    async fn delete(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.log.record("delete", vec![object.id().to_string()]);
        self.inner.delete(tenant, object).await
    }

    async fn create_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        self.log.record("create_all", ids(objects));
        self.inner.create_all(tenant, objects).await
    }

    async fn read_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        self.log.record("read_all", keys.to_vec());
        self.inner.read_all(tenant, keys).await
    }

    async fn update_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        self.log.record("update_all", ids(objects));
        self.inner.update_all(tenant, objects).await
    }

    async fn delete_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.log.record("delete_all", ids(objects));
        self.inner.delete_all(tenant, objects).await
    }

    async fn read_page(
        &self,
        tenant: &TenantId,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        self.log.record("read_page", Vec::new());
        self.inner.read_page(tenant, pager).await
    }
}

/// Cache spy over [`MemoryCache`].
#[derive(Debug, Default)]
pub struct CountingCache {
    /// The wrapped cache.
    pub inner: MemoryCache,
    log: CallLog,
}

impl CountingCache {
    /// Creates an empty spy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.log.count(op)
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.log.clear();
    }
}

#[async_trait]
impl CacheBackend for CountingCache {
    fn backend_name(&self) -> &'static str {
        "counting-cache"
    }

    async fn get(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        self.log.record("get", vec![key.to_string()]);
        self.inner.get(tenant, key).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        self.log.record("get_all", keys.to_vec());
        self.inner.get_all(tenant, keys).await
    }

    async fn put(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.log.record("put", vec![object.id().to_string()]);
        self.inner.put(tenant, object).await
    }

    async fn put_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.log.record("put_all", ids(objects));
        self.inner.put_all(tenant, objects).await
    }

    async fn remove(&self, tenant: &TenantId, key: &str) -> StorageResult<()> {
        self.log.record("remove", vec![key.to_string()]);
        self.inner.remove(tenant, key).await
    }

    async fn remove_all(&self, tenant: &TenantId, keys: &[String]) -> StorageResult<()> {
        self.log.record("remove_all", keys.to_vec());
        self.inner.remove_all(tenant, keys).await
    }

    async fn contains(&self, tenant: &TenantId, key: &str) -> StorageResult<bool> {
        self.inner.contains(tenant, key).await
    }
}

/// Search index spy over [`MemorySearch`].
#[derive(Debug, Default)]
pub struct CountingSearch {
    /// The wrapped index.
    pub inner: MemorySearch,
    log: CallLog,
}

impl CountingSearch {
    /// Creates an empty spy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.log.count(op)
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.log.clear();
    }
}

#[async_trait]
impl SearchBackend for CountingSearch {
    fn backend_name(&self) -> &'static str {
        "counting-search"
    }

    async fn index(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.log.record("index", vec![object.id().to_string()]);
        self.inner.index(tenant, object).await
    }

    async fn index_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.log.record("index_all", ids(objects));
        self.inner.index_all(tenant, objects).await
    }

    async fn unindex(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.log.record("unindex", vec![object.id().to_string()]);
        self.inner.unindex(tenant, object).await
    }

    async fn unindex_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<()> {
        self.log.record("unindex_all", ids(objects));
        self.inner.unindex_all(tenant, objects).await
    }

    async fn rebuild_index(
        &self,
        storage: &dyn StorageBackend,
        tenant: &TenantId,
        destination_index: &str,
        pager: &mut Pager,
    ) -> StorageResult<u64> {
        self.log.record("rebuild_index", vec![destination_index.to_string()]);
        self.inner
            .rebuild_index(storage, tenant, destination_index, pager)
            .await
    }
}
