//! Managed store over the DynamoDB backend, with the client mocked out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::backends::dynamodb::mock::{MockDynamo, MockFactory};
use crate::backends::dynamodb::{BackoffConfig, DynamoDbBackend, DynamoDbConfig, RetryLimit};
use crate::backends::memory::{MemoryCache, MemorySearch};
use crate::core::{
    CacheBackend, IoInvocation, IoListener, SearchBackend, StorageBackend, TableLifecycle,
};
use crate::error::{HookError, StorageResult};
use crate::managed::{ManagedStore, ManagedStoreConfig};
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject};

#[derive(Default)]
struct RecordingSearch {
    inner: MemorySearch,
    calls: Mutex<Vec<(&'static str, usize)>>,
}

impl RecordingSearch {
    fn calls(&self) -> Vec<(&'static str, usize)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for RecordingSearch {
    fn backend_name(&self) -> &'static str {
        "recording-search"
    }

    async fn index(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.calls.lock().push(("index", 1));
        self.inner.index(tenant, object).await
    }

    async fn index_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.calls.lock().push(("index_all", objects.len()));
        self.inner.index_all(tenant, objects).await
    }

    async fn unindex(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.calls.lock().push(("unindex", 1));
        self.inner.unindex(tenant, object).await
    }

    async fn unindex_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<()> {
        self.calls.lock().push(("unindex_all", objects.len()));
        self.inner.unindex_all(tenant, objects).await
    }

    async fn rebuild_index(
        &self,
        storage: &dyn StorageBackend,
        tenant: &TenantId,
        destination_index: &str,
        pager: &mut Pager,
    ) -> StorageResult<u64> {
        self.inner
            .rebuild_index(storage, tenant, destination_index, pager)
            .await
    }
}

#[derive(Default)]
struct RecordingCache {
    inner: MemoryCache,
    calls: Mutex<Vec<(&'static str, usize)>>,
}

impl RecordingCache {
    fn calls(&self) -> Vec<(&'static str, usize)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CacheBackend for RecordingCache {
    fn backend_name(&self) -> &'static str {
        "recording-cache"
    }

    async fn get(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        self.inner.get(tenant, key).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        self.inner.get_all(tenant, keys).await
    }

    async fn put(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.calls.lock().push(("put", 1));
        self.inner.put(tenant, object).await
    }

    async fn put_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.calls.lock().push(("put_all", objects.len()));
        self.inner.put_all(tenant, objects).await
    }

    async fn remove(&self, tenant: &TenantId, key: &str) -> StorageResult<()> {
        self.calls.lock().push(("remove", 1));
        self.inner.remove(tenant, key).await
    }

    async fn remove_all(&self, tenant: &TenantId, keys: &[String]) -> StorageResult<()> {
        self.calls.lock().push(("remove_all", keys.len()));
        self.inner.remove_all(tenant, keys).await
    }

    async fn contains(&self, tenant: &TenantId, key: &str) -> StorageResult<bool> {
        self.inner.contains(tenant, key).await
    }
}

#[derive(Default)]
struct OperationLog {
    seen: Mutex<Vec<String>>,
}

impl IoListener for OperationLog {
    fn name(&self) -> &str {
        "operation-log"
    }

    fn on_pre_invoke(&self, invocation: &IoInvocation<'_>) -> Result<(), HookError> {
        self.seen.lock().push(format!(
            "pre:{}:{}",
            invocation.operation,
            invocation.objects.len()
        ));
        Ok(())
    }

    fn on_post_invoke(
        &self,
        invocation: &IoInvocation<'_>,
        result: &[StorableObject],
    ) -> Result<(), HookError> {
        self.seen
            .lock()
            .push(format!("post:{}:{}", invocation.operation, result.len()));
        Ok(())
    }
}

struct Fixture {
    store: ManagedStore,
    backend: Arc<DynamoDbBackend>,
    primary: MockDynamo,
    cache: Arc<RecordingCache>,
    search: Arc<RecordingSearch>,
}

fn fixture(dynamo: DynamoDbConfig, managed: ManagedStoreConfig) -> Fixture {
    let primary = MockDynamo::with_tables(&["stratus-acme"]);
    let factory = MockFactory::with_client(&dynamo.region, primary.clone());
    let backend = Arc::new(DynamoDbBackend::with_factory(dynamo, factory).unwrap());
    let cache = Arc::new(RecordingCache::default());
    let search = Arc::new(RecordingSearch::default());
    let store = ManagedStore::new(backend.clone(), managed)
        .unwrap()
        .with_cache(cache.clone())
        .with_search(search.clone());
    Fixture {
        store,
        backend,
        primary,
        cache,
        search,
    }
}

fn acme() -> TenantId {
    TenantId::new("acme")
}

fn users(count: usize) -> Vec<StorableObject> {
    (0..count)
        .map(|i| StorableObject::new("user", format!("u{i:04}")).with_attribute("n", json!(i)))
        .collect()
}

#[tokio::test]
async fn test_create_all_chunks_store_writes_and_batches_side_stores() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());

    let created = f.store.create_all(&acme(), users(250)).await.unwrap();
    assert_eq!(created.len(), 250);

    assert_eq!(f.primary.call_count("batch_write_item"), 10);
    assert_eq!(f.search.calls(), vec![("index_all", 250)]);
    assert_eq!(f.cache.calls(), vec![("put_all", 250)]);
}

#[tokio::test]
async fn test_flags_select_side_stores() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());
    let mut objects = users(4);
    objects[0].set_indexed(false);
    objects[1].set_cached(false);
    objects[2].set_stored(false);

    f.store.create_all(&acme(), objects).await.unwrap();

    assert_eq!(f.primary.row_keys("stratus-acme").len(), 3);
    assert_eq!(f.search.calls(), vec![("index_all", 3)]);
    assert_eq!(f.cache.calls(), vec![("put_all", 3)]);
}

#[tokio::test]
async fn test_listeners_see_the_batch() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());
    let log = Arc::new(OperationLog::default());
    f.store.register_listener(log.clone());

    f.store.create_all(&acme(), users(30)).await.unwrap();
    f.store
        .delete(&acme(), &StorableObject::new("user", "u0001"))
        .await
        .unwrap();

    assert_eq!(
        *log.seen.lock(),
        vec![
            "pre:createAll:30",
            "post:createAll:30",
            "pre:delete:1",
            "post:delete:1"
        ]
    );
}

#[tokio::test]
async fn test_stale_update_skips_side_stores() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());
    f.store
        .create(&acme(), StorableObject::new("user", "u1").with_version(3))
        .await
        .unwrap();
    let before_search = f.search.calls().len();
    let before_cache = f.cache.calls().len();

    let result = f
        .store
        .update(
            &acme(),
            StorableObject::new("user", "u1")
                .with_version(1)
                .with_attribute("name", json!("lost")),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_conflict());
    assert_eq!(f.search.calls().len(), before_search);
    assert_eq!(f.cache.calls().len(), before_cache);
}

#[tokio::test]
async fn test_update_merges_into_cached_copy() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());
    f.store
        .create(
            &acme(),
            StorableObject::new("user", "u1")
                .with_version(1)
                .with_attribute("name", json!("ann"))
                .with_attribute("email", json!("ann@acme.io")),
        )
        .await
        .unwrap();

    let updated = f
        .store
        .update(
            &acme(),
            StorableObject::new("user", "u1")
                .with_version(1)
                .with_attribute("name", json!("anne")),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.version(), 2);

    let cached = f.cache.inner.get(&acme(), "u1").await.unwrap().unwrap();
    assert_eq!(cached.version(), 2);
    assert_eq!(cached.attribute("name"), Some(&json!("anne")));
    assert_eq!(cached.attribute("email"), Some(&json!("ann@acme.io")));
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_is_raised_when_configured() {
    let dynamo = DynamoDbConfig::default().with_backoff(BackoffConfig {
        initial_delay: Duration::from_millis(10),
        limit: RetryLimit::MaxAttempts(2),
        ..Default::default()
    });
    let f = fixture(dynamo, ManagedStoreConfig::default().with_fail_on_write_error(true));
    f.primary.throttle_batch_writes(5);

    let result = f.store.create_all(&acme(), users(3)).await;
    assert!(result.unwrap_err().is_throttled());
    assert!(f.search.calls().is_empty());
    assert!(f.cache.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_is_logged_by_default() {
    let dynamo = DynamoDbConfig::default().with_backoff(BackoffConfig {
        initial_delay: Duration::from_millis(10),
        limit: RetryLimit::MaxAttempts(2),
        ..Default::default()
    });
    let f = fixture(dynamo, ManagedStoreConfig::default());
    f.primary.throttle_batch_writes(5);

    let created = f.store.create_all(&acme(), users(3)).await.unwrap();
    assert!(created.is_empty());
    assert!(f.search.calls().is_empty());
    assert!(f.cache.calls().is_empty());
}

#[tokio::test]
async fn test_shared_tenant_pages_through_managed_store() {
    let f = fixture(DynamoDbConfig::default(), ManagedStoreConfig::default());
    f.backend.create_shared_table(1, 1).await.unwrap();
    let acme = TenantId::new(" acme");
    let other = TenantId::new(" other");

    f.store.create_all(&acme, users(3)).await.unwrap();
    f.store.create_all(&other, users(2)).await.unwrap();
    assert!(f.primary.row("stratus-shared", "acme_u0000").is_some());

    let mut pager = Pager::with_limit(10);
    let page = f.store.read_page(&acme, &mut pager).await;
    assert_eq!(page.len(), 3);
    assert!(page.iter().all(|o| o.tenant_id() == &acme));
    assert_eq!(pager.count(), 3);
}

#[tokio::test]
async fn test_read_page_clamps_limit() {
    let f = fixture(
        DynamoDbConfig::default(),
        ManagedStoreConfig::default().with_max_page_limit(2),
    );
    f.store.create_all(&acme(), users(5)).await.unwrap();

    let mut pager = Pager::with_limit(100);
    let page = f.store.read_page(&acme(), &mut pager).await;
    assert_eq!(page.len(), 2);
    assert_eq!(pager.limit(), 2);
}

#[tokio::test]
async fn test_reindex_rebuilds_from_table() {
    let f = fixture(
        DynamoDbConfig::default(),
        ManagedStoreConfig::default().with_search_enabled(false),
    );
    f.store.create_all(&acme(), users(7)).await.unwrap();
    assert!(f.search.calls().is_empty());

    let mut pager = Pager::with_limit(3);
    let indexed = f.store.reindex(&acme(), "acme-v2", &mut pager).await.unwrap();
    assert_eq!(indexed, 7);
    assert_eq!(f.search.inner.document_count("acme-v2"), 7);
}
