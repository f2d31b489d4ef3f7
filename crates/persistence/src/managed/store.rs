//! The managed store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::{
    BasicValidator, CacheBackend, IoInvocation, IoListener, IoOperation, ObjectValidator,
    SearchBackend, StorageBackend,
};
use crate::error::{SideStoreError, StorageError, StorageResult};
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject};

use super::config::ManagedStoreConfig;
use super::hooks::ListenerRegistry;
use super::pipeline::{StageFailurePolicy, WritePipeline, WriteStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Overwrite,
    Delete,
}

#[derive(Debug, Clone, Copy)]
struct WriteCall<'a> {
    action: Action,
    batch: bool,
    tenant: &'a TenantId,
}

impl WriteCall<'_> {
    fn operation(&self) -> IoOperation {
        match (self.action, self.batch) {
            (Action::Create, false) => IoOperation::Create,
            (Action::Create, true) => IoOperation::CreateAll,
            (Action::Update, false) => IoOperation::Update,
            (Action::Update, true) => IoOperation::UpdateAll,
            (Action::Overwrite, _) => IoOperation::Overwrite,
            (Action::Delete, false) => IoOperation::Delete,
            (Action::Delete, true) => IoOperation::DeleteAll,
        }
    }
}

/// Keeps the table store, the cache and the search index in step.
///
/// Every write runs through a [`WritePipeline`]: the durable write first,
/// then the index, then the cache. Objects opt out of a stage through their
/// `stored`, `indexed` and `cached` flags, and an update rejected for a stale
/// version (returned with version `-1`) never reaches the side stores.
///
/// Reads are cache-aside: a cache hit never reaches the table store, and a
/// miss read from the table store is put into the cache.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use stratus_persistence::backends::memory::{MemoryCache, MemoryStorage};
/// use stratus_persistence::managed::{ManagedStore, ManagedStoreConfig};
/// use stratus_persistence::tenant::TenantId;
/// use stratus_persistence::types::StorableObject;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = ManagedStore::new(Arc::new(MemoryStorage::new()), ManagedStoreConfig::default())?
///     .with_cache(Arc::new(MemoryCache::new()));
/// let tenant = TenantId::new("acme");
///
/// let created = store.create(&tenant, StorableObject::new("User", "")).await?.unwrap();
/// assert_eq!(created.object_type(), "user");
///
/// let read = store.read(&tenant, created.id()).await;
/// assert_eq!(read.as_ref().map(|o| o.id()), Some(created.id()));
/// # Ok(())
/// # }
/// ```
pub struct ManagedStore {
    storage: Arc<dyn StorageBackend>,
    cache: Option<Arc<dyn CacheBackend>>,
    search: Option<Arc<dyn SearchBackend>>,
    validator: Arc<dyn ObjectValidator>,
    listeners: ListenerRegistry,
    pipeline: WritePipeline,
    config: ManagedStoreConfig,
}

impl fmt::Debug for ManagedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedStore")
            .field("storage", &self.storage.backend_name())
            .field("cache", &self.cache.as_ref().map(|c| c.backend_name()))
            .field("search", &self.search.as_ref().map(|s| s.backend_name()))
            .field("listeners", &self.listeners)
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish()
    }
}

impl ManagedStore {
    /// Creates a store over a table store, with no cache or index attached.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(storage: Arc<dyn StorageBackend>, config: ManagedStoreConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            cache: None,
            search: None,
            validator: Arc::new(BasicValidator::new()),
            listeners: ListenerRegistry::new(),
            pipeline: WritePipeline::default(),
            config,
        })
    }

    /// Attaches a cache.
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attaches a search index.
    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    /// Replaces the validator.
    pub fn with_validator(mut self, validator: Arc<dyn ObjectValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the write pipeline.
    pub fn with_pipeline(mut self, pipeline: WritePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Registers a listener invoked around table store writes.
    pub fn register_listener(&self, listener: Arc<dyn IoListener>) {
        self.listeners.register(listener);
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ManagedStoreConfig {
        &self.config
    }

    /// Returns the table store.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    fn cache(&self) -> Option<&dyn CacheBackend> {
        self.cache
            .as_deref()
            .filter(|_| self.config.cache_enabled)
    }

    fn search(&self) -> Option<&dyn SearchBackend> {
        self.search
            .as_deref()
            .filter(|_| self.config.search_enabled)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Creates an object.
    ///
    /// A blank id is replaced with a fresh one. Returns `None` when the object
    /// fails validation, or when the table store fails and
    /// `fail_on_write_error` is off.
    #[instrument(skip(self, tenant, object), fields(tenant = %tenant, id = %object.id()))]
    pub async fn create(
        &self,
        tenant: &TenantId,
        object: StorableObject,
    ) -> StorageResult<Option<StorableObject>> {
        let call = WriteCall {
            action: Action::Create,
            batch: false,
            tenant,
        };
        let Some(object) = self.prepare(&call, object) else {
            return Ok(None);
        };
        Ok(self.run(call, vec![object]).await?.into_iter().next())
    }

    /// Applies a partial update.
    ///
    /// Only the attributes carried by `object` change. With a positive
    /// version the write is conditional, and a stale version comes back as
    /// `-1` without touching the cache or the index.
    #[instrument(skip(self, tenant, object), fields(tenant = %tenant, id = %object.id()))]
    pub async fn update(
        &self,
        tenant: &TenantId,
        object: StorableObject,
    ) -> StorageResult<Option<StorableObject>> {
        let call = WriteCall {
            action: Action::Update,
            batch: false,
            tenant,
        };
        let Some(object) = self.prepare(&call, object) else {
            return Ok(None);
        };
        Ok(self.run(call, vec![object]).await?.into_iter().next())
    }

    /// Replaces an object with an unconditional put.
    #[instrument(skip(self, tenant, object), fields(tenant = %tenant, id = %object.id()))]
    pub async fn overwrite(
        &self,
        tenant: &TenantId,
        object: StorableObject,
    ) -> StorageResult<Option<StorableObject>> {
        let call = WriteCall {
            action: Action::Overwrite,
            batch: false,
            tenant,
        };
        let Some(object) = self.prepare(&call, object) else {
            return Ok(None);
        };
        Ok(self.run(call, vec![object]).await?.into_iter().next())
    }

    /// Deletes an object from the table store, the index and the cache.
    ///
    /// The side stores are cleared whatever the object's flags say.
    #[instrument(skip(self, tenant, object), fields(tenant = %tenant, id = %object.id()))]
    pub async fn delete(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        if object.id().trim().is_empty() {
            warn!("delete skipped, object has no id");
            return Ok(());
        }
        let call = WriteCall {
            action: Action::Delete,
            batch: false,
            tenant,
        };
        self.run(call, vec![object.clone()]).await.map(|_| ())
    }

    /// Creates many objects. Invalid objects are logged and left out.
    #[instrument(skip(self, tenant, objects), fields(tenant = %tenant, count = objects.len()))]
    pub async fn create_all(
        &self,
        tenant: &TenantId,
        objects: Vec<StorableObject>,
    ) -> StorageResult<Vec<StorableObject>> {
        let call = WriteCall {
            action: Action::Create,
            batch: true,
            tenant,
        };
        let objects: Vec<_> = objects
            .into_iter()
            .filter_map(|o| self.prepare(&call, o))
            .collect();
        if objects.is_empty() {
            return Ok(objects);
        }
        self.run(call, objects).await
    }

    /// Applies partial updates to many objects.
    ///
    /// Conditional updates cannot be batched, so the table store applies them
    /// one by one; the cache and the index still see one call each.
    #[instrument(skip(self, tenant, objects), fields(tenant = %tenant, count = objects.len()))]
    pub async fn update_all(
        &self,
        tenant: &TenantId,
        objects: Vec<StorableObject>,
    ) -> StorageResult<Vec<StorableObject>> {
        let call = WriteCall {
            action: Action::Update,
            batch: true,
            tenant,
        };
        let objects: Vec<_> = objects
            .into_iter()
            .filter_map(|o| self.prepare(&call, o))
            .collect();
        if objects.is_empty() {
            return Ok(objects);
        }
        self.run(call, objects).await
    }

    /// Deletes many objects from the table store, the index and the cache.
    #[instrument(skip(self, tenant, objects), fields(tenant = %tenant, count = objects.len()))]
    pub async fn delete_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<()> {
        let objects: Vec<_> = objects
            .iter()
            .filter(|o| !o.id().trim().is_empty())
            .cloned()
            .collect();
        if objects.is_empty() {
            return Ok(());
        }
        let call = WriteCall {
            action: Action::Delete,
            batch: true,
            tenant,
        };
        self.run(call, objects).await.map(|_| ())
    }

    /// Validates and normalizes one object, or logs why it is dropped.
    fn prepare(&self, call: &WriteCall<'_>, mut object: StorableObject) -> Option<StorableObject> {
        if call.action == Action::Create && object.id().trim().is_empty() {
            object.set_id(Uuid::new_v4().to_string());
        }

        let validated = match call.action {
            Action::Update => self.validator.validate_update(&object),
            _ => self.validator.validate(&object),
        };
        if let Err(e) = validated {
            warn!(
                tenant = %call.tenant,
                operation = %call.operation(),
                id = object.id(),
                error = %e,
                "object failed validation, not written"
            );
            return None;
        }

        // A partial update without a type leaves the stored type alone.
        if call.action != Action::Update || !object.object_type().trim().is_empty() {
            object.normalize_type(&self.config.default_type);
        }
        object.set_tenant_id(call.tenant.clone());
        Some(object)
    }

    /// Runs the pipeline and applies the write error policy.
    async fn run(
        &self,
        call: WriteCall<'_>,
        objects: Vec<StorableObject>,
    ) -> StorageResult<Vec<StorableObject>> {
        match self.execute(call, objects).await {
            Ok(objects) => Ok(objects),
            Err(e) if self.config.fail_on_write_error => Err(e),
            Err(e) => {
                error!(
                    tenant = %call.tenant,
                    operation = %call.operation(),
                    error = %e,
                    "write failed"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn execute(
        &self,
        call: WriteCall<'_>,
        mut objects: Vec<StorableObject>,
    ) -> StorageResult<Vec<StorableObject>> {
        for step in self.pipeline.steps() {
            let result = match step.stage {
                WriteStage::Store => self.store_stage(&call, &mut objects).await,
                WriteStage::Index => self.index_stage(&call, &objects).await,
                WriteStage::Cache => self.cache_stage(&call, &objects).await,
            };
            if let Err(e) = result {
                match step.policy {
                    StageFailurePolicy::Abort => return Err(e),
                    StageFailurePolicy::Continue => warn!(
                        tenant = %call.tenant,
                        operation = %call.operation(),
                        stage = %step.stage,
                        error = %e,
                        "write stage failed, continuing"
                    ),
                }
            }
        }
        Ok(objects)
    }

    async fn store_stage(
        &self,
        call: &WriteCall<'_>,
        objects: &mut [StorableObject],
    ) -> StorageResult<()> {
        let tenant = call.tenant;

        if call.action == Action::Delete {
            let objects: &[StorableObject] = objects;
            let invocation = IoInvocation {
                operation: call.operation(),
                tenant,
                objects,
            };
            self.listeners.pre_invoke(&invocation);
            if call.batch {
                self.storage.delete_all(tenant, objects).await?;
            } else if let Some(object) = objects.first() {
                self.storage.delete(tenant, object).await?;
            }
            self.listeners.post_invoke(&invocation, objects);
            return Ok(());
        }

        let pending: Vec<StorableObject> =
            objects.iter().filter(|o| o.is_stored()).cloned().collect();
        let Some(first) = pending.first() else {
            return Ok(());
        };

        let invocation = IoInvocation {
            operation: call.operation(),
            tenant,
            objects: &pending,
        };
        self.listeners.pre_invoke(&invocation);
        let written = match (call.action, call.batch) {
            (Action::Update, false) => vec![self.storage.update(tenant, first).await?],
            (Action::Update, true) => self.storage.update_all(tenant, &pending).await?,
            (_, false) => vec![self.storage.create(tenant, first).await?],
            (_, true) => self.storage.create_all(tenant, &pending).await?,
        };
        self.listeners.post_invoke(&invocation, &written);

        let mut written: HashMap<String, StorableObject> = written
            .into_iter()
            .map(|o| (o.id().to_string(), o))
            .collect();
        for object in objects.iter_mut().filter(|o| o.is_stored()) {
            if let Some(result) = written.remove(object.id()) {
                *object = result;
            }
        }
        for object in objects.iter().filter(|o| o.is_conflict()) {
            warn!(
                tenant = %tenant,
                id = object.id(),
                "version mismatch, cache and index left untouched"
            );
        }
        Ok(())
    }

    async fn index_stage(&self, call: &WriteCall<'_>, objects: &[StorableObject]) -> StorageResult<()> {
        let Some(search) = self.search() else {
            return Ok(());
        };
        let tenant = call.tenant;

        if call.action == Action::Delete {
            return if call.batch {
                search.unindex_all(tenant, objects).await
            } else if let Some(object) = objects.first() {
                search.unindex(tenant, object).await
            } else {
                Ok(())
            };
        }

        let mut eligible: Vec<StorableObject> = objects
            .iter()
            .filter(|o| o.is_indexed() && o.version() >= 0)
            .cloned()
            .collect();
        if call.action == Action::Update {
            eligible = self.load_stored(call, eligible).await?;
        }
        match (eligible.first(), call.batch) {
            (None, _) => Ok(()),
            (Some(_), true) => search.index_all(tenant, &eligible).await,
            (Some(object), false) => search.index(tenant, object).await,
        }
    }

    /// Replaces partial updates with their stored copies, so the index never
    /// receives a partial document. Objects no longer stored are dropped.
    async fn load_stored(
        &self,
        call: &WriteCall<'_>,
        updates: Vec<StorableObject>,
    ) -> StorageResult<Vec<StorableObject>> {
        if updates.is_empty() {
            return Ok(updates);
        }
        if !call.batch {
            let stored = self.storage.read(call.tenant, updates[0].id()).await?;
            return Ok(stored.into_iter().collect());
        }
        let keys: Vec<String> = updates.iter().map(|o| o.id().to_string()).collect();
        let mut stored = self.storage.read_all(call.tenant, &keys).await?;
        Ok(keys.iter().filter_map(|k| stored.remove(k)).collect())
    }

    async fn cache_stage(&self, call: &WriteCall<'_>, objects: &[StorableObject]) -> StorageResult<()> {
        let Some(cache) = self.cache() else {
            return Ok(());
        };
        let tenant = call.tenant;

        if call.action == Action::Delete {
            let keys: Vec<String> = objects.iter().map(|o| o.id().to_string()).collect();
            return if call.batch {
                cache.remove_all(tenant, &keys).await
            } else if let Some(key) = keys.first() {
                cache.remove(tenant, key).await
            } else {
                Ok(())
            };
        }

        let mut entries: Vec<StorableObject> = objects
            .iter()
            .filter(|o| o.is_cached() && o.version() >= 0)
            .cloned()
            .collect();
        if call.action == Action::Update {
            entries = merge_with_cached(cache, tenant, entries).await?;
        }
        match (entries.first(), call.batch) {
            (None, _) => Ok(()),
            (Some(_), true) => cache.put_all(tenant, &entries).await,
            (Some(object), false) => cache.put(tenant, object).await,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Reads one object, from the cache when possible.
    ///
    /// Table store errors are logged and read as "not found".
    #[instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn read(&self, tenant: &TenantId, key: &str) -> Option<StorableObject> {
        if key.trim().is_empty() {
            return None;
        }

        if let Some(cache) = self.cache() {
            match cache.get(tenant, key).await {
                Ok(Some(hit)) => {
                    debug!(key, "cache hit");
                    return Some(hit);
                }
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "cache lookup failed"),
            }
        }

        let object = match self.storage.read(tenant, key).await {
            Ok(object) => object?,
            Err(e) => {
                warn!(key, error = %e, "read failed");
                return None;
            }
        };

        if object.is_cached() {
            if let Some(cache) = self.cache() {
                if let Err(e) = cache.put(tenant, &object).await {
                    warn!(key, error = %e, "failed to cache object");
                }
            }
        }
        Some(object)
    }

    /// Reads many objects, in the order of `keys`.
    ///
    /// Missing keys are left out and duplicates collapse to their first
    /// position. Keys missing from the cache are fetched with a single
    /// table store call; when every key is cached the table store is not
    /// contacted.
    #[instrument(skip(self, tenant, keys), fields(tenant = %tenant, count = keys.len()))]
    pub async fn read_all(&self, tenant: &TenantId, keys: &[String]) -> Vec<StorableObject> {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .iter()
            .filter(|k| !k.trim().is_empty() && seen.insert(k.as_str()))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Vec::new();
        }

        let mut found = HashMap::new();
        if let Some(cache) = self.cache() {
            match cache.get_all(tenant, &keys).await {
                Ok(hits) => found = hits,
                Err(e) => warn!(error = %e, "cache lookup failed"),
            }
        }

        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !found.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            match self.storage.read_all(tenant, &missing).await {
                Ok(loaded) => {
                    self.cache_loaded(tenant, loaded.values()).await;
                    found.extend(loaded);
                }
                Err(e) => warn!(count = missing.len(), error = %e, "batch read failed"),
            }
        }

        keys.into_iter().filter_map(|k| found.remove(&k)).collect()
    }

    async fn cache_loaded<'a>(
        &self,
        tenant: &TenantId,
        loaded: impl Iterator<Item = &'a StorableObject>,
    ) {
        let Some(cache) = self.cache() else {
            return;
        };
        let cacheable: Vec<StorableObject> = loaded.filter(|o| o.is_cached()).cloned().collect();
        if cacheable.is_empty() {
            return;
        }
        if let Err(e) = cache.put_all(tenant, &cacheable).await {
            warn!(count = cacheable.len(), error = %e, "failed to cache objects");
        }
    }

    /// Reads one page from the table store.
    ///
    /// The limit is clamped to the configured maximum. Errors are logged and
    /// read as an empty page.
    #[instrument(skip(self, tenant, pager), fields(tenant = %tenant))]
    pub async fn read_page(&self, tenant: &TenantId, pager: &mut Pager) -> Vec<StorableObject> {
        pager.clamp_limit(self.config.max_page_limit);
        match self.storage.read_page(tenant, pager).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "page read failed");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Rebuilds a tenant's search index from the table store.
    ///
    /// Returns the number of indexed objects.
    ///
    /// # Errors
    ///
    /// Fails when no search index is attached, or when the rebuild fails.
    #[instrument(skip(self, tenant, pager), fields(tenant = %tenant))]
    pub async fn reindex(
        &self,
        tenant: &TenantId,
        destination_index: &str,
        pager: &mut Pager,
    ) -> StorageResult<u64> {
        let Some(search) = self.search.as_deref() else {
            return Err(StorageError::SideStore(SideStoreError::Search {
                message: "no search index attached".to_string(),
            }));
        };
        pager.clamp_limit(self.config.max_page_limit);
        let indexed = search
            .rebuild_index(self.storage.as_ref(), tenant, destination_index, pager)
            .await?;
        info!(index = destination_index, indexed, "reindex finished");
        Ok(indexed)
    }
}

/// Folds partial updates into their cached copies. Uncached objects are
/// dropped, since a partial object must not be served as a whole one.
async fn merge_with_cached(
    cache: &dyn CacheBackend,
    tenant: &TenantId,
    updates: Vec<StorableObject>,
) -> StorageResult<Vec<StorableObject>> {
    if updates.is_empty() {
        return Ok(updates);
    }
    let keys: Vec<String> = updates.iter().map(|o| o.id().to_string()).collect();
    let cached = cache.get_all(tenant, &keys).await?;

    Ok(updates
        .into_iter()
        .filter_map(|update| {
            let mut merged = cached.get(update.id())?.clone();
            let version = if update.is_locking_enabled() {
                update.version()
            } else {
                merged.version()
            };
            merged.merge_from(&update);
            merged.set_version(version);
            Some(merged)
        })
        .collect())
}
