//! Map-backed [`StorageBackend`].

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::core::StorageBackend;
use crate::error::{StorageResult, ValidationError};
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject, now_millis};

type Table = BTreeMap<String, StorableObject>;

/// Table store held in process memory, one ordered map per tenant.
///
/// Follows the same write rules as the DynamoDB backend: puts are
/// unconditional, updates with a positive version are conditional on the
/// stored version and bump it, and pages are ordered by object id with the
/// last returned id as the cursor.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<TenantId, Table>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects stored for a tenant.
    pub fn len(&self, tenant: &TenantId) -> usize {
        self.tables.read().get(tenant).map_or(0, BTreeMap::len)
    }

    fn prepare_create(tenant: &TenantId, object: &StorableObject) -> StorableObject {
        let mut object = object.clone();
        object.set_tenant_id(tenant.clone());
        if object.version() < 0 {
            object.set_version(0);
        }
        if object.timestamp().is_none() {
            object.set_timestamp(Some(now_millis()));
        }
        object
    }

    fn update_in(table: &mut Table, tenant: &TenantId, object: &StorableObject) -> StorableObject {
        let mut object = object.clone();
        object.set_tenant_id(tenant.clone());
        if object.version() < 0 {
            object.set_version(0);
        }
        object.set_updated(Some(now_millis()));

        let stored_version = table.get(object.id()).map_or(0, StorableObject::version);
        let version = if object.is_locking_enabled() {
            if stored_version != object.version() {
                warn!(
                    tenant = %tenant,
                    key = object.id(),
                    version = object.version(),
                    stored_version,
                    "update rejected, stored version has moved on"
                );
                object.mark_conflict();
                return object;
            }
            object.version() + 1
        } else {
            stored_version
        };

        let stored = table
            .entry(object.id().to_string())
            .or_insert_with(|| StorableObject::new(object.object_type(), object.id()));
        stored.merge_from(&object);
        stored.set_version(version);
        if object.is_locking_enabled() {
            object.set_version(version);
        }
        object
    }
}

fn require_id(object: &StorableObject) -> StorageResult<()> {
    if object.id().trim().is_empty() {
        return Err(ValidationError::MissingId.into());
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        require_id(object)?;
        let object = Self::prepare_create(tenant, object);
        self.tables
            .write()
            .entry(tenant.clone())
            .or_default()
            .insert(object.id().to_string(), object.clone());
        Ok(object)
    }

    async fn read(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        Ok(self
            .tables
            .read()
            .get(tenant)
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn update(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        require_id(object)?;
        let mut tables = self.tables.write();
        Ok(Self::update_in(
            tables.entry(tenant.clone()).or_default(),
            tenant,
            object,
        ))
    }

    async fn delete(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        if let Some(table) = self.tables.write().get_mut(tenant) {
            table.remove(object.id());
        }
        Ok(())
    }

    async fn create_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        let created: Vec<_> = objects
            .iter()
            .filter(|o| !o.id().trim().is_empty())
            .map(|o| Self::prepare_create(tenant, o))
            .collect();
        let mut tables = self.tables.write();
        let table = tables.entry(tenant.clone()).or_default();
        for object in &created {
            table.insert(object.id().to_string(), object.clone());
        }
        Ok(created)
    }

    async fn read_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(tenant) else {
            return Ok(HashMap::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| table.get(k).map(|o| (k.clone(), o.clone())))
            .collect())
    }

    async fn update_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        let mut tables = self.tables.write();
        let table = tables.entry(tenant.clone()).or_default();
        Ok(objects
            .iter()
            .filter(|o| !o.id().trim().is_empty())
            .map(|o| Self::update_in(table, tenant, o))
            .collect())
    }

    async fn delete_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        if let Some(table) = self.tables.write().get_mut(tenant) {
            for object in objects {
                table.remove(object.id());
            }
        }
        Ok(())
    }

    async fn read_page(
        &self,
        tenant: &TenantId,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        let page: Vec<StorableObject> = {
            let tables = self.tables.read();
            let Some(table) = tables.get(tenant) else {
                return Ok(Vec::new());
            };
            let lower = match pager.last_key() {
                Some(key) => Bound::Excluded(key.to_string()),
                None => Bound::Unbounded,
            };
            table
                .range((lower, Bound::Unbounded))
                .take(pager.limit() as usize)
                .map(|(_, o)| o.clone())
                .collect()
        };

        if let Some(last) = page.last() {
            pager.set_last_key(Some(last.id().to_string()));
        }
        pager.add_count(page.len());
        Ok(page)
    }
}
