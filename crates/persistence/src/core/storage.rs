//! Table store traits.
//!
//! This module defines [`StorageBackend`], the data-plane contract of the
//! durable table store, and [`TableLifecycle`], the control-plane extension
//! that creates, replicates and drops physical tables.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject};

/// Data-plane operations of the durable table store.
///
/// Every operation is scoped to one tenant. Whether the tenant lives in a
/// dedicated table or in the shared table is resolved by the backend.
///
/// # Versioning
///
/// `update` is conditional when the object carries a positive version: the
/// stored version must match, the stored version then becomes `version + 1`
/// and the returned object carries it. A failed condition is not an error;
/// the returned object carries the `-1` conflict sentinel instead. A version
/// of `0` writes unconditionally. `create` is always an unconditional put.
///
/// # Example
///
/// ```ignore
/// use stratus_persistence::core::StorageBackend;
/// use stratus_persistence::tenant::TenantId;
/// use stratus_persistence::types::StorableObject;
///
/// async fn example<S: StorageBackend>(storage: &S) -> StorageResult<()> {
///     let tenant = TenantId::new("acme");
///     let created = storage.create(&tenant, &StorableObject::new("user", "u1")).await?;
///
///     let mut stale = created.clone();
///     stale.set_version(7);
///     let result = storage.update(&tenant, &stale).await?;
///     assert!(result.is_conflict());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Writes a new object. Unconditional.
    ///
    /// Sets the creation timestamp when the object has none.
    async fn create(&self, tenant: &TenantId, object: &StorableObject)
    -> StorageResult<StorableObject>;

    /// Reads one object by id.
    async fn read(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>>;

    /// Updates an object, conditionally on its version when positive.
    async fn update(&self, tenant: &TenantId, object: &StorableObject)
    -> StorageResult<StorableObject>;

    /// Deletes an object. Deleting a missing object succeeds.
    async fn delete(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()>;

    /// Writes many objects, in chunks. Results keep input order.
    async fn create_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>>;

    /// Reads many objects by id. Missing ids are absent from the map.
    async fn read_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>>;

    /// Updates many objects, one conditional update each. Results keep input order.
    async fn update_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>>;

    /// Deletes many objects, in chunks.
    async fn delete_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()>;

    /// Reads one page of a tenant's objects.
    ///
    /// Resumes from `pager.last_key()` and writes the new cursor and the
    /// running count back into `pager`. Shared tenants are routed to
    /// [`read_page_shared`](Self::read_page_shared).
    async fn read_page(&self, tenant: &TenantId, pager: &mut Pager)
    -> StorageResult<Vec<StorableObject>>;

    /// Reads one page of a shared tenant's objects through the tenant index.
    async fn read_page_shared(
        &self,
        tenant: &TenantId,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        self.read_page(tenant, pager).await
    }
}

/// Table lifecycle operations.
///
/// Extends [`StorageBackend`] with table creation, replication and removal.
/// These are administrative operations, not part of the request path.
#[async_trait]
pub trait TableLifecycle: StorageBackend {
    /// Returns `true` if the tenant's table exists.
    async fn table_exists(&self, tenant: &TenantId) -> StorageResult<bool>;

    /// Creates the tenant's dedicated table.
    ///
    /// Returns `false` for shared tenants, which have no table of their own.
    /// When replica regions are configured and the tenant is not the root
    /// tenant, replica tables are created in the background and linked into
    /// one replicated table group.
    async fn create_table(
        &self,
        tenant: &TenantId,
        read_capacity: i64,
        write_capacity: i64,
    ) -> StorageResult<bool>;

    /// Deletes the tenant's table, in every replica region first.
    async fn delete_table(&self, tenant: &TenantId) -> StorageResult<bool>;

    /// Creates the table used by all shared tenants, with its tenant index.
    async fn create_shared_table(
        &self,
        read_capacity: i64,
        write_capacity: i64,
    ) -> StorageResult<bool>;

    /// Deletes every row of a shared tenant. Returns the number of rows deleted.
    async fn delete_all_for_tenant(&self, tenant: &TenantId) -> StorageResult<u64>;
}
