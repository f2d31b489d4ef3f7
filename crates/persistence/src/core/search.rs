//! Search index collaborator trait.
//!
//! Query semantics belong to the index itself; the persistence core only
//! keeps the index in step with the table store.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject};

use super::StorageBackend;

/// A tenant-scoped search index.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns a human-readable name for this index.
    fn backend_name(&self) -> &'static str;

    /// Adds or replaces one object in the index.
    async fn index(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()>;

    /// Adds or replaces many objects in the index.
    async fn index_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()>;

    /// Removes one object from the index.
    async fn unindex(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()>;

    /// Removes many objects from the index.
    async fn unindex_all(&self, tenant: &TenantId, objects: &[StorableObject])
    -> StorageResult<()>;

    /// Rebuilds a tenant's index from the table store.
    ///
    /// Pages through `storage` starting at the pager's cursor and writes
    /// every indexable object into `destination_index`. Returns the number
    /// of objects indexed.
    async fn rebuild_index(
        &self,
        storage: &dyn StorageBackend,
        tenant: &TenantId,
        destination_index: &str,
        pager: &mut Pager,
    ) -> StorageResult<u64>;
}
