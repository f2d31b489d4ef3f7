//! Map-backed [`SearchBackend`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::{SearchBackend, StorageBackend};
use crate::error::StorageResult;
use crate::tenant::TenantId;
use crate::types::{Pager, StorableObject};

type Documents = BTreeMap<(TenantId, String), StorableObject>;

/// Search index held in process memory.
///
/// Live writes go to an index named after the tenant id; a rebuild writes to
/// whichever index it is given, so a fresh index can be filled before it
/// replaces the live one.
#[derive(Debug, Default)]
pub struct MemorySearch {
    indexes: RwLock<HashMap<String, Documents>>,
}

impl MemorySearch {
    /// Creates an empty index set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an indexed document.
    pub fn document(&self, index: &str, tenant: &TenantId, id: &str) -> Option<StorableObject> {
        self.indexes
            .read()
            .get(index)
            .and_then(|docs| docs.get(&(tenant.clone(), id.to_string())))
            .cloned()
    }

    /// Number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indexes.read().get(index).map_or(0, BTreeMap::len)
    }

    fn write(&self, index: &str, tenant: &TenantId, objects: &[StorableObject]) {
        let mut indexes = self.indexes.write();
        let docs = indexes.entry(index.to_string()).or_default();
        for object in objects {
            docs.insert((tenant.clone(), object.id().to_string()), object.clone());
        }
    }

    fn erase(&self, tenant: &TenantId, objects: &[StorableObject]) {
        let mut indexes = self.indexes.write();
        if let Some(docs) = indexes.get_mut(tenant.as_str()) {
            for object in objects {
                docs.remove(&(tenant.clone(), object.id().to_string()));
            }
        }
    }
}

#[async_trait]
impl SearchBackend for MemorySearch {
    fn backend_name(&self) -> &'static str {
        "memory-search"
    }

    async fn index(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.write(tenant.as_str(), tenant, std::slice::from_ref(object));
        Ok(())
    }

    async fn index_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        self.write(tenant.as_str(), tenant, objects);
        Ok(())
    }

    async fn unindex(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        self.erase(tenant, std::slice::from_ref(object));
        Ok(())
    }

    async fn unindex_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<()> {
        self.erase(tenant, objects);
        Ok(())
    }

    async fn rebuild_index(
        &self,
        storage: &dyn StorageBackend,
        tenant: &TenantId,
        destination_index: &str,
        pager: &mut Pager,
    ) -> StorageResult<u64> {
        let mut indexed = 0u64;
        loop {
            let previous = pager.last_key().map(str::to_string);
            let page = storage.read_page(tenant, pager).await?;
            if page.is_empty() {
                break;
            }

            let batch: Vec<_> = page.into_iter().filter(|o| o.is_indexed()).collect();
            self.write(destination_index, tenant, &batch);
            indexed += batch.len() as u64;
            debug!(tenant = %tenant, index = destination_index, count = batch.len(), "indexed page");

            if !pager.has_advanced(previous.as_deref()) {
                break;
            }
        }
        info!(tenant = %tenant, index = destination_index, indexed, "rebuilt index");
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStorage;

    #[tokio::test]
    async fn test_index_and_unindex() {
        let search = MemorySearch::new();
        let tenant = TenantId::new("acme");
        let object = StorableObject::new("user", "u1");

        search.index(&tenant, &object).await.unwrap();
        assert!(search.document("acme", &tenant, "u1").is_some());

        search.unindex(&tenant, &object).await.unwrap();
        assert_eq!(search.document_count("acme"), 0);
    }

    #[tokio::test]
    async fn test_rebuild_pages_through_storage() {
        let storage = MemoryStorage::new();
        let search = MemorySearch::new();
        let tenant = TenantId::new("acme");
        let mut objects: Vec<_> = (0..7)
            .map(|i| StorableObject::new("user", format!("u{i}")))
            .collect();
        objects[3].set_indexed(false);
        storage.create_all(&tenant, &objects).await.unwrap();

        let mut pager = Pager::with_limit(3);
        let indexed = search
            .rebuild_index(&storage, &tenant, "acme-v2", &mut pager)
            .await
            .unwrap();

        assert_eq!(indexed, 6);
        assert_eq!(search.document_count("acme-v2"), 6);
        assert!(search.document("acme-v2", &tenant, "u3").is_none());
        assert_eq!(search.document_count("acme"), 0);
        assert_eq!(pager.count(), 7);
    }
}
