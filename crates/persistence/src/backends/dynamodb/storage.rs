//! [`StorageBackend`] implementation for DynamoDB.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::StorageBackend;
use crate::error::{StorageResult, TenantError, ValidationError};
use crate::tenant::{TenantId, TenantPartition};
use crate::types::{Pager, StorableObject, now_millis};

use super::backend::{BACKEND_NAME, DynamoDbBackend, storage_error};
use super::client::{DynamoClientError, IndexCursor, IndexQuery, ScanRequest, WriteRequest};
use super::codec;

fn require_id(object: &StorableObject) -> StorageResult<()> {
    if object.id().trim().is_empty() {
        return Err(ValidationError::MissingId.into());
    }
    Ok(())
}

/// Prepares an object for an unconditional put.
fn stamp_for_create(object: &StorableObject) -> StorableObject {
    let mut object = object.clone();
    if object.version() < 0 {
        object.set_version(0);
    }
    if object.timestamp().is_none() {
        object.set_timestamp(Some(now_millis()));
    }
    object
}

fn page_limit(pager: &Pager) -> i32 {
    i32::try_from(pager.limit()).unwrap_or(i32::MAX)
}

impl DynamoDbBackend {
    async fn update_one(
        &self,
        partition: &TenantPartition,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        require_id(object)?;
        let mut object = object.clone();
        if object.version() < 0 {
            object.set_version(0);
        }
        object.set_updated(Some(now_millis()));

        let expected = object.is_locking_enabled().then(|| object.version());
        let table = partition.table_name();
        let client = self.primary().await?;

        match client
            .update_item(
                table,
                &partition.row_key(object.id()),
                codec::encode_update(partition, &object),
                expected,
            )
            .await
        {
            Ok(()) => {
                if let Some(version) = expected {
                    object.set_version(version + 1);
                }
                Ok(object)
            }
            Err(DynamoClientError::ConditionalCheckFailed) => {
                warn!(
                    table,
                    key = object.id(),
                    version = object.version(),
                    "update rejected, stored version has moved on"
                );
                object.mark_conflict();
                Ok(object)
            }
            Err(e) => Err(storage_error(e, table)),
        }
    }

    async fn scan_page(
        &self,
        partition: &TenantPartition,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        let table = partition.table_name();
        let client = self.primary().await?;
        let page = client
            .scan(
                table,
                ScanRequest {
                    limit: page_limit(pager),
                    exclusive_start_key: pager.last_key().map(str::to_string),
                    key_prefix: None,
                },
            )
            .await
            .map_err(|e| storage_error(e, table))?;

        let last_row_key = page
            .rows
            .last()
            .and_then(|row| codec::row_key(row))
            .map(str::to_string);
        let objects: Vec<_> = page
            .rows
            .iter()
            .map(|row| codec::decode_row(partition, row))
            .collect();

        if let Some(key) = page.last_evaluated.or(last_row_key) {
            pager.set_last_key(Some(key));
        }
        pager.add_count(objects.len());
        debug!(table, count = objects.len(), "scanned page");
        Ok(objects)
    }
}

#[async_trait]
impl StorageBackend for DynamoDbBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        require_id(object)?;
        let partition = self.partition(tenant)?;
        let object = stamp_for_create(object);
        let table = partition.table_name();

        self.primary()
            .await?
            .put_item(table, codec::encode_row(&partition, &object))
            .await
            .map_err(|e| storage_error(e, table))?;
        debug!(table, key = object.id(), "created object");
        Ok(object)
    }

    async fn read(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
        if key.trim().is_empty() {
            return Ok(None);
        }
        let partition = self.partition(tenant)?;
        let table = partition.table_name();
        let row = self
            .primary()
            .await?
            .get_item(table, &partition.row_key(key))
            .await
            .map_err(|e| storage_error(e, table))?;
        Ok(row.map(|row| codec::decode_row(&partition, &row)))
    }

    async fn update(
        &self,
        tenant: &TenantId,
        object: &StorableObject,
    ) -> StorageResult<StorableObject> {
        let partition = self.partition(tenant)?;
        self.update_one(&partition, object).await
    }

    async fn delete(&self, tenant: &TenantId, object: &StorableObject) -> StorageResult<()> {
        require_id(object)?;
        let partition = self.partition(tenant)?;
        let table = partition.table_name();
        self.primary()
            .await?
            .delete_item(table, &partition.row_key(object.id()))
            .await
            .map_err(|e| storage_error(e, table))
    }

    async fn create_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        let partition = self.partition(tenant)?;
        let objects: Vec<_> = objects
            .iter()
            .filter(|o| !o.id().trim().is_empty())
            .map(stamp_for_create)
            .collect();
        if objects.is_empty() {
            return Ok(objects);
        }

        let requests = objects
            .iter()
            .map(|o| WriteRequest::Put(codec::encode_row(&partition, o)))
            .collect();
        let client = self.primary().await?;
        self.batch_write(client.as_ref(), partition.table_name(), requests)
            .await?;
        Ok(objects)
    }

    async fn read_all(
        &self,
        tenant: &TenantId,
        keys: &[String],
    ) -> StorageResult<HashMap<String, StorableObject>> {
        let partition = self.partition(tenant)?;
        let mut row_keys: Vec<String> = keys
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| partition.row_key(k))
            .collect();
        row_keys.sort();
        row_keys.dedup();
        if row_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let client = self.primary().await?;
        let rows = self
            .batch_get(client.as_ref(), partition.table_name(), &row_keys)
            .await?;
        Ok(rows
            .iter()
            .map(|row| codec::decode_row(&partition, row))
            .map(|o| (o.id().to_string(), o))
            .collect())
    }

    async fn update_all(
        &self,
        tenant: &TenantId,
        objects: &[StorableObject],
    ) -> StorageResult<Vec<StorableObject>> {
        let partition = self.partition(tenant)?;
        let mut updated = Vec::with_capacity(objects.len());
        for object in objects.iter().filter(|o| !o.id().trim().is_empty()) {
            updated.push(self.update_one(&partition, object).await?);
        }
        Ok(updated)
    }

    async fn delete_all(&self, tenant: &TenantId, objects: &[StorableObject]) -> StorageResult<()> {
        let partition = self.partition(tenant)?;
        let requests: Vec<_> = objects
            .iter()
            .filter(|o| !o.id().trim().is_empty())
            .map(|o| WriteRequest::Delete(partition.row_key(o.id())))
            .collect();
        if requests.is_empty() {
            return Ok(());
        }
        let client = self.primary().await?;
        self.batch_write(client.as_ref(), partition.table_name(), requests)
            .await?;
        Ok(())
    }

    async fn read_page(
        &self,
        tenant: &TenantId,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        let partition = self.partition(tenant)?;
        if partition.is_shared() {
            return self.read_page_shared(tenant, pager).await;
        }
        self.scan_page(&partition, pager).await
    }

    async fn read_page_shared(
        &self,
        tenant: &TenantId,
        pager: &mut Pager,
    ) -> StorageResult<Vec<StorableObject>> {
        let partition = self.partition(tenant)?;
        if !partition.is_shared() {
            return Err(TenantError::NotShared {
                tenant_id: tenant.clone(),
            }
            .into());
        }

        let table = partition.table_name();
        let exclusive_start = pager.last_key().map(|key| IndexCursor {
            key: key.to_string(),
            appid: partition.canonical_id().to_string(),
            id: partition.object_id(key).to_string(),
        });
        let client = self.primary().await?;
        let page = client
            .query_index(
                table,
                IndexQuery {
                    index: self.config.routing.shared_index(),
                    appid: partition.canonical_id().to_string(),
                    limit: page_limit(pager),
                    forward: !pager.is_desc(),
                    exclusive_start,
                },
            )
            .await
            .map_err(|e| storage_error(e, table))?;

        let owned: Vec<_> = page
            .rows
            .iter()
            .filter(|row| codec::is_owned_by(&partition, row))
            .collect();
        let last_row_key = owned
            .last()
            .and_then(|row| codec::row_key(row))
            .map(str::to_string);
        let objects: Vec<_> = owned
            .into_iter()
            .map(|row| codec::decode_row(&partition, row))
            .collect();

        if let Some(key) = page.last_evaluated.map(|c| c.key).or(last_row_key) {
            pager.set_last_key(Some(key));
        }
        pager.add_count(objects.len());
        debug!(table, tenant = %tenant, count = objects.len(), "queried shared page");
        Ok(objects)
    }
}
