//! Table lifecycle: creation, cross-region replication and removal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::TableLifecycle;
use crate::error::{BackendError, StorageResult, TenantError};
use crate::tenant::TenantId;

use super::backend::{DynamoDbBackend, storage_error};
use super::client::{
    APPID_COLUMN, DynamoApi, DynamoClientError, ID_COLUMN, IndexSpec, ScanRequest, TableSpec,
    TableStatus, WriteRequest,
};
use super::codec;
use super::config::DynamoDbConfig;
use super::pool::ConnectionPool;

/// Polls the table until it is active or the configured timeout passes.
async fn wait_until_active(
    client: &dyn DynamoApi,
    table: &str,
    config: &DynamoDbConfig,
) -> StorageResult<()> {
    let started = Instant::now();
    loop {
        let status = client
            .describe_table(table)
            .await
            .map_err(|e| storage_error(e, table))?
            .map(|d| d.status);
        if status == Some(TableStatus::Active) {
            return Ok(());
        }
        if started.elapsed() >= config.table_active_timeout {
            return Err(BackendError::TableNotActive {
                table: table.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }
            .into());
        }
        debug!(table, status = ?status, "waiting for table to become active");
        tokio::time::sleep(config.table_poll_interval).await;
    }
}

fn capacity(requested: i64, default: i64) -> i64 {
    if requested > 0 { requested } else { default }
}

/// Creates the table in every replica region, then links all regions.
async fn replicate_table(pool: Arc<ConnectionPool>, config: Arc<DynamoDbConfig>, spec: TableSpec) {
    for region in &config.replica_regions {
        let result = async {
            let client = pool.get(region).await?;
            match client.create_table(&spec).await {
                Ok(()) | Err(DynamoClientError::InUse(_)) => {}
                Err(e) => return Err(storage_error(e, &spec.name)),
            }
            wait_until_active(client.as_ref(), &spec.name, &config).await
        }
        .await;
        if let Err(e) = result {
            error!(table = %spec.name, region = %region, error = %e, "replica table creation failed");
            return;
        }
    }

    let mut regions = Vec::with_capacity(config.replica_regions.len() + 1);
    regions.push(config.region.clone());
    regions.extend(config.replica_regions.iter().cloned());

    let linked = match pool.get(&config.region).await {
        Ok(client) => client
            .create_global_table(&spec.name, &regions)
            .await
            .map_err(|e| storage_error(e, &spec.name)),
        Err(e) => Err(e),
    };
    match linked {
        Ok(()) => info!(table = %spec.name, regions = ?regions, "replicated table group created"),
        Err(e) => error!(table = %spec.name, error = %e, "failed to link replica tables"),
    }
}

impl DynamoDbBackend {
    async fn enable_backups(&self, client: &dyn DynamoApi, table: &str) {
        if !self.config.point_in_time_recovery {
            return;
        }
        if let Err(e) = client.enable_point_in_time_recovery(table).await {
            warn!(table, error = %e, "failed to enable point-in-time recovery");
        }
    }
}

#[async_trait]
impl TableLifecycle for DynamoDbBackend {
    async fn table_exists(&self, tenant: &TenantId) -> StorageResult<bool> {
        let partition = self.partition(tenant)?;
        let table = partition.table_name();
        let description = self
            .primary()
            .await?
            .describe_table(table)
            .await
            .map_err(|e| storage_error(e, table))?;
        Ok(description.is_some())
    }

    async fn create_table(
        &self,
        tenant: &TenantId,
        read_capacity: i64,
        write_capacity: i64,
    ) -> StorageResult<bool> {
        let partition = self.partition(tenant)?;
        if partition.is_shared() {
            info!(tenant = %tenant, "shared tenant has no table of its own");
            return Ok(false);
        }

        let replicate = self.config.is_replicated() && !partition.is_root();
        let spec = TableSpec {
            name: partition.table_name().to_string(),
            read_capacity: capacity(read_capacity, self.config.read_capacity),
            write_capacity: capacity(write_capacity, self.config.write_capacity),
            index: None,
            stream_enabled: replicate,
        };

        let client = self.primary().await?;
        match client.create_table(&spec).await {
            Ok(()) => {}
            Err(DynamoClientError::InUse(message)) => {
                warn!(table = %spec.name, %message, "table already exists");
                return Ok(false);
            }
            Err(e) => return Err(storage_error(e, &spec.name)),
        }
        wait_until_active(client.as_ref(), &spec.name, &self.config).await?;
        self.enable_backups(client.as_ref(), &spec.name).await;
        info!(table = %spec.name, "created table");

        if replicate {
            let task = tokio::spawn(replicate_table(
                self.pool.clone(),
                self.config.clone(),
                spec,
            ));
            let mut tasks = self.replication_tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        }
        Ok(true)
    }

    async fn delete_table(&self, tenant: &TenantId) -> StorageResult<bool> {
        let partition = self.partition(tenant)?;
        if partition.is_shared() {
            info!(tenant = %tenant, "shared tenant has no table of its own");
            return Ok(false);
        }
        let table = partition.table_name();
        let client = self.primary().await?;

        if self.config.is_replicated() && !partition.is_root() {
            for region in &self.config.replica_regions {
                if let Err(e) = client.remove_replica(table, region).await {
                    warn!(table, region = %region, error = %e, "failed to remove replica from group");
                }
            }
            for region in &self.config.replica_regions {
                let result = match self.pool.get(region).await {
                    Ok(replica) => replica
                        .delete_table(table)
                        .await
                        .map_err(|e| storage_error(e, table)),
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!(table, region = %region, error = %e, "failed to delete replica table");
                }
            }
        }

        match client.delete_table(table).await {
            Ok(()) => {
                info!(table, "deleted table");
                Ok(true)
            }
            Err(DynamoClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(storage_error(e, table)),
        }
    }

    async fn create_shared_table(
        &self,
        read_capacity: i64,
        write_capacity: i64,
    ) -> StorageResult<bool> {
        let routing = &self.config.routing;
        let spec = TableSpec {
            name: routing.shared_table.clone(),
            read_capacity: capacity(read_capacity, self.config.read_capacity),
            write_capacity: capacity(write_capacity, self.config.write_capacity),
            index: Some(IndexSpec {
                name: routing.shared_index(),
                hash_key: APPID_COLUMN.to_string(),
                range_key: ID_COLUMN.to_string(),
            }),
            stream_enabled: false,
        };

        let client = self.primary().await?;
        match client.create_table(&spec).await {
            Ok(()) => {}
            Err(DynamoClientError::InUse(message)) => {
                warn!(table = %spec.name, %message, "shared table already exists");
                return Ok(false);
            }
            Err(e) => return Err(storage_error(e, &spec.name)),
        }
        wait_until_active(client.as_ref(), &spec.name, &self.config).await?;
        self.enable_backups(client.as_ref(), &spec.name).await;
        info!(table = %spec.name, "created shared table");
        Ok(true)
    }

    async fn delete_all_for_tenant(&self, tenant: &TenantId) -> StorageResult<u64> {
        let partition = self.partition(tenant)?;
        if !partition.is_shared() {
            return Err(TenantError::NotShared {
                tenant_id: tenant.clone(),
            }
            .into());
        }

        let table = partition.table_name();
        let client = self.primary().await?;
        let page_size = i32::try_from(self.config.max_batch_write_items * 4).unwrap_or(i32::MAX);
        let mut start = None;
        let mut deleted = 0u64;

        loop {
            let page = client
                .scan(
                    table,
                    ScanRequest {
                        limit: page_size,
                        exclusive_start_key: start.take(),
                        key_prefix: Some(partition.key_prefix().to_string()),
                    },
                )
                .await
                .map_err(|e| storage_error(e, table))?;

            // Prefixes of two shared tenants can nest, so the tenant column decides.
            let requests: Vec<_> = page
                .rows
                .iter()
                .filter(|row| codec::is_owned_by(&partition, row))
                .filter_map(|row| codec::row_key(row))
                .map(|key| WriteRequest::Delete(key.to_string()))
                .collect();
            if !requests.is_empty() {
                let applied = self.batch_write(client.as_ref(), table, requests).await?;
                deleted += applied as u64;
            }

            match page.last_evaluated {
                Some(key) => start = Some(key),
                None => break,
            }
        }

        info!(table, tenant = %tenant, deleted, "deleted all rows of shared tenant");
        Ok(deleted)
    }
}
