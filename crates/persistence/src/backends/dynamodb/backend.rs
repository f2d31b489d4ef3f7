//! DynamoDB backend core: construction, routing and error mapping.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::tenant::{PartitionResolver, TenantId, TenantPartition};

use super::client::{DynamoApi, DynamoClientError};
use super::config::DynamoDbConfig;
use super::pool::{AwsClientFactory, ClientFactory, ConnectionPool};

pub(crate) const BACKEND_NAME: &str = "dynamodb";

/// Table store backend over Amazon DynamoDB.
///
/// Dedicated tenants get one table each; shared tenants live in one table,
/// told apart by a row-key prefix and an index on the tenant id.
pub struct DynamoDbBackend {
    pub(crate) config: Arc<DynamoDbConfig>,
    pub(crate) resolver: PartitionResolver,
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) replication_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDbBackend")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl DynamoDbBackend {
    /// Creates a backend using the default AWS credential chain.
    pub fn new(config: DynamoDbConfig) -> StorageResult<Self> {
        Self::with_factory(config, Arc::new(AwsClientFactory))
    }

    /// Creates a backend whose regional clients come from `factory`.
    pub fn with_factory(
        config: DynamoDbConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> StorageResult<Self> {
        config.validate()?;
        let pool = Arc::new(ConnectionPool::new(factory, config.endpoint.clone()));
        Ok(Self {
            resolver: PartitionResolver::new(config.routing.clone()),
            config: Arc::new(config),
            pool,
            replication_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Returns backend configuration.
    pub fn config(&self) -> &DynamoDbConfig {
        &self.config
    }

    /// Returns the client pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Resolves a tenant to its table and key prefix.
    pub fn partition(&self, tenant: &TenantId) -> StorageResult<Arc<TenantPartition>> {
        self.resolver.resolve(tenant)
    }

    /// Waits for every background replication started by `create_table`.
    pub async fn wait_for_replication(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.replication_tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "replication task did not complete");
            }
        }
    }

    pub(crate) async fn primary(&self) -> StorageResult<Arc<dyn DynamoApi>> {
        self.pool.get(&self.config.region).await
    }
}

/// Maps a client error on `table` into a storage error.
pub(crate) fn storage_error(err: DynamoClientError, table: &str) -> StorageError {
    let backend_name = BACKEND_NAME.to_string();
    let backend_error = match err {
        DynamoClientError::NotFound(_) => BackendError::TableNotFound {
            table: table.to_string(),
        },
        DynamoClientError::Throttled(_) => BackendError::Throttled {
            table: table.to_string(),
            attempts: 1,
        },
        DynamoClientError::Unavailable(message) => BackendError::Unavailable {
            backend_name,
            message,
        },
        DynamoClientError::InvalidInput(message) | DynamoClientError::InUse(message) => {
            BackendError::InvalidRequest {
                backend_name,
                message,
            }
        }
        DynamoClientError::ConditionalCheckFailed => BackendError::InvalidRequest {
            backend_name,
            message: format!("condition failed on {table}"),
        },
        DynamoClientError::Internal(message) => BackendError::Internal {
            backend_name,
            message,
            source: None,
        },
    };
    StorageError::Backend(backend_error)
}
