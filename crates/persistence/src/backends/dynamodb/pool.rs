//! Per-region client pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BackendError, StorageResult};

use super::client::{AwsDynamoClient, DynamoApi, DynamoClientError};

/// Opens a client for one region.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Connects to `region`, optionally through an endpoint override.
    async fn connect(
        &self,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Arc<dyn DynamoApi>, DynamoClientError>;
}

/// Factory producing [`AwsDynamoClient`]s from the default credential chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsClientFactory;

#[async_trait]
impl ClientFactory for AwsClientFactory {
    async fn connect(
        &self,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Arc<dyn DynamoApi>, DynamoClientError> {
        let sdk_config = AwsDynamoClient::load_sdk_config(region, endpoint).await;
        Ok(Arc::new(AwsDynamoClient::from_sdk_config(&sdk_config)))
    }
}

/// Region to client map, populated lazily on first use of each region.
///
/// Concurrent first uses of one region open a single client.
pub struct ConnectionPool {
    factory: Arc<dyn ClientFactory>,
    endpoint: Option<String>,
    clients: RwLock<HashMap<String, Arc<dyn DynamoApi>>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new(factory: Arc<dyn ClientFactory>, endpoint: Option<String>) -> Self {
        Self {
            factory,
            endpoint,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the client for `region`, connecting on first use.
    pub async fn get(&self, region: &str) -> StorageResult<Arc<dyn DynamoApi>> {
        if let Some(client) = self.clients.read().await.get(region).cloned() {
            return Ok(client);
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(region) {
            return Ok(client.clone());
        }

        debug!(region, "opening DynamoDB client");
        let client = self
            .factory
            .connect(region, self.endpoint.as_deref())
            .await
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: "dynamodb".to_string(),
                region: region.to_string(),
                message: e.to_string(),
            })?;
        clients.insert(region.to_string(), client.clone());
        Ok(client)
    }

    /// Regions with an open client.
    pub async fn regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = self.clients.read().await.keys().cloned().collect();
        regions.sort();
        regions
    }
}
