//! Amazon DynamoDB backend.
//!
//! Implements [`StorageBackend`](crate::core::StorageBackend) and
//! [`TableLifecycle`](crate::core::TableLifecycle):
//!
//! - Tenant routing to dedicated tables (`<prefix>-<tenant>`) or to the shared
//!   table, where row keys carry the tenant prefix and an index on the tenant
//!   id serves page queries
//! - Chunked batch reads and writes with bounded exponential backoff
//! - Conditional updates for optimistic locking
//! - Table creation, cross-region replication and removal
//!
//! # Example
//!
//! ```no_run
//! use stratus_persistence::backends::dynamodb::{DynamoDbBackend, DynamoDbConfig};
//! use stratus_persistence::core::{StorageBackend, TableLifecycle};
//! use stratus_persistence::tenant::TenantId;
//! use stratus_persistence::types::StorableObject;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = DynamoDbBackend::new(DynamoDbConfig::default().with_region("eu-west-1"))?;
//! let tenant = TenantId::new("acme");
//!
//! backend.create_table(&tenant, 10, 5).await?;
//! backend.create(&tenant, &StorableObject::new("user", "u1")).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod batch;
pub mod client;
mod codec;
mod config;
mod pool;
mod storage;
mod tables;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::DynamoDbBackend;
pub use client::{AwsDynamoClient, DynamoApi, DynamoClientError};
pub use config::{BATCH_GET_LIMIT, BATCH_WRITE_LIMIT, BackoffConfig, DynamoDbConfig, RetryLimit};
pub use pool::{AwsClientFactory, ClientFactory, ConnectionPool};
