//! Backend implementations.
//!
//! This module contains implementations of the storage, cache and search
//! traits. Remote backends are gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | DynamoDB | `dynamodb` | Partitioned table store with per-tenant or shared tables |
//! | Memory | (always) | In-process table store, cache and search index |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "dynamodb")]
//! use stratus_persistence::backends::dynamodb::{DynamoDbBackend, DynamoDbConfig};
//!
//! # #[cfg(feature = "dynamodb")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Local development against DynamoDB Local
//! let config = DynamoDbConfig::default().with_endpoint("http://localhost:8000");
//! let backend = DynamoDbBackend::new(config)?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub mod memory;
