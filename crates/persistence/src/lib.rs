//! Stratus Persistence Layer
//!
//! This crate is the persistence core of a multi-tenant object store. Every
//! object belongs to a tenant, carries a version, and lives in up to three
//! places that have to agree: a durable table store, a cache and a search
//! index.
//!
//! # Features
//!
//! - **Managed writes**: one call fans out to table store, index and cache,
//!   with optimistic locking and per-stage failure policy
//! - **Cache-aside reads**: cache hits never reach the table store
//! - **Tenant routing**: dedicated tables per tenant, or one shared table
//!   keyed by tenant prefix with an index on the tenant id
//! - **Batching**: oversized batches are chunked, throttled chunks retried
//!   with bounded exponential backoff
//! - **Replication**: dedicated tables replicated across regions
//!
//! # Backend Features
//!
//! - `dynamodb` (default) - Amazon DynamoDB table store
//! - `admin` - the `stratus-tables` administration binary
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant ids and their resolution to tables and key prefixes
//! - [`types`] - Storable objects and pagination
//! - [`error`] - Error types for all operations
//! - [`core`] - Storage, cache, search, listener and validator contracts
//! - [`backends`] - DynamoDB and in-memory implementations
//! - [`managed`] - The managed store tying them together
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use stratus_persistence::backends::memory::{MemoryCache, MemorySearch, MemoryStorage};
//! use stratus_persistence::managed::{ManagedStore, ManagedStoreConfig};
//! use stratus_persistence::tenant::TenantId;
//! use stratus_persistence::types::StorableObject;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ManagedStore::new(Arc::new(MemoryStorage::new()), ManagedStoreConfig::default())?
//!     .with_cache(Arc::new(MemoryCache::new()))
//!     .with_search(Arc::new(MemorySearch::new()));
//!
//! let tenant = TenantId::new("acme");
//! let user = StorableObject::new("user", "u1").with_attribute("name", json!("Ann"));
//!
//! store.create(&tenant, user).await?;
//! let read = store.read(&tenant, "u1").await;
//! assert_eq!(read.unwrap().attribute("name"), Some(&json!("Ann")));
//! # Ok(())
//! # }
//! ```
//!
//! # Optimistic Locking
//!
//! An update carrying a positive version succeeds only if the stored version
//! matches, and bumps it. A stale update comes back with version `-1` and
//! leaves the cache and the index untouched.
//!
//! ```
//! use stratus_persistence::types::{StorableObject, VERSION_CONFLICT};
//!
//! let mut object = StorableObject::new("user", "u1").with_version(3);
//! assert!(object.is_locking_enabled());
//!
//! object.mark_conflict();
//! assert_eq!(object.version(), VERSION_CONFLICT);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod managed;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use managed::{ManagedStore, ManagedStoreConfig};
pub use tenant::TenantId;
pub use types::{Pager, StorableObject};

// Re-export core traits
pub use core::{
    CacheBackend, IoListener, ObjectValidator, SearchBackend, StorageBackend, TableLifecycle,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
