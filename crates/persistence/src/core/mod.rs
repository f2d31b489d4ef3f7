//! Core traits and abstractions.
//!
//! This module provides the contracts the managed store is written against:
//!
//! - [`StorageBackend`] - Durable table store: CRUD, batches, page reads
//! - [`TableLifecycle`] - Table creation, replication and removal
//! - [`CacheBackend`] - Tenant-scoped object cache
//! - [`SearchBackend`] - Tenant-scoped search index
//! - [`IoListener`] - Observer hooks around store calls
//! - [`ObjectValidator`] - Pre-write validation
//!
//! # Trait Hierarchy
//!
//! ```text
//! StorageBackend
//!     └── TableLifecycle
//!
//! CacheBackend        (independent collaborator)
//! SearchBackend       (independent collaborator, rebuilds from a StorageBackend)
//! ```
//!
//! # Example: Implementing a Cache
//!
//! ```ignore
//! use async_trait::async_trait;
//! use stratus_persistence::core::CacheBackend;
//! use stratus_persistence::error::StorageResult;
//! use stratus_persistence::tenant::TenantId;
//! use stratus_persistence::types::StorableObject;
//!
//! struct RedisCache {
//!     // ... connection fields
//! }
//!
//! #[async_trait]
//! impl CacheBackend for RedisCache {
//!     fn backend_name(&self) -> &'static str {
//!         "redis"
//!     }
//!
//!     async fn get(&self, tenant: &TenantId, key: &str) -> StorageResult<Option<StorableObject>> {
//!         // ...
//!     }
//!
//!     // ... other methods
//! }
//! ```

mod cache;
mod listener;
mod search;
mod storage;
mod validator;

pub use cache::CacheBackend;
pub use listener::{IoInvocation, IoListener, IoOperation};
pub use search::SearchBackend;
pub use storage::{StorageBackend, TableLifecycle};
pub use validator::{BasicValidator, MAX_ID_LENGTH, ObjectValidator};
