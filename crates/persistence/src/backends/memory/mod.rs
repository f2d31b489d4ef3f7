//! In-process collaborators.
//!
//! Map-backed implementations of the storage, cache and search contracts.
//! They keep everything in memory behind `parking_lot` locks and are meant
//! for development, tests, and single-node deployments where a remote cache
//! or index is not worth running.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stratus_persistence::backends::memory::{MemoryCache, MemorySearch, MemoryStorage};
//! use stratus_persistence::managed::{ManagedStore, ManagedStoreConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ManagedStore::new(Arc::new(MemoryStorage::new()), ManagedStoreConfig::default())?
//!     .with_cache(Arc::new(MemoryCache::new()))
//!     .with_search(Arc::new(MemorySearch::new()));
//! assert!(store.config().cache_enabled);
//! # Ok(())
//! # }
//! ```

mod cache;
mod search;
mod storage;

pub use cache::MemoryCache;
pub use search::MemorySearch;
pub use storage::MemoryStorage;
