//! Managed persistence: one logical operation fanned out to the table store,
//! the cache and the search index.
//!
//! [`ManagedStore`] is the entry point. Writes go through a
//! [`WritePipeline`] of three stages:
//!
//! ```text
//! validate ─▶ normalize ─▶ Store (abort) ─▶ Index (continue) ─▶ Cache (continue)
//!                           │
//!                           └─ listeners before and after the table store call
//! ```
//!
//! The cache and the index are written only after a successful durable
//! write. A failure there leaves them behind the table store until a
//! cache-miss read repopulates the cache or [`ManagedStore::reindex`]
//! rebuilds the index.

mod config;
mod hooks;
mod pipeline;
mod store;

#[cfg(all(test, feature = "dynamodb"))]
mod tests;

pub use config::ManagedStoreConfig;
pub use hooks::ListenerRegistry;
pub use pipeline::{PipelineStep, StageFailurePolicy, WritePipeline, WriteStage};
pub use store::ManagedStore;
