//! Tenant identity and table routing.
//!
//! Every stored object belongs to a tenant ("app"). A tenant either owns a
//! dedicated physical table, or shares one table with other tenants and is
//! told apart by a row-key prefix and a secondary index on the tenant id.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier
//! - [`TenantMode`] - Dedicated or shared layout
//! - [`TenantPartition`] - A resolved route: mode, table name, key prefix
//! - [`PartitionResolver`] - Resolves and caches partitions
//!
//! # Examples
//!
//! ```
//! use stratus_persistence::tenant::{PartitionResolver, RoutingConfig, TenantId, TenantMode};
//!
//! let resolver = PartitionResolver::new(RoutingConfig::default());
//!
//! let dedicated = resolver.resolve(&TenantId::new("acme")).unwrap();
//! assert_eq!(dedicated.table_name(), "stratus-acme");
//!
//! // A leading space marks a shared tenant.
//! let shared = resolver.resolve(&TenantId::new(" beta")).unwrap();
//! assert_eq!(shared.mode(), TenantMode::Shared);
//! assert_eq!(shared.row_key("42"), "beta_42");
//! ```

mod id;
mod partition;

pub use id::TenantId;
pub use partition::{PartitionResolver, RoutingConfig, TenantMode, TenantPartition};
