//! Tenant to table routing.
//!
//! Every tenant is resolved once into a [`TenantPartition`]: the tagged
//! [`TenantMode`], the physical table that holds its rows, and the prefix
//! applied to row keys. Resolutions are cached by the [`PartitionResolver`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StorageResult, TenantError};

use super::TenantId;

/// How a tenant's rows are laid out in the table store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantMode {
    /// One physical table per tenant; row key is the object id.
    Dedicated,
    /// One table for many tenants; row key is the tenant prefix plus the object id.
    Shared,
}

/// Naming rules for tenant tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Prefix for dedicated table names (`<prefix>-<tenant>`).
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// The root tenant. Its table name is its id, and it is never shared.
    #[serde(default = "default_root_tenant")]
    pub root_tenant: String,

    /// Tenant ids starting with this marker live in the shared table.
    #[serde(default = "default_shared_marker")]
    pub shared_marker: String,

    /// Name of the table holding all shared tenants.
    #[serde(default = "default_shared_table")]
    pub shared_table: String,
}

fn default_table_prefix() -> String {
    "stratus".to_string()
}

fn default_root_tenant() -> String {
    "stratus".to_string()
}

fn default_shared_marker() -> String {
    " ".to_string()
}

fn default_shared_table() -> String {
    "stratus-shared".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            root_tenant: default_root_tenant(),
            shared_marker: default_shared_marker(),
            shared_table: default_shared_table(),
        }
    }
}

impl RoutingConfig {
    /// Validates the naming rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.trim().is_empty() {
            return Err(ConfigError::Blank {
                field: "table_prefix",
            });
        }
        if self.root_tenant.trim().is_empty() {
            return Err(ConfigError::Blank {
                field: "root_tenant",
            });
        }
        // A blank marker is fine, an empty one would match every tenant.
        if self.shared_marker.is_empty() {
            return Err(ConfigError::Blank {
                field: "shared_marker",
            });
        }
        if self.shared_table.trim().is_empty() {
            return Err(ConfigError::Blank {
                field: "shared_table",
            });
        }
        Ok(())
    }

    /// Name of the secondary index on the shared table.
    pub fn shared_index(&self) -> String {
        format!("GSI_{}", self.shared_table)
    }
}

/// A resolved tenant route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPartition {
    tenant_id: TenantId,
    canonical_id: String,
    mode: TenantMode,
    table_name: String,
    key_prefix: String,
    root: bool,
}

impl TenantPartition {
    /// The tenant id as requested by the caller.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// The tenant id without the shared marker. Stored in the `appid` column.
    pub fn canonical_id(&self) -> &str {
        &self.canonical_id
    }

    /// Dedicated or shared layout.
    pub fn mode(&self) -> TenantMode {
        self.mode
    }

    /// Returns `true` for shared-table tenants.
    pub fn is_shared(&self) -> bool {
        self.mode == TenantMode::Shared
    }

    /// Returns `true` for the root tenant.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// The physical table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Prefix prepended to object ids to form row keys. Empty for dedicated tenants.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Derives the physical row key for an object id.
    pub fn row_key(&self, object_id: &str) -> String {
        format!("{}{}", self.key_prefix, object_id)
    }

    /// Recovers the object id from a physical row key.
    pub fn object_id<'a>(&self, row_key: &'a str) -> &'a str {
        row_key.strip_prefix(&self.key_prefix).unwrap_or(row_key)
    }

    /// Returns `true` if the row key carries this tenant's prefix.
    ///
    /// A prefix match alone does not prove ownership in the shared table:
    /// tenant `acme` owns prefix `acme_`, which also starts every row of
    /// tenant `acme_eu`. Use [`owns_row`](Self::owns_row) with the row's
    /// tenant column to decide.
    pub fn owns_row_key(&self, row_key: &str) -> bool {
        row_key.starts_with(&self.key_prefix)
    }

    /// Returns `true` if a row with this key and tenant column belongs to
    /// this tenant.
    pub fn owns_row(&self, row_key: &str, appid: Option<&str>) -> bool {
        if !self.owns_row_key(row_key) {
            return false;
        }
        !self.is_shared() || appid == Some(self.canonical_id())
    }
}

/// Resolves and caches tenant partitions.
#[derive(Debug)]
pub struct PartitionResolver {
    config: RoutingConfig,
    cache: RwLock<HashMap<TenantId, Arc<TenantPartition>>>,
}

impl PartitionResolver {
    /// Creates a resolver with the given naming rules.
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the naming rules.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Resolves a tenant, reusing a cached resolution when available.
    pub fn resolve(&self, tenant: &TenantId) -> StorageResult<Arc<TenantPartition>> {
        if let Some(partition) = self.cache.read().get(tenant) {
            return Ok(partition.clone());
        }

        let partition = Arc::new(self.compute(tenant)?);
        let mut cache = self.cache.write();
        let cached = cache
            .entry(tenant.clone())
            .or_insert_with(|| partition.clone());
        Ok(cached.clone())
    }

    /// Number of cached resolutions.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    fn compute(&self, tenant: &TenantId) -> StorageResult<TenantPartition> {
        if tenant.is_blank() {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant.clone(),
            }
            .into());
        }

        let marker = &self.config.shared_marker;
        let canonical = tenant.canonical(marker).to_string();
        if canonical.is_empty() {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant.clone(),
            }
            .into());
        }

        let root = canonical == self.config.root_tenant;
        let shared = !root && tenant.starts_with_marker(marker);

        let partition = if shared {
            TenantPartition {
                tenant_id: tenant.clone(),
                key_prefix: format!("{}_", canonical),
                canonical_id: canonical,
                mode: TenantMode::Shared,
                table_name: self.config.shared_table.clone(),
                root,
            }
        } else {
            TenantPartition {
                tenant_id: tenant.clone(),
                table_name: self.dedicated_table_name(&canonical, root),
                canonical_id: canonical,
                mode: TenantMode::Dedicated,
                key_prefix: String::new(),
                root,
            }
        };
        Ok(partition)
    }

    fn dedicated_table_name(&self, canonical: &str, root: bool) -> String {
        let prefix = format!("{}-", self.config.table_prefix);
        if root || canonical.starts_with(&prefix) {
            canonical.to_string()
        } else {
            format!("{}{}", prefix, canonical)
        }
    }
}
