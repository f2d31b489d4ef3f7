//! Configuration for the managed store.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DEFAULT_TYPE, MAX_LIMIT};

/// Switches and limits of a [`ManagedStore`](super::ManagedStore).
///
/// The cache and search switches only take effect when the matching
/// collaborator is attached to the store.
///
/// # Example
///
/// ```
/// use stratus_persistence::managed::ManagedStoreConfig;
///
/// let config = ManagedStoreConfig::default()
///     .with_search_enabled(false)
///     .with_fail_on_write_error(true)
///     .with_max_page_limit(500);
///
/// assert!(config.validate().is_ok());
/// assert!(config.cache_enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedStoreConfig {
    /// Serve reads from, and populate, the cache.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Keep the search index in step with writes.
    #[serde(default = "default_true")]
    pub search_enabled: bool,

    /// Re-raise table store errors on writes instead of logging them.
    #[serde(default)]
    pub fail_on_write_error: bool,

    /// Upper bound on page sizes requested through the store.
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,

    /// Type given to objects created without one.
    #[serde(default = "default_type")]
    pub default_type: String,
}

fn default_true() -> bool {
    true
}

fn default_max_page_limit() -> u32 {
    MAX_LIMIT
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

impl Default for ManagedStoreConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            search_enabled: true,
            fail_on_write_error: false,
            max_page_limit: default_max_page_limit(),
            default_type: default_type(),
        }
    }
}

impl ManagedStoreConfig {
    /// Sets whether the cache is used.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets whether the search index is maintained.
    pub fn with_search_enabled(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    /// Sets whether write errors are re-raised.
    pub fn with_fail_on_write_error(mut self, fail: bool) -> Self {
        self.fail_on_write_error = fail;
        self
    }

    /// Sets the page size bound.
    pub fn with_max_page_limit(mut self, limit: u32) -> Self {
        self.max_page_limit = limit;
        self
    }

    /// Sets the type given to untyped objects.
    pub fn with_default_type(mut self, object_type: impl Into<String>) -> Self {
        self.default_type = object_type.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_limit == 0 {
            return Err(ConfigError::Zero {
                field: "max_page_limit",
            });
        }
        if self.max_page_limit > MAX_LIMIT {
            return Err(ConfigError::TooLarge {
                field: "max_page_limit",
                max: u64::from(MAX_LIMIT),
                value: u64::from(self.max_page_limit),
            });
        }
        if self.default_type.trim().is_empty() {
            return Err(ConfigError::Blank {
                field: "default_type",
            });
        }
        Ok(())
    }
}
