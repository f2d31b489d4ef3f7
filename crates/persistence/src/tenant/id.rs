//! Tenant identifier type.
//!
//! This module defines the [`TenantId`] type, an opaque identifier for the
//! tenant ("app") that owns a set of stored objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An opaque tenant identifier.
///
/// The identifier is kept exactly as the caller supplied it. Whether the
/// tenant lives in a dedicated or a shared table is not a property of the id
/// itself; it is decided by a [`PartitionResolver`](super::PartitionResolver),
/// which looks for the configured shared marker at the start of the id.
///
/// # Examples
///
/// ```
/// use stratus_persistence::tenant::TenantId;
///
/// let tenant = TenantId::new("acme");
/// assert_eq!(tenant.as_str(), "acme");
/// assert!(tenant.starts_with_marker(""));
/// assert!(TenantId::new(" acme").starts_with_marker(" "));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns `true` if the id begins with the given marker.
    pub fn starts_with_marker(&self, marker: &str) -> bool {
        self.0.starts_with(marker)
    }

    /// Returns the id with the marker and surrounding whitespace removed.
    ///
    /// ```
    /// use stratus_persistence::tenant::TenantId;
    ///
    /// assert_eq!(TenantId::new(" acme").canonical(" "), "acme");
    /// assert_eq!(TenantId::new("acme").canonical(" "), "acme");
    /// ```
    pub fn canonical(&self, marker: &str) -> &str {
        let stripped = if marker.is_empty() {
            self.0.as_str()
        } else {
            self.0.strip_prefix(marker).unwrap_or(&self.0)
        };
        stripped.trim()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({:?})", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TenantId::new(s))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
