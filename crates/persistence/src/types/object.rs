//! The storable object contract.
//!
//! This module defines [`StorableObject`], the minimal shape every domain
//! object exposes to the persistence core: identity, owning tenant, version,
//! timestamps, routing flags and an open attribute map.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tenant::TenantId;

/// Version sentinel marking a write rejected because of a stale version.
pub const VERSION_CONFLICT: i64 = -1;

/// Default object type applied when the type is blank.
pub const DEFAULT_TYPE: &str = "object";

/// Attribute names reserved for row metadata.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "key", "id", "type", "appid", "version", "timestamp", "updated", "stored", "indexed", "cached",
];

/// Returns the current time truncated to millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn default_true() -> bool {
    true
}

/// A versioned object owned by one tenant.
///
/// Versions are monotonic. A version of `0` disables optimistic locking, and
/// a returned version of `-1` means the write was rejected because the stored
/// version had moved on. The sentinel is never persisted.
///
/// # Examples
///
/// ```
/// use stratus_persistence::types::StorableObject;
/// use serde_json::json;
///
/// let obj = StorableObject::new("user", "u1")
///     .with_tenant("acme")
///     .with_attribute("email", json!("ada@example.com"));
///
/// assert_eq!(obj.object_type(), "user");
/// assert_eq!(obj.tenant_id().as_str(), "acme");
/// assert!(obj.is_stored() && obj.is_indexed() && obj.is_cached());
/// assert!(!obj.is_conflict());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorableObject {
    #[serde(default)]
    id: String,

    #[serde(rename = "type", default)]
    object_type: String,

    #[serde(rename = "appid", default = "blank_tenant")]
    tenant_id: TenantId,

    #[serde(default)]
    version: i64,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    timestamp: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    updated: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    stored: bool,

    #[serde(default = "default_true")]
    indexed: bool,

    #[serde(default = "default_true")]
    cached: bool,

    #[serde(flatten)]
    attributes: Map<String, Value>,
}

fn blank_tenant() -> TenantId {
    TenantId::new("")
}

impl StorableObject {
    /// Creates an object of the given type and id with all flags set.
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            tenant_id: blank_tenant(),
            version: 0,
            timestamp: None,
            updated: None,
            stored: true,
            indexed: true,
            cached: true,
            attributes: Map::new(),
        }
    }

    /// Sets the owning tenant.
    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant.into();
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Sets the stored, indexed and cached flags.
    pub fn with_flags(mut self, stored: bool, indexed: bool, cached: bool) -> Self {
        self.stored = stored;
        self.indexed = indexed;
        self.cached = cached;
        self
    }

    /// Sets the creation time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.set_timestamp(Some(timestamp));
        self
    }

    /// The object id, unique within its tenant.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The object type.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// The owning tenant.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// The version.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Creation time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Last write time.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    /// Whether the object is written to the table store.
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    /// Whether the object is written to the search index.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether the object is written to the cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// The open attribute map.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Mutable access to the open attribute map.
    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    /// Returns one attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns `true` if the last write was rejected for a stale version.
    pub fn is_conflict(&self) -> bool {
        self.version == VERSION_CONFLICT
    }

    /// Returns `true` if writes of this object are conditional on its version.
    pub fn is_locking_enabled(&self) -> bool {
        self.version > 0
    }

    /// Sets the id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Sets the type.
    pub fn set_object_type(&mut self, object_type: impl Into<String>) {
        self.object_type = object_type.into();
    }

    /// Sets the owning tenant.
    pub fn set_tenant_id(&mut self, tenant: TenantId) {
        self.tenant_id = tenant;
    }

    /// Sets the version.
    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    /// Marks the object as rejected for a stale version.
    pub fn mark_conflict(&mut self) {
        self.version = VERSION_CONFLICT;
    }

    /// Sets the creation time, truncated to milliseconds.
    pub fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp.map(|t| t.trunc_subsecs(3));
    }

    /// Sets the last write time, truncated to milliseconds.
    pub fn set_updated(&mut self, updated: Option<DateTime<Utc>>) {
        self.updated = updated.map(|t| t.trunc_subsecs(3));
    }

    /// Sets the stored flag.
    pub fn set_stored(&mut self, stored: bool) {
        self.stored = stored;
    }

    /// Sets the indexed flag.
    pub fn set_indexed(&mut self, indexed: bool) {
        self.indexed = indexed;
    }

    /// Sets the cached flag.
    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    /// Trims and lowercases the type, defaulting blank types to `default_type`.
    pub fn normalize_type(&mut self, default_type: &str) {
        let normalized = self.object_type.trim().to_lowercase();
        self.object_type = if normalized.is_empty() {
            default_type.trim().to_lowercase()
        } else {
            normalized
        };
    }

    /// Applies a partial update on top of this object.
    ///
    /// Non-blank identity fields and set timestamps are taken from `update`.
    /// Attributes are combined as a JSON merge patch, so a `null` attribute in
    /// the update removes the attribute.
    pub fn merge_from(&mut self, update: &StorableObject) {
        if !update.id.is_empty() {
            self.id = update.id.clone();
        }
        if !update.object_type.trim().is_empty() {
            self.object_type = update.object_type.clone();
        }
        if !update.tenant_id.is_blank() {
            self.tenant_id = update.tenant_id.clone();
        }
        self.version = update.version;
        if update.timestamp.is_some() {
            self.timestamp = update.timestamp;
        }
        if update.updated.is_some() {
            self.updated = update.updated;
        }
        self.stored = update.stored;
        self.indexed = update.indexed;
        self.cached = update.cached;

        let mut merged = Value::Object(std::mem::take(&mut self.attributes));
        json_patch::merge(&mut merged, &Value::Object(update.attributes.clone()));
        if let Value::Object(map) = merged {
            self.attributes = map;
        }
    }
}
