//! Error types for the persistence layer.
//!
//! Errors are split by where they originate: object validation, tenant routing,
//! the durable table store, the side stores (cache and search index), and
//! observer hooks. Version conflicts are deliberately absent: they are reported
//! in-band through the `-1` version sentinel on the returned object.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::TenantId;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Tenant routing errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Table store errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cache or search index errors
    #[error(transparent)]
    SideStore(#[from] SideStoreError),

    /// Observer hook errors
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StorageError {
    /// Returns `true` if the error is a transient capacity signal.
    pub fn is_throttled(&self) -> bool {
        matches!(self, StorageError::Backend(BackendError::Throttled { .. }))
    }
}

/// Errors raised while validating a storable object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The object has no id.
    #[error("object has no id")]
    MissingId,

    /// The object id does not match the allowed pattern.
    #[error("invalid object id '{id}': {message}")]
    InvalidId { id: String, message: String },

    /// An attribute uses a name reserved for row metadata.
    #[error("attribute '{name}' is reserved")]
    ReservedAttribute { name: String },

    /// A required attribute is missing or blank.
    #[error("missing required attribute '{name}' for type '{object_type}'")]
    MissingAttribute { object_type: String, name: String },
}

/// Errors related to tenant routing.
#[derive(Error, Debug)]
pub enum TenantError {
    /// The tenant id is blank or otherwise unusable.
    #[error("invalid tenant: '{tenant_id}'")]
    InvalidTenant { tenant_id: TenantId },

    /// The operation requires a tenant in shared mode.
    #[error("tenant {tenant_id} is not stored in the shared table")]
    NotShared { tenant_id: TenantId },
}

/// Errors originating from the table store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to a regional endpoint failed.
    #[error("connection failed to {backend_name} in {region}: {message}")]
    ConnectionFailed {
        backend_name: String,
        region: String,
        message: String,
    },

    /// The request was throttled and the retry budget ran out.
    #[error("request to {table} throttled after {attempts} attempts")]
    Throttled { table: String, attempts: u32 },

    /// Items were still unprocessed when the retry budget ran out.
    #[error("{count} items left unprocessed in {table} after {attempts} attempts")]
    UnprocessedItems {
        table: String,
        count: usize,
        attempts: u32,
    },

    /// The physical table does not exist.
    #[error("table not found: {table}")]
    TableNotFound { table: String },

    /// The table did not become active in time.
    #[error("table {table} not active after {waited_ms}ms")]
    TableNotActive { table: String, waited_ms: u64 },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request was rejected as malformed.
    #[error("invalid request to {backend_name}: {message}")]
    InvalidRequest {
        backend_name: String,
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors from the cache and the search index.
#[derive(Error, Debug)]
pub enum SideStoreError {
    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("search index error: {message}")]
    Search { message: String },
}

/// Errors raised by an observer hook.
#[derive(Error, Debug)]
pub enum HookError {
    /// The listener does not handle the invoked operation.
    #[error("listener {listener} has no handler for {operation}")]
    MissingHandler { listener: String, operation: String },

    /// The listener failed while handling the operation.
    #[error("listener {listener} failed on {operation}: {message}")]
    Failed {
        listener: String,
        operation: String,
        message: String,
    },
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not exceed {max}, got {value}")]
    TooLarge {
        field: &'static str,
        max: u64,
        value: u64,
    },

    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    #[error("replica region {region} duplicates the primary region")]
    ReplicaIsPrimary { region: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}
