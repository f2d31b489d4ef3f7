//! DynamoDB backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tenant::RoutingConfig;

/// Upper bound imposed by DynamoDB on one BatchGetItem request.
pub const BATCH_GET_LIMIT: usize = 100;

/// Upper bound imposed by DynamoDB on one BatchWriteItem request.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Configuration for the DynamoDB backend.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stratus_persistence::backends::dynamodb::{BackoffConfig, DynamoDbConfig, RetryLimit};
///
/// let config = DynamoDbConfig::default()
///     .with_region("eu-west-1")
///     .with_replica_regions(vec!["us-east-1".to_string()])
///     .with_backoff(BackoffConfig {
///         initial_delay: Duration::from_millis(200),
///         limit: RetryLimit::MaxAttempts(5),
///         ..Default::default()
///     });
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    /// Primary AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional endpoint override (for example DynamoDB Local).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Tenant to table naming rules.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Regions holding replicas of every dedicated tenant table.
    #[serde(default)]
    pub replica_regions: Vec<String>,

    /// Enable point-in-time recovery on created tables.
    #[serde(default)]
    pub point_in_time_recovery: bool,

    /// Maximum keys per batch get request.
    #[serde(default = "default_max_batch_get_items")]
    pub max_batch_get_items: usize,

    /// Maximum items per batch write request.
    #[serde(default = "default_max_batch_write_items")]
    pub max_batch_write_items: usize,

    /// Default provisioned read capacity for new tables.
    #[serde(default = "default_read_capacity")]
    pub read_capacity: i64,

    /// Default provisioned write capacity for new tables.
    #[serde(default = "default_write_capacity")]
    pub write_capacity: i64,

    /// Backoff applied to throttled or partially processed batches.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Turn batches that exhaust their retries into errors instead of
    /// returning the processed part.
    #[serde(default = "default_fail_on_batch_error")]
    pub fail_on_batch_error: bool,

    /// How long to wait for a new table to become active.
    #[serde(with = "humantime_serde", default = "default_table_active_timeout")]
    pub table_active_timeout: Duration,

    /// Interval between table status polls.
    #[serde(with = "humantime_serde", default = "default_table_poll_interval")]
    pub table_poll_interval: Duration,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_batch_get_items() -> usize {
    BATCH_GET_LIMIT
}

fn default_max_batch_write_items() -> usize {
    BATCH_WRITE_LIMIT
}

fn default_read_capacity() -> i64 {
    10
}

fn default_write_capacity() -> i64 {
    5
}

fn default_fail_on_batch_error() -> bool {
    true
}

fn default_table_active_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_table_poll_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            routing: RoutingConfig::default(),
            replica_regions: Vec::new(),
            point_in_time_recovery: false,
            max_batch_get_items: default_max_batch_get_items(),
            max_batch_write_items: default_max_batch_write_items(),
            read_capacity: default_read_capacity(),
            write_capacity: default_write_capacity(),
            backoff: BackoffConfig::default(),
            fail_on_batch_error: default_fail_on_batch_error(),
            table_active_timeout: default_table_active_timeout(),
            table_poll_interval: default_table_poll_interval(),
        }
    }
}

impl DynamoDbConfig {
    /// Sets the primary region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets an endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the naming rules.
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Sets the replica regions.
    pub fn with_replica_regions(mut self, regions: Vec<String>) -> Self {
        self.replica_regions = regions;
        self
    }

    /// Sets the batch sizes.
    pub fn with_batch_sizes(mut self, get_items: usize, write_items: usize) -> Self {
        self.max_batch_get_items = get_items;
        self.max_batch_write_items = write_items;
        self
    }

    /// Sets the batch backoff.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns `true` if tables are replicated to other regions.
    pub fn is_replicated(&self) -> bool {
        !self.replica_regions.is_empty()
    }

    /// Validates configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Blank { field: "region" });
        }
        if let Some(endpoint) = &self.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Blank { field: "endpoint" });
            }
        }
        self.routing.validate()?;

        for region in &self.replica_regions {
            if region.trim().is_empty() {
                return Err(ConfigError::Blank {
                    field: "replica_regions",
                });
            }
            if region == &self.region {
                return Err(ConfigError::ReplicaIsPrimary {
                    region: region.clone(),
                });
            }
        }

        check_batch_size(
            "max_batch_get_items",
            self.max_batch_get_items,
            BATCH_GET_LIMIT,
        )?;
        check_batch_size(
            "max_batch_write_items",
            self.max_batch_write_items,
            BATCH_WRITE_LIMIT,
        )?;

        if self.read_capacity <= 0 {
            return Err(ConfigError::Zero {
                field: "read_capacity",
            });
        }
        if self.write_capacity <= 0 {
            return Err(ConfigError::Zero {
                field: "write_capacity",
            });
        }
        if self.table_poll_interval.is_zero() {
            return Err(ConfigError::Zero {
                field: "table_poll_interval",
            });
        }
        self.backoff.validate()
    }
}

fn check_batch_size(field: &'static str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    if value > max {
        return Err(ConfigError::TooLarge {
            field,
            max: max as u64,
            value: value as u64,
        });
    }
    Ok(())
}

/// How many attempts a throttled batch gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryLimit {
    /// Give up after this many attempts, the first one included.
    MaxAttempts(u32),
    /// Retry until the batch succeeds or `max_elapsed` runs out.
    Unbounded,
}

impl RetryLimit {
    /// Returns `true` if another attempt is allowed after `attempts` attempts.
    pub fn allows_another(&self, attempts: u32) -> bool {
        match self {
            RetryLimit::MaxAttempts(max) => attempts < *max,
            RetryLimit::Unbounded => true,
        }
    }
}

impl Default for RetryLimit {
    fn default() -> Self {
        RetryLimit::MaxAttempts(10)
    }
}

/// Exponential backoff for batch requests.
///
/// The first retry waits `initial_delay`; every further retry doubles the
/// wait, capped at `max_delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Upper bound for a single delay.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Attempt bound.
    #[serde(default)]
    pub limit: RetryLimit,

    /// Optional bound on the total time spent retrying one batch.
    #[serde(with = "humantime_serde::option", default)]
    pub max_elapsed: Option<Duration>,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            limit: RetryLimit::default(),
            max_elapsed: None,
        }
    }
}

impl BackoffConfig {
    /// Validates the backoff settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::Zero {
                field: "backoff.initial_delay",
            });
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::TooLarge {
                field: "backoff.initial_delay",
                max: self.max_delay.as_millis() as u64,
                value: self.initial_delay.as_millis() as u64,
            });
        }
        if self.limit == RetryLimit::MaxAttempts(0) {
            return Err(ConfigError::Zero {
                field: "backoff.limit",
            });
        }
        Ok(())
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
