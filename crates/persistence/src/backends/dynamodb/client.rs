//! Thin abstraction over the DynamoDB API.
//!
//! [`DynamoApi`] exposes exactly the calls the backend makes, in terms of
//! plain string rows. [`AwsDynamoClient`] implements it over the AWS SDK;
//! tests substitute an in-memory implementation.

#![allow(missing_docs)]

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{BuildError, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, DeleteReplicaAction, DeleteRequest, GlobalSecondaryIndex,
    KeySchemaElement, KeyType, KeysAndAttributes, PointInTimeRecoverySpecification, Projection,
    ProjectionType, ProvisionedThroughput, PutRequest, Replica, ReplicaUpdate,
    ScalarAttributeType, StreamSpecification, StreamViewType, TableStatus as SdkTableStatus,
};

/// Partition key column of every table.
pub const KEY_COLUMN: &str = "key";

/// Tenant id column, hash key of the shared table index.
pub const APPID_COLUMN: &str = "appid";

/// Object id column, range key of the shared table index.
pub const ID_COLUMN: &str = "id";

/// Numeric version column.
pub const VERSION_COLUMN: &str = "version";

/// A column value, mirroring the DynamoDB attribute types the backend uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// String column.
    S(String),
    /// Number column, in its decimal text form.
    N(String),
    Bool(bool),
    Null,
    /// List of values.
    L(Vec<AttrValue>),
    /// Map of named values.
    M(HashMap<String, AttrValue>),
}

impl AttrValue {
    /// Returns the text of a string or number column, empty for other types.
    pub fn as_str(&self) -> &str {
        match self {
            AttrValue::S(s) | AttrValue::N(s) => s,
            _ => "",
        }
    }
}

/// One table row.
pub type Row = HashMap<String, AttrValue>;

/// Lifecycle state of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Other(String),
}

/// What the backend needs to know about an existing table.
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub name: String,
    pub status: TableStatus,
}

/// A secondary index on (hash, range) string columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub hash_key: String,
    pub range_key: String,
}

/// Definition of a table to create. The partition key is always [`KEY_COLUMN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub index: Option<IndexSpec>,
    /// Streams are required on tables that join a global table group.
    pub stream_enabled: bool,
}

/// One entry of a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Put(Row),
    Delete(String),
}

/// Result of one batch get call.
#[derive(Debug, Clone, Default)]
pub struct BatchGetOutput {
    pub rows: Vec<Row>,
    pub unprocessed_keys: Vec<String>,
}

/// Result of one batch write call.
#[derive(Debug, Clone, Default)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
}

/// A table scan page request.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub limit: i32,
    pub exclusive_start_key: Option<String>,
    /// Keep only rows whose key begins with this prefix.
    pub key_prefix: Option<String>,
}

/// Position in the shared table index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCursor {
    pub key: String,
    pub appid: String,
    pub id: String,
}

/// A page query against a secondary index.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index: String,
    pub appid: String,
    pub limit: i32,
    pub forward: bool,
    pub exclusive_start: Option<IndexCursor>,
}

/// One page of rows.
#[derive(Debug, Clone, Default)]
pub struct PageOutput<C> {
    pub rows: Vec<Row>,
    pub last_evaluated: Option<C>,
}

/// Errors surfaced by a [`DynamoApi`] call, keyed on the service error code.
#[derive(Debug, Clone)]
pub enum DynamoClientError {
    NotFound(String),
    ConditionalCheckFailed,
    InUse(String),
    Throttled(String),
    Unavailable(String),
    InvalidInput(String),
    Internal(String),
}

impl std::fmt::Display for DynamoClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DynamoClientError::NotFound(m) => write!(f, "not found: {m}"),
            DynamoClientError::ConditionalCheckFailed => write!(f, "conditional check failed"),
            DynamoClientError::InUse(m) => write!(f, "resource in use: {m}"),
            DynamoClientError::Throttled(m) => write!(f, "throttled: {m}"),
            DynamoClientError::Unavailable(m) => write!(f, "unavailable: {m}"),
            DynamoClientError::InvalidInput(m) => write!(f, "invalid input: {m}"),
            DynamoClientError::Internal(m) => write!(f, "internal: {m}"),
        }
    }
}

impl std::error::Error for DynamoClientError {}

/// The DynamoDB calls made by the backend.
#[async_trait]
pub trait DynamoApi: Send + Sync {
    async fn describe_table(&self, table: &str)
    -> Result<Option<TableDescription>, DynamoClientError>;

    async fn create_table(&self, spec: &TableSpec) -> Result<(), DynamoClientError>;

    async fn delete_table(&self, table: &str) -> Result<(), DynamoClientError>;

    async fn get_item(&self, table: &str, key: &str) -> Result<Option<Row>, DynamoClientError>;

    async fn put_item(&self, table: &str, row: Row) -> Result<(), DynamoClientError>;

    /// Sets the given columns on an existing or new row.
    ///
    /// With `expected_version`, the write only succeeds if the stored version
    /// equals it, and the stored version becomes `expected_version + 1`.
    async fn update_item(
        &self,
        table: &str,
        key: &str,
        columns: Row,
        expected_version: Option<i64>,
    ) -> Result<(), DynamoClientError>;

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), DynamoClientError>;

    async fn batch_get_item(
        &self,
        table: &str,
        keys: Vec<String>,
    ) -> Result<BatchGetOutput, DynamoClientError>;

    async fn batch_write_item(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, DynamoClientError>;

    async fn scan(
        &self,
        table: &str,
        request: ScanRequest,
    ) -> Result<PageOutput<String>, DynamoClientError>;

    async fn query_index(
        &self,
        table: &str,
        query: IndexQuery,
    ) -> Result<PageOutput<IndexCursor>, DynamoClientError>;

    /// Links same-named tables in `regions` into one global table.
    async fn create_global_table(
        &self,
        table: &str,
        regions: &[String],
    ) -> Result<(), DynamoClientError>;

    /// Removes one region from a global table.
    async fn remove_replica(&self, table: &str, region: &str) -> Result<(), DynamoClientError>;

    async fn enable_point_in_time_recovery(&self, table: &str) -> Result<(), DynamoClientError>;
}

/// [`DynamoApi`] over the AWS SDK client.
#[derive(Debug, Clone)]
pub struct AwsDynamoClient {
    client: Client,
}

impl AwsDynamoClient {
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn load_sdk_config(region: &str, endpoint: Option<&str>) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        loader.load().await
    }
}

fn key_map(key: &str) -> HashMap<String, AttributeValue> {
    HashMap::from([(KEY_COLUMN.to_string(), AttributeValue::S(key.to_string()))])
}

fn to_sdk_value(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s),
        AttrValue::N(n) => AttributeValue::N(n),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null => AttributeValue::Null(true),
        AttrValue::L(items) => AttributeValue::L(items.into_iter().map(to_sdk_value).collect()),
        AttrValue::M(fields) => AttributeValue::M(to_sdk_row(fields)),
    }
}

fn to_sdk_row(row: Row) -> HashMap<String, AttributeValue> {
    row.into_iter()
        .map(|(name, value)| (name, to_sdk_value(value)))
        .collect()
}

/// Converts an SDK value. Types the backend never writes (sets, binary) are skipped.
fn from_sdk_value(value: &AttributeValue) -> Option<AttrValue> {
    Some(match value {
        AttributeValue::S(s) => AttrValue::S(s.clone()),
        AttributeValue::N(n) => AttrValue::N(n.clone()),
        AttributeValue::Bool(b) => AttrValue::Bool(*b),
        AttributeValue::Null(_) => AttrValue::Null,
        AttributeValue::L(items) => AttrValue::L(items.iter().filter_map(from_sdk_value).collect()),
        AttributeValue::M(fields) => AttrValue::M(from_sdk_row(fields)),
        _ => return None,
    })
}

fn from_sdk_row(item: &HashMap<String, AttributeValue>) -> Row {
    item.iter()
        .filter_map(|(name, value)| Some((name.clone(), from_sdk_value(value)?)))
        .collect()
}

fn string_column(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, DynamoClientError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(map_build_error)
}

fn string_attribute(name: &str) -> Result<AttributeDefinition, DynamoClientError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(map_build_error)
}

fn throughput(read: i64, write: i64) -> Result<ProvisionedThroughput, DynamoClientError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(read)
        .write_capacity_units(write)
        .build()
        .map_err(map_build_error)
}

#[async_trait]
impl DynamoApi for AwsDynamoClient {
    async fn describe_table(
        &self,
        table: &str,
    ) -> Result<Option<TableDescription>, DynamoClientError> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(out) => Ok(out.table().map(|t| TableDescription {
                name: t.table_name().unwrap_or(table).to_string(),
                status: match t.table_status() {
                    Some(SdkTableStatus::Active) => TableStatus::Active,
                    Some(SdkTableStatus::Creating) => TableStatus::Creating,
                    Some(SdkTableStatus::Updating) => TableStatus::Updating,
                    Some(SdkTableStatus::Deleting) => TableStatus::Deleting,
                    Some(other) => TableStatus::Other(other.as_str().to_string()),
                    None => TableStatus::Other("UNKNOWN".to_string()),
                },
            })),
            Err(err) => match map_sdk_error(err) {
                DynamoClientError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), DynamoClientError> {
        let mut req = self
            .client
            .create_table()
            .table_name(&spec.name)
            .key_schema(key_element(KEY_COLUMN, KeyType::Hash)?)
            .attribute_definitions(string_attribute(KEY_COLUMN)?)
            .provisioned_throughput(throughput(spec.read_capacity, spec.write_capacity)?);

        if let Some(index) = &spec.index {
            let gsi = GlobalSecondaryIndex::builder()
                .index_name(&index.name)
                .key_schema(key_element(&index.hash_key, KeyType::Hash)?)
                .key_schema(key_element(&index.range_key, KeyType::Range)?)
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .provisioned_throughput(throughput(spec.read_capacity, spec.write_capacity)?)
                .build()
                .map_err(map_build_error)?;
            req = req
                .attribute_definitions(string_attribute(&index.hash_key)?)
                .attribute_definitions(string_attribute(&index.range_key)?)
                .global_secondary_indexes(gsi);
        }

        if spec.stream_enabled {
            req = req.stream_specification(
                StreamSpecification::builder()
                    .stream_enabled(true)
                    .stream_view_type(StreamViewType::NewAndOldImages)
                    .build()
                    .map_err(map_build_error)?,
            );
        }

        req.send().await.map_err(map_sdk_error)?;
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), DynamoClientError> {
        self.client
            .delete_table()
            .table_name(table)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &str) -> Result<Option<Row>, DynamoClientError> {
        let out = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key_map(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(out.item().map(from_sdk_row))
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), DynamoClientError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_sdk_row(row)))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: &str,
        columns: Row,
        expected_version: Option<i64>,
    ) -> Result<(), DynamoClientError> {
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut sets = Vec::new();

        for (i, (name, value)) in to_sdk_row(columns).into_iter().enumerate() {
            if name == KEY_COLUMN || name == VERSION_COLUMN {
                continue;
            }
            names.insert(format!("#c{i}"), name);
            values.insert(format!(":v{i}"), value);
            sets.push(format!("#c{i} = :v{i}"));
        }

        let mut req = self.client.update_item().table_name(table).set_key(Some(key_map(key)));

        if let Some(expected) = expected_version {
            names.insert("#version".to_string(), VERSION_COLUMN.to_string());
            values.insert(
                ":expected".to_string(),
                AttributeValue::N(expected.to_string()),
            );
            values.insert(
                ":next".to_string(),
                AttributeValue::N((expected + 1).to_string()),
            );
            sets.push("#version = :next".to_string());
            req = req.condition_expression("#version = :expected");
        }

        if sets.is_empty() {
            return Ok(());
        }

        req.update_expression(format!("SET {}", sets.join(", ")))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), DynamoClientError> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key_map(key)))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn batch_get_item(
        &self,
        table: &str,
        keys: Vec<String>,
    ) -> Result<BatchGetOutput, DynamoClientError> {
        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys.iter().map(|k| key_map(k)).collect()))
            .consistent_read(true)
            .build()
            .map_err(map_build_error)?;

        let out = self
            .client
            .batch_get_item()
            .request_items(table, request)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let rows = out
            .responses()
            .and_then(|r| r.get(table))
            .map(|items| items.iter().map(from_sdk_row).collect())
            .unwrap_or_default();
        let unprocessed_keys = out
            .unprocessed_keys()
            .and_then(|u| u.get(table))
            .map(|ka| {
                ka.keys()
                    .iter()
                    .filter_map(|k| string_column(k, KEY_COLUMN))
                    .collect()
            })
            .unwrap_or_default();

        Ok(BatchGetOutput {
            rows,
            unprocessed_keys,
        })
    }

    async fn batch_write_item(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, DynamoClientError> {
        let mut sdk_requests = Vec::with_capacity(requests.len());
        for request in requests {
            let sdk_request = match request {
                WriteRequest::Put(row) => aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        PutRequest::builder()
                            .set_item(Some(to_sdk_row(row)))
                            .build()
                            .map_err(map_build_error)?,
                    )
                    .build(),
                WriteRequest::Delete(key) => aws_sdk_dynamodb::types::WriteRequest::builder()
                    .delete_request(
                        DeleteRequest::builder()
                            .set_key(Some(key_map(&key)))
                            .build()
                            .map_err(map_build_error)?,
                    )
                    .build(),
            };
            sdk_requests.push(sdk_request);
        }

        let out = self
            .client
            .batch_write_item()
            .request_items(table, sdk_requests)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let unprocessed = out
            .unprocessed_items()
            .and_then(|u| u.get(table))
            .map(|requests| {
                requests
                    .iter()
                    .filter_map(|r| {
                        if let Some(put) = r.put_request() {
                            Some(WriteRequest::Put(from_sdk_row(put.item())))
                        } else {
                            r.delete_request()
                                .and_then(|d| string_column(d.key(), KEY_COLUMN))
                                .map(WriteRequest::Delete)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn scan(
        &self,
        table: &str,
        request: ScanRequest,
    ) -> Result<PageOutput<String>, DynamoClientError> {
        let mut req = self
            .client
            .scan()
            .table_name(table)
            .limit(request.limit)
            .consistent_read(true)
            .set_exclusive_start_key(request.exclusive_start_key.as_deref().map(key_map));

        if let Some(prefix) = request.key_prefix {
            req = req
                .filter_expression("begins_with(#k, :prefix)")
                .expression_attribute_names("#k", KEY_COLUMN)
                .expression_attribute_values(":prefix", AttributeValue::S(prefix));
        }

        let out = req.send().await.map_err(map_sdk_error)?;
        Ok(PageOutput {
            rows: out.items().iter().map(from_sdk_row).collect(),
            last_evaluated: out
                .last_evaluated_key()
                .and_then(|k| string_column(k, KEY_COLUMN)),
        })
    }

    async fn query_index(
        &self,
        table: &str,
        query: IndexQuery,
    ) -> Result<PageOutput<IndexCursor>, DynamoClientError> {
        let start = query.exclusive_start.map(|cursor| {
            HashMap::from([
                (KEY_COLUMN.to_string(), AttributeValue::S(cursor.key)),
                (APPID_COLUMN.to_string(), AttributeValue::S(cursor.appid)),
                (ID_COLUMN.to_string(), AttributeValue::S(cursor.id)),
            ])
        });

        let out = self
            .client
            .query()
            .table_name(table)
            .index_name(&query.index)
            .key_condition_expression("#a = :appid")
            .expression_attribute_names("#a", APPID_COLUMN)
            .expression_attribute_values(":appid", AttributeValue::S(query.appid))
            .limit(query.limit)
            .scan_index_forward(query.forward)
            .set_exclusive_start_key(start)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let last_evaluated = out.last_evaluated_key().and_then(|k| {
            Some(IndexCursor {
                key: string_column(k, KEY_COLUMN)?,
                appid: string_column(k, APPID_COLUMN)?,
                id: string_column(k, ID_COLUMN)?,
            })
        });

        Ok(PageOutput {
            rows: out.items().iter().map(from_sdk_row).collect(),
            last_evaluated,
        })
    }

    async fn create_global_table(
        &self,
        table: &str,
        regions: &[String],
    ) -> Result<(), DynamoClientError> {
        let replicas = regions
            .iter()
            .map(|r| Replica::builder().region_name(r).build())
            .collect();
        self.client
            .create_global_table()
            .global_table_name(table)
            .set_replication_group(Some(replicas))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn remove_replica(&self, table: &str, region: &str) -> Result<(), DynamoClientError> {
        let action = DeleteReplicaAction::builder()
            .region_name(region)
            .build()
            .map_err(map_build_error)?;
        self.client
            .update_global_table()
            .global_table_name(table)
            .replica_updates(ReplicaUpdate::builder().delete(action).build())
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn enable_point_in_time_recovery(&self, table: &str) -> Result<(), DynamoClientError> {
        let spec = PointInTimeRecoverySpecification::builder()
            .point_in_time_recovery_enabled(true)
            .build()
            .map_err(map_build_error)?;
        self.client
            .update_continuous_backups()
            .table_name(table)
            .point_in_time_recovery_specification(spec)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

fn map_build_error(err: BuildError) -> DynamoClientError {
    DynamoClientError::InvalidInput(err.to_string())
}

fn map_sdk_error<E>(err: SdkError<E>) -> DynamoClientError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let fallback = format!("{err:?}");

    match err {
        SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("Unknown");
            let message = service_err
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.clone());
            match code {
                "ConditionalCheckFailedException" => DynamoClientError::ConditionalCheckFailed,
                "ResourceNotFoundException"
                | "TableNotFoundException"
                | "GlobalTableNotFoundException"
                | "ReplicaNotFoundException" => DynamoClientError::NotFound(message),
                "ResourceInUseException"
                | "TableInUseException"
                | "GlobalTableAlreadyExistsException"
                | "ReplicaAlreadyExistsException" => DynamoClientError::InUse(message),
                "ProvisionedThroughputExceededException"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "LimitExceededException" => DynamoClientError::Throttled(message),
                "ValidationException" | "SerializationException" => {
                    DynamoClientError::InvalidInput(message)
                }
                "InternalServerError" | "ServiceUnavailable" => {
                    DynamoClientError::Unavailable(message)
                }
                _ => DynamoClientError::Internal(message),
            }
        }
        SdkError::TimeoutError(_) => DynamoClientError::Unavailable(fallback),
        SdkError::DispatchFailure(_) => DynamoClientError::Unavailable(fallback),
        _ => DynamoClientError::Internal(fallback),
    }
}
