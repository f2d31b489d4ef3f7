use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use super::client::{
    APPID_COLUMN, AttrValue, BatchGetOutput, BatchWriteOutput, DynamoApi, DynamoClientError,
    ID_COLUMN, IndexCursor, IndexQuery, KEY_COLUMN, PageOutput, Row, ScanRequest,
    TableDescription, TableSpec, TableStatus, VERSION_COLUMN, WriteRequest,
};
use super::pool::ClientFactory;

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub op: &'static str,
    pub table: String,
    pub items: usize,
    pub at: Instant,
}

#[derive(Debug)]
struct MockTable {
    spec: TableSpec,
    rows: BTreeMap<String, Row>,
    polls_until_active: u32,
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, MockTable>,
    calls: Vec<Call>,
    throttle_batch_writes: u32,
    throttle_batch_gets: u32,
    unprocessed_writes: usize,
    unprocessed_gets: usize,
    fail_batch_writes: bool,
    activation_polls: u32,
    global_tables: HashMap<String, Vec<String>>,
    removed_replicas: Vec<(String, String)>,
    pitr: HashSet<String>,
}

impl MockState {
    fn record(&mut self, op: &'static str, table: &str, items: usize) {
        self.calls.push(Call {
            op,
            table: table.to_string(),
            items,
            at: Instant::now(),
        });
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MockTable, DynamoClientError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| DynamoClientError::NotFound(table.to_string()))
    }
}

fn key_of(row: &Row) -> Option<String> {
    row.get(KEY_COLUMN).map(|v| v.as_str().to_string())
}

fn column<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map(AttrValue::as_str).unwrap_or_default()
}

/// In-memory stand-in for one regional DynamoDB endpoint.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDynamo {
    state: Arc<Mutex<MockState>>,
}

impl MockDynamo {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tables(tables: &[&str]) -> Self {
        let mock = Self::new();
        for table in tables {
            mock.add_table(table, None);
        }
        mock
    }

    pub(crate) fn add_table(&self, name: &str, index: Option<super::client::IndexSpec>) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(
            name.to_string(),
            MockTable {
                spec: TableSpec {
                    name: name.to_string(),
                    read_capacity: 1,
                    write_capacity: 1,
                    index,
                    stream_enabled: false,
                },
                rows: BTreeMap::new(),
                polls_until_active: 0,
            },
        );
    }

    pub(crate) fn throttle_batch_writes(&self, times: u32) {
        self.state.lock().unwrap().throttle_batch_writes = times;
    }

    pub(crate) fn throttle_batch_gets(&self, times: u32) {
        self.state.lock().unwrap().throttle_batch_gets = times;
    }

    /// The next batch write leaves its last `count` items unprocessed.
    pub(crate) fn leave_unprocessed_writes(&self, count: usize) {
        self.state.lock().unwrap().unprocessed_writes = count;
    }

    /// The next batch get leaves its last `count` keys unprocessed.
    pub(crate) fn leave_unprocessed_gets(&self, count: usize) {
        self.state.lock().unwrap().unprocessed_gets = count;
    }

    pub(crate) fn fail_batch_writes(&self) {
        self.state.lock().unwrap().fail_batch_writes = true;
    }

    pub(crate) fn set_activation_polls(&self, polls: u32) {
        self.state.lock().unwrap().activation_polls = polls;
    }

    pub(crate) fn calls(&self, op: &str) -> Vec<Call> {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub(crate) fn call_count(&self, op: &str) -> usize {
        self.calls(op).len()
    }

    pub(crate) fn row(&self, table: &str, key: &str) -> Option<Row> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).and_then(|t| t.rows.get(key).cloned())
    }

    pub(crate) fn row_keys(&self, table: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    pub(crate) fn table_spec(&self, table: &str) -> Option<TableSpec> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.spec.clone())
    }

    pub(crate) fn global_table(&self, table: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().global_tables.get(table).cloned()
    }

    pub(crate) fn removed_replicas(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().removed_replicas.clone()
    }

    pub(crate) fn pitr_enabled(&self, table: &str) -> bool {
        self.state.lock().unwrap().pitr.contains(table)
    }
}

#[async_trait]
impl DynamoApi for MockDynamo {
    async fn describe_table(
        &self,
        table: &str,
    ) -> Result<Option<TableDescription>, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("describe_table", table, 0);
        Ok(state.tables.get_mut(table).map(|t| {
            let status = if t.polls_until_active > 0 {
                t.polls_until_active -= 1;
                TableStatus::Creating
            } else {
                TableStatus::Active
            };
            TableDescription {
                name: table.to_string(),
                status,
            }
        }))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_table", &spec.name, 0);
        if state.tables.contains_key(&spec.name) {
            return Err(DynamoClientError::InUse(spec.name.clone()));
        }
        let polls = state.activation_polls;
        state.tables.insert(
            spec.name.clone(),
            MockTable {
                spec: spec.clone(),
                rows: BTreeMap::new(),
                polls_until_active: polls,
            },
        );
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_table", table, 0);
        state
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| DynamoClientError::NotFound(table.to_string()))
    }

    async fn get_item(&self, table: &str, key: &str) -> Result<Option<Row>, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("get_item", table, 1);
        Ok(state.table_mut(table)?.rows.get(key).cloned())
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("put_item", table, 1);
        let key = key_of(&row).ok_or_else(|| DynamoClientError::InvalidInput("no key".into()))?;
        state.table_mut(table)?.rows.insert(key, row);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: &str,
        columns: Row,
        expected_version: Option<i64>,
    ) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("update_item", table, 1);
        let rows = &mut state.table_mut(table)?.rows;

        if let Some(expected) = expected_version {
            let stored = rows
                .get(key)
                .and_then(|r| r.get(VERSION_COLUMN))
                .and_then(|v| v.as_str().parse::<i64>().ok())
                .unwrap_or(0);
            if stored != expected {
                return Err(DynamoClientError::ConditionalCheckFailed);
            }
        }

        let row = rows.entry(key.to_string()).or_default();
        row.insert(KEY_COLUMN.to_string(), AttrValue::S(key.to_string()));
        row.extend(columns);
        if let Some(expected) = expected_version {
            row.insert(
                VERSION_COLUMN.to_string(),
                AttrValue::N((expected + 1).to_string()),
            );
        }
        Ok(())
    }

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_item", table, 1);
        state.table_mut(table)?.rows.remove(key);
        Ok(())
    }

    async fn batch_get_item(
        &self,
        table: &str,
        mut keys: Vec<String>,
    ) -> Result<BatchGetOutput, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("batch_get_item", table, keys.len());
        if state.throttle_batch_gets > 0 {
            state.throttle_batch_gets -= 1;
            return Err(DynamoClientError::Throttled("ProvisionedThroughputExceeded".into()));
        }

        let left = std::mem::take(&mut state.unprocessed_gets).min(keys.len());
        let unprocessed_keys = keys.split_off(keys.len() - left);
        let rows = &state.table_mut(table)?.rows;
        Ok(BatchGetOutput {
            rows: keys.iter().filter_map(|k| rows.get(k).cloned()).collect(),
            unprocessed_keys,
        })
    }

    async fn batch_write_item(
        &self,
        table: &str,
        mut requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("batch_write_item", table, requests.len());
        if state.throttle_batch_writes > 0 {
            state.throttle_batch_writes -= 1;
            return Err(DynamoClientError::Throttled("ProvisionedThroughputExceeded".into()));
        }
        if state.fail_batch_writes {
            return Err(DynamoClientError::Internal("forced batch write failure".into()));
        }

        let left = std::mem::take(&mut state.unprocessed_writes).min(requests.len());
        let unprocessed = requests.split_off(requests.len() - left);
        let rows = &mut state.table_mut(table)?.rows;
        for request in requests {
            match request {
                WriteRequest::Put(row) => {
                    if let Some(key) = key_of(&row) {
                        rows.insert(key, row);
                    }
                }
                WriteRequest::Delete(key) => {
                    rows.remove(&key);
                }
            }
        }
        Ok(BatchWriteOutput { unprocessed })
    }

    async fn scan(
        &self,
        table: &str,
        request: ScanRequest,
    ) -> Result<PageOutput<String>, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("scan", table, request.limit as usize);
        let rows = &state.table_mut(table)?.rows;

        let lower = match &request.exclusive_start_key {
            Some(start) => Bound::Excluded(start.clone()),
            None => Bound::Unbounded,
        };
        let mut remaining = rows.range((lower, Bound::Unbounded));
        let examined: Vec<(&String, &Row)> =
            remaining.by_ref().take(request.limit as usize).collect();
        let more = remaining.next().is_some();

        let last_evaluated = if more {
            examined.last().map(|(k, _)| (*k).clone())
        } else {
            None
        };
        let rows = examined
            .into_iter()
            .filter(|(k, _)| {
                request
                    .key_prefix
                    .as_ref()
                    .map(|p| k.starts_with(p.as_str()))
                    .unwrap_or(true)
            })
            .map(|(_, row)| row.clone())
            .collect();
        Ok(PageOutput {
            rows,
            last_evaluated,
        })
    }

    async fn query_index(
        &self,
        table: &str,
        query: IndexQuery,
    ) -> Result<PageOutput<IndexCursor>, DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("query_index", table, query.limit as usize);
        let mock_table = state.table_mut(table)?;
        if mock_table.spec.index.as_ref().map(|i| i.name.as_str()) != Some(query.index.as_str()) {
            return Err(DynamoClientError::InvalidInput(format!(
                "no index {} on {}",
                query.index, table
            )));
        }

        let mut matching: Vec<&Row> = mock_table
            .rows
            .values()
            .filter(|row| column(row, APPID_COLUMN) == query.appid)
            .collect();
        matching.sort_by(|a, b| column(a, ID_COLUMN).cmp(column(b, ID_COLUMN)));
        if !query.forward {
            matching.reverse();
        }
        if let Some(cursor) = &query.exclusive_start {
            if let Some(pos) = matching
                .iter()
                .position(|row| column(row, ID_COLUMN) == cursor.id)
            {
                matching.drain(..=pos);
            }
        }

        let more = matching.len() > query.limit as usize;
        matching.truncate(query.limit as usize);
        let last_evaluated = if more {
            matching.last().map(|row| IndexCursor {
                key: column(row, KEY_COLUMN).to_string(),
                appid: column(row, APPID_COLUMN).to_string(),
                id: column(row, ID_COLUMN).to_string(),
            })
        } else {
            None
        };
        Ok(PageOutput {
            rows: matching.into_iter().cloned().collect(),
            last_evaluated,
        })
    }

    async fn create_global_table(
        &self,
        table: &str,
        regions: &[String],
    ) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_global_table", table, regions.len());
        state
            .global_tables
            .insert(table.to_string(), regions.to_vec());
        Ok(())
    }

    async fn remove_replica(&self, table: &str, region: &str) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("remove_replica", table, 1);
        state
            .removed_replicas
            .push((table.to_string(), region.to_string()));
        Ok(())
    }

    async fn enable_point_in_time_recovery(&self, table: &str) -> Result<(), DynamoClientError> {
        let mut state = self.state.lock().unwrap();
        state.record("enable_point_in_time_recovery", table, 0);
        state.pitr.insert(table.to_string());
        Ok(())
    }
}

/// Hands out one [`MockDynamo`] per region.
#[derive(Debug, Default)]
pub(crate) struct MockFactory {
    clients: Mutex<HashMap<String, MockDynamo>>,
    connects: AtomicUsize,
}

impl MockFactory {
    pub(crate) fn with_client(region: &str, client: MockDynamo) -> Arc<Self> {
        let factory = Self::default();
        factory
            .clients
            .lock()
            .unwrap()
            .insert(region.to_string(), client);
        Arc::new(factory)
    }

    pub(crate) fn client(&self, region: &str) -> MockDynamo {
        self.clients
            .lock()
            .unwrap()
            .entry(region.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn connect(
        &self,
        region: &str,
        _endpoint: Option<&str>,
    ) -> Result<Arc<dyn DynamoApi>, DynamoClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.client(region)))
    }
}
