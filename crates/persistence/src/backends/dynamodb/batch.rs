//! Chunked batch requests with exponential backoff.
//!
//! A batch is split into chunks no larger than the configured batch size and
//! the chunks run one after another. Each chunk is retried while the store
//! throttles it or leaves part of it unprocessed; only the unprocessed part is
//! resubmitted, and the delay doubles after every retry.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{BackendError, StorageError, StorageResult};

use super::backend::{DynamoDbBackend, storage_error};
use super::client::{DynamoApi, DynamoClientError, Row, WriteRequest};
use super::config::BackoffConfig;

/// Retry state of one chunk.
#[derive(Debug)]
pub(crate) struct Backoff<'a> {
    config: &'a BackoffConfig,
    delay: Duration,
    attempts: u32,
    started: Instant,
}

impl<'a> Backoff<'a> {
    pub(crate) fn new(config: &'a BackoffConfig) -> Self {
        Self {
            config,
            delay: config.initial_delay,
            attempts: 0,
            started: Instant::now(),
        }
    }

    /// Records one attempt.
    pub(crate) fn attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the wait before the next attempt, or `None` once the bound is reached.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.limit.allows_another(self.attempts) {
            return None;
        }
        let delay = self.delay;
        if let Some(max_elapsed) = self.config.max_elapsed {
            if self.started.elapsed() + delay > max_elapsed {
                return None;
            }
        }
        self.delay = (self.delay * 2).min(self.config.max_delay);
        Some(delay)
    }
}

impl DynamoDbBackend {
    /// Fetches rows by key, in chunks.
    pub(crate) async fn batch_get(
        &self,
        client: &dyn DynamoApi,
        table: &str,
        keys: &[String],
    ) -> StorageResult<Vec<Row>> {
        let mut rows = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.config.max_batch_get_items) {
            self.get_chunk(client, table, chunk.to_vec(), &mut rows)
                .await?;
        }
        Ok(rows)
    }

    /// Applies put and delete requests, in chunks.
    ///
    /// Returns the number of requests the store applied. It is short of
    /// `requests.len()` only when a chunk gave up and `fail_on_batch_error`
    /// is off.
    pub(crate) async fn batch_write(
        &self,
        client: &dyn DynamoApi,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> StorageResult<usize> {
        let mut applied = 0;
        for chunk in requests.chunks(self.config.max_batch_write_items) {
            applied += self.write_chunk(client, table, chunk.to_vec()).await?;
        }
        Ok(applied)
    }

    async fn get_chunk(
        &self,
        client: &dyn DynamoApi,
        table: &str,
        mut pending: Vec<String>,
        rows: &mut Vec<Row>,
    ) -> StorageResult<()> {
        let mut backoff = Backoff::new(&self.config.backoff);
        loop {
            let attempt = backoff.attempt();
            let failure = match client.batch_get_item(table, pending.clone()).await {
                Ok(out) => {
                    rows.extend(out.rows);
                    if out.unprocessed_keys.is_empty() {
                        return Ok(());
                    }
                    warn!(
                        table,
                        attempt,
                        count = out.unprocessed_keys.len(),
                        "batch get left keys unprocessed"
                    );
                    pending = out.unprocessed_keys;
                    BackendError::UnprocessedItems {
                        table: table.to_string(),
                        count: pending.len(),
                        attempts: attempt,
                    }
                }
                Err(DynamoClientError::Throttled(message)) => {
                    warn!(table, attempt, %message, "batch get throttled");
                    BackendError::Throttled {
                        table: table.to_string(),
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    error!(table, error = %e, keys = ?pending, "batch get failed");
                    return self.batch_failed(storage_error(e, table), ());
                }
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!(table, backoff = ?delay, "retrying batch get");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        table,
                        attempts = backoff.attempts(),
                        keys = ?pending,
                        "batch get gave up"
                    );
                    return self.batch_failed(failure.into(), ());
                }
            }
        }
    }

    async fn write_chunk(
        &self,
        client: &dyn DynamoApi,
        table: &str,
        mut pending: Vec<WriteRequest>,
    ) -> StorageResult<usize> {
        let total = pending.len();
        let mut backoff = Backoff::new(&self.config.backoff);
        loop {
            let attempt = backoff.attempt();
            let failure = match client.batch_write_item(table, pending.clone()).await {
                Ok(out) => {
                    if out.unprocessed.is_empty() {
                        return Ok(total);
                    }
                    warn!(
                        table,
                        attempt,
                        count = out.unprocessed.len(),
                        "batch write left items unprocessed"
                    );
                    pending = out.unprocessed;
                    BackendError::UnprocessedItems {
                        table: table.to_string(),
                        count: pending.len(),
                        attempts: attempt,
                    }
                }
                Err(DynamoClientError::Throttled(message)) => {
                    warn!(table, attempt, %message, "batch write throttled");
                    BackendError::Throttled {
                        table: table.to_string(),
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    error!(table, error = %e, count = pending.len(), "batch write failed");
                    return self.batch_failed(storage_error(e, table), total - pending.len());
                }
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!(table, backoff = ?delay, "retrying batch write");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        table,
                        attempts = backoff.attempts(),
                        count = pending.len(),
                        "batch write gave up"
                    );
                    return self.batch_failed(failure.into(), total - pending.len());
                }
            }
        }
    }

    /// Raises `err`, or settles for `partial` when batch errors are tolerated.
    fn batch_failed<T>(&self, err: StorageError, partial: T) -> StorageResult<T> {
        if self.config.fail_on_batch_error {
            Err(err)
        } else {
            Ok(partial)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::dynamodb::RetryLimit;

    #[test]
    fn test_delays_double_until_capped() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            limit: RetryLimit::Unbounded,
            max_elapsed: None,
        };
        let mut backoff = Backoff::new(&config);
        let delays: Vec<_> = (0..4)
            .map(|_| {
                backoff.attempt();
                backoff.next_delay().unwrap()
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_attempt_bound() {
        let config = BackoffConfig {
            limit: RetryLimit::MaxAttempts(2),
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        backoff.attempt();
        assert!(backoff.next_delay().is_some());
        backoff.attempt();
        assert!(backoff.next_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_bound() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(2),
            limit: RetryLimit::Unbounded,
            max_elapsed: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        backoff.attempt();
        let first = backoff.next_delay().unwrap();
        tokio::time::sleep(first).await;
        backoff.attempt();
        // 2s elapsed + 4s next delay would pass the 5s bound.
        assert!(backoff.next_delay().is_none());
    }
}
