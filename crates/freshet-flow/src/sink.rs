//! Sink upserter contract and the shipped implementations.
//!
//! The engine emits [`SinkWrite`] change-rows; a [`SinkUpserter`] applies
//! them to the external store keyed by each view's primary key,
//! last-write-wins per key, idempotent under replay. Production bus/store
//! transports are collaborator-owned; this module ships an in-memory sink
//! (tests and local runs), an NDJSON writer sink (dev/replay transport), and
//! a retry decorator usable over any sink.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use freshet_core::EngineConfig;

use crate::error::{Error, Result};
use crate::metrics::names;
use crate::rows::{DailyMetricsRow, GeoSnapshotRow, SinkWrite, TechnicianLoadRow};

/// Applies change-rows to the external analytics store.
#[async_trait]
pub trait SinkUpserter: Send + Sync {
    /// Applies one change-row. Re-applying an identical row is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a sink error when the write fails; the caller decides whether
    /// to retry or drop.
    async fn apply(&self, write: &SinkWrite) -> Result<()>;
}

/// Backoff schedule for failed sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries attempted after the initial failure.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(5);

    /// Builds the policy from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.sink_max_retries,
            initial_backoff: config.sink_initial_backoff,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

/// Decorates a sink with bounded exponential-backoff retries.
///
/// After exhausting its retries the final error is returned to the caller,
/// which logs and drops the single row — a failed write never stalls the
/// pipelines.
#[derive(Debug)]
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingSink<S> {
    /// Wraps a sink with the given retry policy.
    #[must_use]
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: SinkUpserter> SinkUpserter for RetryingSink<S> {
    async fn apply(&self, write: &SinkWrite) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.inner.apply(write).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.policy.max_retries => {
                    counter!(names::SINK_RETRIES_TOTAL).increment(1);
                    tracing::warn!(
                        error = %err,
                        view = write.view(),
                        key = %write.key(),
                        attempt,
                        "sink write failed; retrying"
                    );
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// The three view tables as plain maps, keyed by primary key.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    /// `daily_metrics`, keyed by `(metric_date, status)`.
    pub daily_metrics: BTreeMap<(NaiveDate, String), DailyMetricsRow>,
    /// `technician_load`, keyed by `technician_id`.
    pub technician_load: BTreeMap<i64, TechnicianLoadRow>,
    /// `geo_snapshot`, keyed by `intervention_id`.
    pub geo_snapshot: BTreeMap<i64, GeoSnapshotRow>,
}

/// In-memory sink with last-write-wins tables.
///
/// Cloning shares the underlying tables, so a test can hand one clone to the
/// engine and inspect the other after shutdown.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current table contents.
    #[must_use]
    pub fn snapshot(&self) -> MemoryTables {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SinkUpserter for MemorySink {
    async fn apply(&self, write: &SinkWrite) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match write {
            SinkWrite::DailyMetrics(row) => {
                tables
                    .daily_metrics
                    .insert((row.metric_date, row.status.as_str().to_string()), row.clone());
            }
            SinkWrite::TechnicianLoad(row) => {
                tables.technician_load.insert(row.technician_id, row.clone());
            }
            SinkWrite::GeoUpsert(row) => {
                tables.geo_snapshot.insert(row.intervention_id, row.clone());
            }
            SinkWrite::GeoDelete { intervention_id } => {
                tables.geo_snapshot.remove(intervention_id);
            }
        }
        Ok(())
    }
}

/// Writes change-rows as one JSON object per line.
///
/// The dev/replay transport: pipe the output into the loader of your choice.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    /// Wraps an async writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    /// A sink writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> SinkUpserter for JsonLinesSink<W> {
    async fn apply(&self, write: &SinkWrite) -> Result<()> {
        let mut line = serde_json::to_vec(write).map_err(|err| Error::Serialization {
            message: format!("failed to encode sink write: {err}"),
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|err| Error::sink_failure_with_source("failed to write row", err))?;
        writer
            .flush()
            .await
            .map_err(|err| Error::sink_failure_with_source("failed to flush row", err))?;
        Ok(())
    }
}
