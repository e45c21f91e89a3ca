//! The aggregation engine runtime.
//!
//! One router task classifies payloads, gates lateness against the
//! watermark, maintains the retraction index, and fans admitted changes out
//! to the three pipeline tasks. Each pipeline owns its state exclusively and
//! forwards emitted rows to a single sink worker over an ordered channel, so
//! per-key write ordering falls out of per-sender FIFO: every key is written
//! by exactly one pipeline, and that pipeline sends in fold order.
//!
//! Shutdown (stop signal or source exhaustion) closes the fan-out channels;
//! pipelines drain, their senders drop, the sink worker drains in-flight
//! writes, and `run` returns a final [`EngineReport`]. A failed sink write
//! or a bad payload never stalls the rest of the stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};

use freshet_core::{ChangeOp, EngineConfig, InterventionChangeEvent};

use crate::error::{Error, Result};
use crate::metrics::EngineMetrics;
use crate::pipeline::{
    DailyMetricsPipeline, GeoSnapshotPipeline, Pipeline, PipelineMsg, TechnicianLoadPipeline,
};
use crate::retraction::{ChangeWithPrior, RetractionIndex};
use crate::rows::SinkWrite;
use crate::sink::{RetryPolicy, RetryingSink, SinkUpserter};
use crate::source::EventSource;
use crate::watermark::WatermarkTracker;

/// Ceiling on the state-sweep cadence.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Totals reported when the engine stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Events admitted into aggregation.
    pub events_admitted: u64,
    /// Payloads that failed classification.
    pub malformed_events: u64,
    /// Events dropped behind the watermark.
    pub late_events_dropped: u64,
    /// Updates/deletes that arrived with no known prior contribution.
    pub retraction_index_misses: u64,
    /// Change-rows emitted by the pipelines.
    pub rows_emitted: u64,
    /// Sink writes applied successfully.
    pub sink_writes_applied: u64,
    /// Sink writes dropped after exhausting retries.
    pub sink_writes_dropped: u64,
    /// Accumulators evicted by the state TTL.
    pub state_entries_evicted: u64,
}

#[derive(Debug, Default)]
struct PipelineStats {
    rows_emitted: u64,
    evicted: u64,
}

#[derive(Debug, Default)]
struct SinkStats {
    applied: u64,
    dropped: u64,
}

/// The incremental aggregation engine.
///
/// Consumes an [`EventSource`] until it ends (or a stop signal fires) and
/// maintains the three analytics views through a [`SinkUpserter`].
pub struct Engine<Src, Snk> {
    config: EngineConfig,
    source: Src,
    sink: Snk,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<Src, Snk> Engine<Src, Snk>
where
    Src: EventSource,
    Snk: SinkUpserter + 'static,
{
    /// Creates an engine over the given source and sink.
    #[must_use]
    pub fn new(config: EngineConfig, source: Src, sink: Snk) -> Self {
        Self {
            config,
            source,
            sink,
            shutdown: None,
        }
    }

    /// Attaches a stop signal; sending `true` drains and stops the engine.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Runs the engine to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the source fails irrecoverably or an internal
    /// stage goes away unexpectedly. Per-record problems are counted in the
    /// report instead.
    pub async fn run(self) -> Result<EngineReport> {
        let Self {
            config,
            mut source,
            sink,
            mut shutdown,
        } = self;

        let metrics = EngineMetrics::new();
        let capacity = config.channel_capacity.max(1);

        let (write_tx, write_rx) = mpsc::channel::<SinkWrite>(capacity);
        let sink_task = spawn_sink_worker(
            RetryingSink::new(sink, RetryPolicy::from_config(&config)),
            write_rx,
            metrics,
        );

        let daily = DailyMetricsPipeline::new(config.state_ttl);
        let technician = TechnicianLoadPipeline::new(config.state_ttl);
        let geo = GeoSnapshotPipeline::new(config.state_ttl);
        let (daily_tx, daily_task) = spawn_pipeline(daily, capacity, write_tx.clone(), metrics);
        let (tech_tx, tech_task) = spawn_pipeline(technician, capacity, write_tx.clone(), metrics);
        let (geo_tx, geo_task) = spawn_pipeline(geo, capacity, write_tx, metrics);
        let pipeline_txs = [daily_tx, tech_tx, geo_tx];

        let mut tracker = WatermarkTracker::new(config.allowed_lateness);
        let mut index = RetractionIndex::new(config.state_ttl);
        let mut report = EngineReport::default();

        let mut sweep_ticker = interval(config.state_ttl.min(MAX_SWEEP_INTERVAL).max(
            Duration::from_secs(1),
        ));
        sweep_ticker.tick().await; // the immediate first tick

        let idle_timeout = config.idle_timeout.max(Duration::from_millis(10));
        let idle = sleep(idle_timeout);
        tokio::pin!(idle);

        let source_error = loop {
            tokio::select! {
                next = source.next_record() => {
                    match next {
                        Err(err) => break Some(err),
                        Ok(None) => {
                            tracing::info!("event source ended; draining");
                            break None;
                        }
                        Ok(Some(payload)) => {
                            match InterventionChangeEvent::classify(&payload) {
                                Err(err) => {
                                    report.malformed_events += 1;
                                    metrics.record_malformed();
                                    tracing::warn!(error = %err, "dropping malformed change record");
                                }
                                Ok(event) if tracker.is_late(event.source_ts) => {
                                    report.late_events_dropped += 1;
                                    metrics.record_late();
                                    tracing::debug!(
                                        id = event.id,
                                        source_ts = %event.source_ts,
                                        watermark = ?tracker.watermark(),
                                        "dropping late event"
                                    );
                                }
                                Ok(event) => {
                                    tracker.observe(event.source_ts);
                                    report.events_admitted += 1;
                                    metrics.record_event(event.op.as_name());

                                    let prior = index.apply(&event, Utc::now());
                                    if prior.is_none()
                                        && matches!(event.op, ChangeOp::Update | ChangeOp::Delete)
                                    {
                                        report.retraction_index_misses += 1;
                                        metrics.record_retraction_miss();
                                        tracing::debug!(
                                            id = event.id,
                                            op = event.op.as_name(),
                                            "no prior contribution; applying best-effort"
                                        );
                                    }

                                    let change = Arc::new(ChangeWithPrior { event, prior });
                                    for tx in &pipeline_txs {
                                        tx.send(PipelineMsg::Change(Arc::clone(&change)))
                                            .await
                                            .map_err(|_| Error::ChannelClosed {
                                                stage: "pipeline",
                                            })?;
                                    }
                                }
                            }
                            idle.as_mut().reset(Instant::now() + idle_timeout);
                        }
                    }
                }
                () = &mut idle => {
                    if tracker.advance_idle() {
                        tracing::debug!(
                            watermark = ?tracker.watermark(),
                            "watermark advanced on idle source"
                        );
                    }
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
                _ = sweep_ticker.tick() => {
                    let now = Utc::now();
                    report.state_entries_evicted += index.sweep(now) as u64;
                    for tx in &pipeline_txs {
                        tx.send(PipelineMsg::Sweep(now))
                            .await
                            .map_err(|_| Error::ChannelClosed { stage: "pipeline" })?;
                    }
                }
                () = stop_requested(&mut shutdown) => {
                    tracing::info!("shutdown requested; draining");
                    break None;
                }
            }
        };

        // Close the fan-out; pipelines drain, then their write senders drop
        // and the sink worker drains in turn.
        drop(pipeline_txs);
        for task in [daily_task, tech_task, geo_task] {
            let stats = join_stage(task, "pipeline").await?;
            report.rows_emitted += stats.rows_emitted;
            report.state_entries_evicted += stats.evicted;
        }
        let sink_stats = join_stage(sink_task, "sink").await?;
        report.sink_writes_applied = sink_stats.applied;
        report.sink_writes_dropped = sink_stats.dropped;

        match source_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

async fn stop_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender gone without a stop: never resolves.
                    std::future::pending::<()>().await;
                }
            }
        }
        None => std::future::pending().await,
    }
}

async fn join_stage<T>(task: JoinHandle<T>, stage: &'static str) -> Result<T> {
    task.await
        .map_err(|err| Error::internal(format!("{stage} task failed: {err}")))
}

fn spawn_pipeline<P>(
    mut pipeline: P,
    capacity: usize,
    write_tx: mpsc::Sender<SinkWrite>,
    metrics: EngineMetrics,
) -> (mpsc::Sender<PipelineMsg>, JoinHandle<PipelineStats>)
where
    P: Pipeline + 'static,
{
    let (tx, mut rx) = mpsc::channel::<PipelineMsg>(capacity);
    let task = tokio::spawn(async move {
        let mut stats = PipelineStats::default();
        while let Some(msg) = rx.recv().await {
            match msg {
                PipelineMsg::Change(change) => {
                    let writes = pipeline.apply(&change, Utc::now());
                    stats.rows_emitted += writes.len() as u64;
                    metrics.record_rows_emitted(pipeline.name(), writes.len());
                    for write in writes {
                        if write_tx.send(write).await.is_err() {
                            tracing::warn!(
                                pipeline = pipeline.name(),
                                "sink worker gone; stopping pipeline"
                            );
                            return stats;
                        }
                    }
                }
                PipelineMsg::Sweep(now) => {
                    let evicted = pipeline.sweep(now);
                    stats.evicted += evicted as u64;
                    metrics.record_evictions(pipeline.name(), evicted);
                    metrics.set_state_entries(pipeline.name(), pipeline.tracked_keys());
                }
            }
        }
        stats
    });
    (tx, task)
}

fn spawn_sink_worker<S>(
    sink: RetryingSink<S>,
    mut rx: mpsc::Receiver<SinkWrite>,
    metrics: EngineMetrics,
) -> JoinHandle<SinkStats>
where
    S: SinkUpserter + 'static,
{
    tokio::spawn(async move {
        let mut stats = SinkStats::default();
        while let Some(write) = rx.recv().await {
            match sink.apply(&write).await {
                Ok(()) => stats.applied += 1,
                Err(err) => {
                    stats.dropped += 1;
                    metrics.record_sink_drop();
                    tracing::error!(
                        error = %err,
                        view = write.view(),
                        key = %write.key(),
                        "dropping sink write after exhausting retries"
                    );
                }
            }
        }
        stats
    })
}
