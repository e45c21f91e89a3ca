//! Observability metrics for the aggregation engine.
//!
//! Exposed through the `metrics` crate facade; install the Prometheus
//! exporter of your choice at process startup to scrape them.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `freshet_flow_events_total` | Counter | `op` | Admitted change events |
//! | `freshet_flow_malformed_events_total` | Counter | - | Payloads that failed classification |
//! | `freshet_flow_late_events_total` | Counter | - | Events dropped behind the watermark |
//! | `freshet_flow_retraction_misses_total` | Counter | - | Updates/deletes with no known prior |
//! | `freshet_flow_rows_emitted_total` | Counter | `view` | Change-rows emitted toward the sink |
//! | `freshet_flow_sink_retries_total` | Counter | - | Sink write retries |
//! | `freshet_flow_sink_dropped_rows_total` | Counter | - | Rows dropped after exhausting retries |
//! | `freshet_flow_state_evictions_total` | Counter | `pipeline` | Accumulators evicted by TTL |
//! | `freshet_flow_state_entries` | Gauge | `pipeline` | Accumulators currently tracked |

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: admitted change events, by operation.
    pub const EVENTS_TOTAL: &str = "freshet_flow_events_total";
    /// Counter: payloads that failed classification.
    pub const MALFORMED_EVENTS_TOTAL: &str = "freshet_flow_malformed_events_total";
    /// Counter: events dropped behind the watermark.
    pub const LATE_EVENTS_TOTAL: &str = "freshet_flow_late_events_total";
    /// Counter: updates/deletes arriving with no known prior contribution.
    pub const RETRACTION_MISSES_TOTAL: &str = "freshet_flow_retraction_misses_total";
    /// Counter: change-rows emitted toward the sink.
    pub const ROWS_EMITTED_TOTAL: &str = "freshet_flow_rows_emitted_total";
    /// Counter: sink write retries.
    pub const SINK_RETRIES_TOTAL: &str = "freshet_flow_sink_retries_total";
    /// Counter: rows dropped after exhausting sink retries.
    pub const SINK_DROPPED_ROWS_TOTAL: &str = "freshet_flow_sink_dropped_rows_total";
    /// Counter: accumulators evicted by the state TTL.
    pub const STATE_EVICTIONS_TOTAL: &str = "freshet_flow_state_evictions_total";
    /// Gauge: accumulators currently tracked.
    pub const STATE_ENTRIES: &str = "freshet_flow_state_entries";
}

/// Label keys used across metrics.
pub mod labels {
    /// CDC operation (`create`, `update`, `delete`, `snapshot`).
    pub const OP: &str = "op";
    /// Destination view (`daily_metrics`, `technician_load`, `geo_snapshot`).
    pub const VIEW: &str = "view";
    /// Pipeline name.
    pub const PIPELINE: &str = "pipeline";
}

/// High-level interface for recording engine metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics;

impl EngineMetrics {
    /// Creates a metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records an admitted event by operation.
    pub fn record_event(self, op: &str) {
        counter!(names::EVENTS_TOTAL, labels::OP => op.to_string()).increment(1);
    }

    /// Records a payload that failed classification.
    pub fn record_malformed(self) {
        counter!(names::MALFORMED_EVENTS_TOTAL).increment(1);
    }

    /// Records an event dropped behind the watermark.
    pub fn record_late(self) {
        counter!(names::LATE_EVENTS_TOTAL).increment(1);
    }

    /// Records an update/delete with no known prior contribution.
    pub fn record_retraction_miss(self) {
        counter!(names::RETRACTION_MISSES_TOTAL).increment(1);
    }

    /// Records change-rows emitted by a pipeline.
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_rows_emitted(self, view: &str, count: usize) {
        counter!(names::ROWS_EMITTED_TOTAL, labels::VIEW => view.to_string())
            .increment(count as u64);
    }

    /// Records a row dropped after exhausting sink retries.
    pub fn record_sink_drop(self) {
        counter!(names::SINK_DROPPED_ROWS_TOTAL).increment(1);
    }

    /// Records accumulators evicted by the state TTL.
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_evictions(self, pipeline: &str, count: usize) {
        if count > 0 {
            counter!(names::STATE_EVICTIONS_TOTAL, labels::PIPELINE => pipeline.to_string())
                .increment(count as u64);
        }
    }

    /// Publishes the number of accumulators a pipeline tracks.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_state_entries(self, pipeline: &str, count: usize) {
        gauge!(names::STATE_ENTRIES, labels::PIPELINE => pipeline.to_string()).set(count as f64);
    }
}
