//! The three aggregation pipelines.
//!
//! Each pipeline is a single-owner fold over classified changes: it reads
//! and mutates its own [`StateStore`](crate::state::StateStore) and returns
//! the full rows to re-emit. Pipelines are synchronous and deterministic;
//! the engine runs each one on its own task and feeds it messages in
//! post-lateness-filter arrival order, which is what keeps the
//! retract-then-apply logic race free.

pub mod daily;
pub mod geo;
pub mod technician;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::retraction::ChangeWithPrior;
use crate::rows::SinkWrite;

pub use daily::DailyMetricsPipeline;
pub use geo::GeoSnapshotPipeline;
pub use technician::TechnicianLoadPipeline;

/// A single-owner incremental aggregation over classified changes.
pub trait Pipeline: Send {
    /// Pipeline name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Folds one change into the pipeline state and returns the rows to
    /// re-emit. `now` stamps state entries for TTL accounting only; it never
    /// influences aggregate values.
    fn apply(&mut self, change: &ChangeWithPrior, now: DateTime<Utc>) -> Vec<SinkWrite>;

    /// Evicts state idle past the TTL. Returns the evicted key count.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize;

    /// Number of keys currently tracked, for gauge reporting.
    fn tracked_keys(&self) -> usize;
}

/// Message delivered to a pipeline task.
#[derive(Debug, Clone)]
pub enum PipelineMsg {
    /// Fold this change.
    Change(Arc<ChangeWithPrior>),
    /// Evict state idle at the given instant.
    Sweep(DateTime<Utc>),
}
