//! # freshet-flow
//!
//! The incremental aggregation engine behind the Freshet intervention
//! analytics views.
//!
//! The engine consumes intervention CDC events and continuously maintains
//! three analytical views with retraction-aware, idempotent upserts:
//!
//! - **`daily_metrics`** — per-day/per-status counts, completion-duration
//!   averages, and the cross-status validation ratio
//! - **`technician_load`** — live open-work counts and completed-today
//!   windows per technician
//! - **`geo_snapshot`** — last-write-wins location snapshot per intervention
//!
//! ## Architecture
//!
//! - [`watermark`]: stream progress with bounded out-of-order tolerance
//! - [`retraction`]: the id → last-contribution index that makes updates and
//!   deletes subtract their prior effect before adding the new one
//! - [`state`]: keyed accumulator storage with TTL eviction
//! - [`pipeline`]: the three single-owner aggregation folds
//! - [`sink`] / [`source`]: collaborator seams with in-memory and NDJSON
//!   implementations
//! - [`engine`]: the runtime wiring router, pipelines, and sink worker
//!
//! ## Guarantees
//!
//! - **Retraction correctness**: arrival-order application equals a batch
//!   recompute over the same non-late subsequence
//! - **Per-key ordering**: all events for a key are folded by one owner, and
//!   sink writes preserve per-key order
//! - **Progress under failure**: malformed payloads, late events, and
//!   exhausted sink retries are counted and skipped, never fatal
//!
//! ## Example
//!
//! ```rust,no_run
//! use freshet_core::EngineConfig;
//! use freshet_flow::engine::Engine;
//! use freshet_flow::sink::MemorySink;
//! use freshet_flow::source::MemorySource;
//!
//! # async fn demo() -> freshet_flow::error::Result<()> {
//! let source = MemorySource::new([
//!     r#"{"id": 1, "status": "SCHEDULED", "op": "c", "source_ts_ms": 1704096000000}"#,
//! ]);
//! let sink = MemorySink::new();
//! let report = Engine::new(EngineConfig::default(), source, sink.clone())
//!     .run()
//!     .await?;
//! assert_eq!(report.events_admitted, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retraction;
pub mod rows;
pub mod sink;
pub mod source;
pub mod state;
pub mod watermark;

pub use engine::{Engine, EngineReport};
pub use error::{Error, Result};
pub use retraction::{ChangeWithPrior, PriorContribution, RetractionIndex};
pub use rows::{DailyMetricsRow, GeoSnapshotRow, SinkWrite, TechnicianLoadRow};
pub use sink::{JsonLinesSink, MemorySink, RetryPolicy, RetryingSink, SinkUpserter};
pub use source::{EventSource, JsonLinesSource, MemorySource};
pub use watermark::WatermarkTracker;
