//! Output rows emitted toward the analytics sink tables.
//!
//! Each row is the full current state for its primary key: the engine
//! re-emits whole rows on every mutation (upsert semantics), never deltas.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use freshet_core::InterventionStatus;

/// One row of the `daily_metrics` view, keyed by `(metric_date, status)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricsRow {
    /// UTC day the interventions are planned on.
    pub metric_date: NaiveDate,
    /// Status bucket.
    pub status: InterventionStatus,
    /// Number of interventions in this bucket.
    pub total_count: i64,
    /// Mean of `completed_at - started_at` in seconds, when known.
    pub avg_completion_seconds: Option<f64>,
    /// Percentage of completed work that was validated; only populated on
    /// VALIDATED rows, null when nothing is completed yet.
    pub validation_ratio: Option<f64>,
    /// Source time of the last event that refreshed this row.
    pub last_refreshed_at: DateTime<Utc>,
}

/// One row of the `technician_load` view, keyed by `technician_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianLoadRow {
    /// The technician.
    pub technician_id: i64,
    /// Live count of SCHEDULED/IN_PROGRESS interventions assigned to them.
    pub open_count: i64,
    /// Interventions completed within the current UTC calendar day.
    pub completed_today: i64,
    /// Mean completion duration in seconds, when known.
    pub avg_completion_seconds: Option<f64>,
    /// Source time of the last event that refreshed this row.
    pub last_refreshed_at: DateTime<Utc>,
}

/// One row of the `geo_snapshot` view, keyed by `intervention_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoSnapshotRow {
    /// The intervention.
    pub intervention_id: i64,
    /// Site latitude.
    pub latitude: f64,
    /// Site longitude.
    pub longitude: f64,
    /// Current status, when known.
    pub status: Option<InterventionStatus>,
    /// Assigned technician, when known.
    pub technician_id: Option<i64>,
    /// Planned time, when known.
    pub planned_at: Option<DateTime<Utc>>,
    /// Upstream update time (source time when the row omits it).
    pub updated_at: DateTime<Utc>,
}

/// A change-row bound for the sink, tagged with its destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum SinkWrite {
    /// Upsert into `daily_metrics`.
    DailyMetrics(DailyMetricsRow),
    /// Upsert into `technician_load`.
    TechnicianLoad(TechnicianLoadRow),
    /// Upsert into `geo_snapshot`.
    GeoUpsert(GeoSnapshotRow),
    /// Delete from `geo_snapshot`.
    GeoDelete {
        /// Primary key of the row to remove.
        intervention_id: i64,
    },
}

impl SinkWrite {
    /// Returns the destination view name, used as a metric label.
    #[must_use]
    pub const fn view(&self) -> &'static str {
        match self {
            Self::DailyMetrics(_) => "daily_metrics",
            Self::TechnicianLoad(_) => "technician_load",
            Self::GeoUpsert(_) | Self::GeoDelete { .. } => "geo_snapshot",
        }
    }

    /// Renders the primary key for logging.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::DailyMetrics(row) => format!("{}/{}", row.metric_date, row.status),
            Self::TechnicianLoad(row) => row.technician_id.to_string(),
            Self::GeoUpsert(row) => row.intervention_id.to_string(),
            Self::GeoDelete { intervention_id } => intervention_id.to_string(),
        }
    }
}
