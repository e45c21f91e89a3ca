//! Geo-location snapshot keyed by `intervention_id`.
//!
//! No aggregation: any non-delete event carrying both coordinates replaces
//! the row wholesale, and a delete removes it. The only ordering rule is
//! recency after lateness filtering, with `source_ts` as tie-break — a
//! stored row with a higher source time is never overwritten by a lower one.

use chrono::{DateTime, Utc};

use crate::retraction::ChangeWithPrior;
use crate::rows::{GeoSnapshotRow, SinkWrite};
use crate::state::StateStore;

use super::Pipeline;

#[derive(Debug, Clone)]
struct GeoEntry {
    row: GeoSnapshotRow,
    source_ts: DateTime<Utc>,
}

/// The geo snapshot pipeline.
#[derive(Debug)]
pub struct GeoSnapshotPipeline {
    rows: StateStore<i64, GeoEntry>,
}

impl GeoSnapshotPipeline {
    /// Creates the pipeline with the given state TTL.
    #[must_use]
    pub fn new(state_ttl: std::time::Duration) -> Self {
        Self {
            rows: StateStore::new(state_ttl),
        }
    }
}

impl Pipeline for GeoSnapshotPipeline {
    fn name(&self) -> &'static str {
        "geo_snapshot"
    }

    fn apply(&mut self, change: &ChangeWithPrior, now: DateTime<Utc>) -> Vec<SinkWrite> {
        let event = &change.event;

        if event.is_delete() {
            // Best-effort removal by entity id; the sink delete is
            // idempotent, so an untracked id still gets one.
            self.rows.remove(&event.id);
            return vec![SinkWrite::GeoDelete {
                intervention_id: event.id,
            }];
        }

        let (Some(latitude), Some(longitude)) = (event.latitude, event.longitude) else {
            return Vec::new();
        };

        if self
            .rows
            .get(&event.id)
            .is_some_and(|existing| existing.source_ts > event.source_ts)
        {
            tracing::debug!(
                intervention_id = event.id,
                "skipping geo update older than the stored snapshot"
            );
            return Vec::new();
        }

        let row = GeoSnapshotRow {
            intervention_id: event.id,
            latitude,
            longitude,
            status: event.status.clone(),
            technician_id: event.technician_id,
            planned_at: event.planned_at,
            updated_at: event.updated_at.unwrap_or(event.source_ts),
        };
        self.rows.insert(
            event.id,
            GeoEntry {
                row: row.clone(),
                source_ts: event.source_ts,
            },
            now,
        );
        vec![SinkWrite::GeoUpsert(row)]
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.rows.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.rows.len()
    }
}
