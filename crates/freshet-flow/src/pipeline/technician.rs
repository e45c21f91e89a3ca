//! Technician workload snapshot keyed by `technician_id`.
//!
//! `open_count` is a live count, not a running sum: every update retracts
//! the prior contribution before applying the new one, and a reassignment
//! touches both the old and the new technician. `completed_today` is a
//! day-window counter reset when the first event of a newer UTC day arrives
//! for that technician (eventual reset, no wall-clock trigger).

use chrono::{DateTime, NaiveDate, Utc};

use crate::retraction::{ChangeWithPrior, PriorContribution};
use crate::rows::{SinkWrite, TechnicianLoadRow};
use crate::state::StateStore;

use super::Pipeline;

/// Running aggregate for one technician.
#[derive(Debug, Clone, Default, PartialEq)]
struct TechnicianAccumulator {
    open_count: i64,
    completed_today: i64,
    today: Option<NaiveDate>,
    duration_sum_seconds: i64,
    duration_count: i64,
    last_event_ts: Option<DateTime<Utc>>,
}

impl TechnicianAccumulator {
    /// Rolls the completed-today window forward when the event's day is
    /// newer than the last-computed day.
    fn roll_day(&mut self, event_day: NaiveDate) {
        match self.today {
            None => self.today = Some(event_day),
            Some(day) if event_day > day => {
                self.today = Some(event_day);
                self.completed_today = 0;
            }
            Some(_) => {}
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg_completion_seconds(&self) -> Option<f64> {
        if self.duration_count > 0 {
            Some(self.duration_sum_seconds as f64 / self.duration_count as f64)
        } else {
            None
        }
    }

    fn touch(&mut self, source_ts: DateTime<Utc>) {
        self.last_event_ts = Some(match self.last_event_ts {
            Some(current) => current.max(source_ts),
            None => source_ts,
        });
    }
}

/// The technician load pipeline.
#[derive(Debug)]
pub struct TechnicianLoadPipeline {
    accumulators: StateStore<i64, TechnicianAccumulator>,
}

impl TechnicianLoadPipeline {
    /// Creates the pipeline with the given state TTL.
    #[must_use]
    pub fn new(state_ttl: std::time::Duration) -> Self {
        Self {
            accumulators: StateStore::new(state_ttl),
        }
    }

    fn retract(
        &mut self,
        prior: &PriorContribution,
        event_day: NaiveDate,
        source_ts: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let technician_id = prior.technician_id?;
        // touch_mut: retraction never resurrects an evicted technician.
        let acc = self.accumulators.touch_mut(&technician_id, now)?;
        acc.roll_day(event_day);

        if prior.status.as_ref().is_some_and(|s| s.is_open()) {
            if acc.open_count == 0 {
                tracing::debug!(
                    technician_id,
                    "open-count retraction underflow; prior state predates tracking"
                );
            }
            acc.open_count = (acc.open_count - 1).max(0);
        }
        if prior.status.as_ref().is_some_and(|s| s.is_completed())
            && prior
                .completed_at
                .is_some_and(|completed| Some(completed.date_naive()) == acc.today)
        {
            acc.completed_today = (acc.completed_today - 1).max(0);
        }
        if let Some(secs) = prior.completion_seconds {
            acc.duration_sum_seconds -= secs;
            acc.duration_count = (acc.duration_count - 1).max(0);
        }
        acc.touch(source_ts);
        Some(technician_id)
    }

    fn row_for(&self, technician_id: i64, fallback_ts: DateTime<Utc>) -> Option<TechnicianLoadRow> {
        let acc = self.accumulators.get(&technician_id)?;
        Some(TechnicianLoadRow {
            technician_id,
            open_count: acc.open_count,
            completed_today: acc.completed_today,
            avg_completion_seconds: acc.avg_completion_seconds(),
            last_refreshed_at: acc.last_event_ts.unwrap_or(fallback_ts),
        })
    }
}

impl Pipeline for TechnicianLoadPipeline {
    fn name(&self) -> &'static str {
        "technician_load"
    }

    fn apply(&mut self, change: &ChangeWithPrior, now: DateTime<Utc>) -> Vec<SinkWrite> {
        let event = &change.event;
        let event_day = event.source_ts.date_naive();
        let mut touched: Vec<i64> = Vec::new();

        if let Some(prior) = &change.prior {
            if let Some(technician_id) = self.retract(prior, event_day, event.source_ts, now) {
                touched.push(technician_id);
            }
        }

        if !event.is_delete() {
            if let Some(technician_id) = event.technician_id {
                let acc = self.accumulators.get_or_insert_default(technician_id, now);
                acc.roll_day(event_day);
                if event.status.as_ref().is_some_and(|s| s.is_open()) {
                    acc.open_count += 1;
                }
                if event.status.as_ref().is_some_and(|s| s.is_completed())
                    && event
                        .completed_at
                        .is_some_and(|completed| Some(completed.date_naive()) == acc.today)
                {
                    acc.completed_today += 1;
                }
                if let Some(secs) = event.completion_seconds() {
                    acc.duration_sum_seconds += secs;
                    acc.duration_count += 1;
                }
                acc.touch(event.source_ts);
                if !touched.contains(&technician_id) {
                    touched.push(technician_id);
                }
            }
        }

        touched
            .into_iter()
            .filter_map(|technician_id| self.row_for(technician_id, event.source_ts))
            .map(SinkWrite::TechnicianLoad)
            .collect()
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.accumulators.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.accumulators.len()
    }
}
