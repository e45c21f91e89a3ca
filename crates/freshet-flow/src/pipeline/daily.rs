//! Daily metrics rollup keyed by `(metric_date, status)`.
//!
//! Counts and completion-duration averages are folded per group; the
//! cross-status `validation_ratio` is a secondary pass over the sibling
//! accumulators of the same day, recomputed whenever any status of that day
//! changes. Accumulators are grouped by day so the siblings needed for the
//! ratio live (and expire) together.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use freshet_core::InterventionStatus;

use crate::retraction::ChangeWithPrior;
use crate::rows::{DailyMetricsRow, SinkWrite};
use crate::state::StateStore;

use super::Pipeline;

/// Running aggregate for one `(metric_date, status)` group.
#[derive(Debug, Clone, Default, PartialEq)]
struct DailyAccumulator {
    total_count: i64,
    duration_sum_seconds: i64,
    duration_count: i64,
    last_event_ts: Option<DateTime<Utc>>,
}

impl DailyAccumulator {
    #[allow(clippy::cast_precision_loss)]
    fn avg_completion_seconds(&self) -> Option<f64> {
        if self.duration_count > 0 {
            Some(self.duration_sum_seconds as f64 / self.duration_count as f64)
        } else {
            None
        }
    }

    fn fold(&mut self, completion_seconds: Option<i64>, source_ts: DateTime<Utc>) {
        self.total_count += 1;
        if let Some(secs) = completion_seconds {
            self.duration_sum_seconds += secs;
            self.duration_count += 1;
        }
        self.touch(source_ts);
    }

    fn retract(&mut self, completion_seconds: Option<i64>, source_ts: DateTime<Utc>) {
        self.total_count = (self.total_count - 1).max(0);
        if let Some(secs) = completion_seconds {
            self.duration_sum_seconds -= secs;
            self.duration_count = (self.duration_count - 1).max(0);
        }
        self.touch(source_ts);
    }

    fn touch(&mut self, source_ts: DateTime<Utc>) {
        self.last_event_ts = Some(match self.last_event_ts {
            Some(current) => current.max(source_ts),
            None => source_ts,
        });
    }
}

/// All status buckets of one metric day.
#[derive(Debug, Clone, Default)]
struct DateGroup {
    by_status: HashMap<InterventionStatus, DailyAccumulator>,
}

impl DateGroup {
    /// Sums the ratio inputs across the day's status buckets.
    fn completion_summary(&self) -> (i64, i64) {
        let mut completed_total = 0;
        let mut validated_total = 0;
        for (status, acc) in &self.by_status {
            if status.is_completed() {
                completed_total += acc.total_count;
            }
            if status.is_validated() {
                validated_total += acc.total_count;
            }
        }
        (completed_total, validated_total)
    }
}

/// The daily metrics pipeline.
#[derive(Debug)]
pub struct DailyMetricsPipeline {
    groups: StateStore<NaiveDate, DateGroup>,
}

impl DailyMetricsPipeline {
    /// Creates the pipeline with the given state TTL.
    #[must_use]
    pub fn new(state_ttl: std::time::Duration) -> Self {
        Self {
            groups: StateStore::new(state_ttl),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn row_for(
        &self,
        date: NaiveDate,
        status: &InterventionStatus,
        fallback_ts: DateTime<Utc>,
    ) -> Option<DailyMetricsRow> {
        let group = self.groups.get(&date)?;
        let acc = group.by_status.get(status)?;
        let (completed_total, validated_total) = group.completion_summary();
        let validation_ratio = if status.is_validated() && completed_total > 0 {
            Some(validated_total as f64 * 100.0 / completed_total as f64)
        } else {
            None
        };
        Some(DailyMetricsRow {
            metric_date: date,
            status: status.clone(),
            total_count: acc.total_count,
            avg_completion_seconds: acc.avg_completion_seconds(),
            validation_ratio,
            last_refreshed_at: acc.last_event_ts.unwrap_or(fallback_ts),
        })
    }
}

impl Pipeline for DailyMetricsPipeline {
    fn name(&self) -> &'static str {
        "daily_metrics"
    }

    fn apply(&mut self, change: &ChangeWithPrior, now: DateTime<Utc>) -> Vec<SinkWrite> {
        let event = &change.event;
        let mut touched: Vec<(NaiveDate, InterventionStatus)> = Vec::new();

        // Retract the prior contribution first, or status changes double
        // count. The prior group may differ in both day and status.
        if let Some(prior) = &change.prior {
            if let (Some(date), Some(status)) = (prior.metric_date, prior.status.clone()) {
                // touch_mut: an evicted day is never resurrected by a retraction.
                if let Some(group) = self.groups.touch_mut(&date, now) {
                    if let Some(acc) = group.by_status.get_mut(&status) {
                        acc.retract(prior.completion_seconds, event.source_ts);
                        touched.push((date, status));
                    }
                }
            }
        }

        if !event.is_delete() {
            if let (Some(date), Some(status)) = (event.metric_date(), event.status.clone()) {
                let group = self.groups.get_or_insert_default(date, now);
                group
                    .by_status
                    .entry(status.clone())
                    .or_default()
                    .fold(event.completion_seconds(), event.source_ts);
                if !touched.contains(&(date, status.clone())) {
                    touched.push((date, status));
                }
            }
        }

        // Any count mutation can move the day's validation ratio, so the
        // day's VALIDATED row is refreshed alongside the touched groups.
        let mut dates: Vec<NaiveDate> = touched.iter().map(|(date, _)| *date).collect();
        dates.dedup();
        for date in dates {
            let key = (date, InterventionStatus::Validated);
            if touched.contains(&key) {
                continue;
            }
            if self
                .groups
                .get(&date)
                .is_some_and(|group| group.by_status.contains_key(&key.1))
            {
                touched.push(key);
            }
        }

        touched
            .into_iter()
            .filter_map(|(date, status)| self.row_for(date, &status, event.source_ts))
            .map(SinkWrite::DailyMetrics)
            .collect()
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.groups.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retraction::PriorContribution;
    use chrono::TimeZone;
    use freshet_core::{ChangeOp, InterventionChangeEvent};
    use std::time::Duration;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn planned_event(id: i64, status: &str, source_ts: DateTime<Utc>) -> InterventionChangeEvent {
        let mut event = InterventionChangeEvent::new(id, ChangeOp::Update, source_ts);
        event.status = Some(InterventionStatus::from(status));
        event.planned_at = Some(ts(8, 0));
        event
    }

    fn apply(
        pipeline: &mut DailyMetricsPipeline,
        event: InterventionChangeEvent,
        prior: Option<PriorContribution>,
    ) -> Vec<SinkWrite> {
        pipeline.apply(&ChangeWithPrior { event, prior }, ts(12, 0))
    }

    fn daily_rows(writes: Vec<SinkWrite>) -> Vec<DailyMetricsRow> {
        writes
            .into_iter()
            .map(|write| match write {
                SinkWrite::DailyMetrics(row) => row,
                other => panic!("unexpected write: {other:?}"),
            })
            .collect()
    }

    fn row_for<'a>(rows: &'a [DailyMetricsRow], status: &str) -> &'a DailyMetricsRow {
        rows.iter()
            .find(|row| row.status.as_str() == status)
            .unwrap_or_else(|| panic!("no row for status {status}"))
    }

    #[test]
    fn create_folds_into_its_group() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let rows = daily_rows(apply(&mut pipeline, planned_event(1, "SCHEDULED", ts(9, 0)), None));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_count, 1);
        assert_eq!(rows[0].avg_completion_seconds, None);
        assert_eq!(rows[0].validation_ratio, None);
        assert_eq!(rows[0].last_refreshed_at, ts(9, 0));
    }

    #[test]
    fn status_change_retracts_before_applying() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let first = planned_event(1, "SCHEDULED", ts(9, 0));
        let prior = PriorContribution::of(&first);
        apply(&mut pipeline, first, None);

        let mut second = planned_event(1, "COMPLETED", ts(9, 30));
        second.started_at = Some(ts(8, 0));
        second.completed_at = Some(ts(9, 30));
        let rows = daily_rows(apply(&mut pipeline, second, Some(prior)));

        // The retracted group re-emits at zero; the new group carries the
        // count and the duration average.
        assert_eq!(row_for(&rows, "SCHEDULED").total_count, 0);
        let completed = row_for(&rows, "COMPLETED");
        assert_eq!(completed.total_count, 1);
        assert_eq!(completed.avg_completion_seconds, Some(5400.0));
    }

    #[test]
    fn validation_ratio_spans_statuses_of_the_day() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        apply(&mut pipeline, planned_event(1, "COMPLETED", ts(9, 0)), None);
        let rows = daily_rows(apply(&mut pipeline, planned_event(2, "VALIDATED", ts(9, 1)), None));

        let validated = row_for(&rows, "VALIDATED");
        assert_eq!(validated.total_count, 1);
        assert_eq!(validated.validation_ratio, Some(50.0));

        // A mutation in a sibling status refreshes the VALIDATED row too.
        let rows = daily_rows(apply(&mut pipeline, planned_event(3, "COMPLETED", ts(9, 2)), None));
        let validated = row_for(&rows, "VALIDATED");
        assert_eq!(validated.validation_ratio, Some(100.0 / 3.0));
    }

    #[test]
    fn ratio_is_null_when_nothing_completed() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let ev = planned_event(1, "VALIDATED", ts(9, 0));
        let prior = PriorContribution::of(&ev);
        apply(&mut pipeline, ev, None);

        // Retract the only completed-family contribution: completed_total
        // drops to zero and the ratio goes null.
        let mut tombstone = InterventionChangeEvent::new(1, ChangeOp::Delete, ts(9, 5));
        tombstone.planned_at = None;
        let rows = daily_rows(pipeline.apply(
            &ChangeWithPrior {
                event: tombstone,
                prior: Some(prior),
            },
            ts(12, 0),
        ));
        let validated = row_for(&rows, "VALIDATED");
        assert_eq!(validated.total_count, 0);
        assert_eq!(validated.validation_ratio, None);
    }

    #[test]
    fn delete_removes_contribution_and_redelete_is_noop() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let ev = planned_event(1, "SCHEDULED", ts(9, 0));
        let prior = PriorContribution::of(&ev);
        apply(&mut pipeline, ev, None);

        let tombstone = InterventionChangeEvent::new(1, ChangeOp::Delete, ts(9, 5));
        let rows = daily_rows(apply(&mut pipeline, tombstone.clone(), Some(prior)));
        assert_eq!(row_for(&rows, "SCHEDULED").total_count, 0);

        // Second delete arrives with no prior: nothing changes, nothing emits.
        let rows = apply(&mut pipeline, tombstone, None);
        assert!(rows.is_empty());
    }

    #[test]
    fn events_without_planned_at_make_no_daily_contribution() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let mut event = InterventionChangeEvent::new(1, ChangeOp::Create, ts(9, 0));
        event.status = Some(InterventionStatus::Scheduled);
        let rows = apply(&mut pipeline, event, None);
        assert!(rows.is_empty());
        assert_eq!(pipeline.tracked_keys(), 0);
    }

    #[test]
    fn date_change_moves_the_contribution() {
        let mut pipeline = DailyMetricsPipeline::new(Duration::from_secs(3600));
        let first = planned_event(1, "SCHEDULED", ts(9, 0));
        let prior = PriorContribution::of(&first);
        apply(&mut pipeline, first, None);

        let mut moved = planned_event(1, "SCHEDULED", ts(9, 30));
        moved.planned_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap());
        let rows = daily_rows(apply(&mut pipeline, moved, Some(prior)));

        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            rows.iter()
                .find(|row| row.metric_date == jan1)
                .map(|row| row.total_count),
            Some(0)
        );
        assert_eq!(
            rows.iter()
                .find(|row| row.metric_date == jan2)
                .map(|row| row.total_count),
            Some(1)
        );
    }
}
