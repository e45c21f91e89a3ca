//! Retraction correctness: folding an event sequence in arrival order must
//! leave the accumulators exactly where a batch recompute over the surviving
//! entities would put them.
//!
//! The pipelines are driven directly (no async runtime) through the same
//! retraction index the engine's router uses, and compared against a naive
//! oracle that recomputes every aggregate from the latest surviving event
//! per id.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use freshet_core::{ChangeOp, InterventionChangeEvent, InterventionStatus};
use freshet_flow::pipeline::{
    DailyMetricsPipeline, Pipeline, TechnicianLoadPipeline,
};
use freshet_flow::retraction::{ChangeWithPrior, RetractionIndex};
use freshet_flow::rows::{DailyMetricsRow, SinkWrite, TechnicianLoadRow};
use std::time::Duration;

const STATUSES: [&str; 5] = [
    "SCHEDULED",
    "IN_PROGRESS",
    "COMPLETED",
    "VALIDATED",
    "ON_HOLD",
];

#[derive(Debug, Clone)]
struct EventSeed {
    id: i64,
    delete: bool,
    status: usize,
    technician: Option<i64>,
    planned_day: Option<u32>,
    with_duration: bool,
}

fn event_seed() -> impl Strategy<Value = EventSeed> {
    (
        1_i64..=6,
        prop::bool::weighted(0.2),
        0_usize..STATUSES.len(),
        prop::option::of(1_i64..=4),
        prop::option::of(1_u32..=3),
        prop::bool::weighted(0.4),
    )
        .prop_map(
            |(id, delete, status, technician, planned_day, with_duration)| EventSeed {
                id,
                delete,
                status,
                technician,
                planned_day,
                with_duration,
            },
        )
}

fn ts(seq: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap() + chrono::Duration::seconds(seq as i64)
}

fn materialize(seed: &EventSeed, seq: usize) -> InterventionChangeEvent {
    let op = if seed.delete {
        ChangeOp::Delete
    } else {
        ChangeOp::Update
    };
    let mut event = InterventionChangeEvent::new(seed.id, op, ts(seq));
    if !seed.delete {
        event.status = Some(InterventionStatus::from(STATUSES[seed.status]));
        event.technician_id = seed.technician;
        event.planned_at = seed
            .planned_day
            .map(|day| Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap());
        if seed.with_duration {
            event.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap());
            event.completed_at = Some(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap());
        }
    }
    event
}

#[derive(Debug, Default, Clone, PartialEq)]
struct GroupOracle {
    count: i64,
    duration_sum: i64,
    duration_count: i64,
}

impl GroupOracle {
    #[allow(clippy::cast_precision_loss)]
    fn avg(&self) -> Option<f64> {
        if self.duration_count > 0 {
            Some(self.duration_sum as f64 / self.duration_count as f64)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Oracle {
    daily: HashMap<(NaiveDate, String), GroupOracle>,
    open_by_technician: HashMap<i64, i64>,
    durations_by_technician: HashMap<i64, GroupOracle>,
}

/// Recomputes every aggregate from scratch over the surviving entities.
fn recompute(events: &[InterventionChangeEvent]) -> Oracle {
    let mut survivors: HashMap<i64, &InterventionChangeEvent> = HashMap::new();
    for event in events {
        if event.is_delete() {
            survivors.remove(&event.id);
        } else {
            survivors.insert(event.id, event);
        }
    }

    let mut oracle = Oracle::default();
    for event in survivors.values() {
        if let (Some(date), Some(status)) = (event.metric_date(), event.status.as_ref()) {
            let group = oracle
                .daily
                .entry((date, status.as_str().to_string()))
                .or_default();
            group.count += 1;
            if let Some(secs) = event.completion_seconds() {
                group.duration_sum += secs;
                group.duration_count += 1;
            }
        }
        if let Some(technician) = event.technician_id {
            if event.status.as_ref().is_some_and(InterventionStatus::is_open) {
                *oracle.open_by_technician.entry(technician).or_default() += 1;
            }
            if let Some(secs) = event.completion_seconds() {
                let group = oracle.durations_by_technician.entry(technician).or_default();
                group.duration_sum += secs;
                group.duration_count += 1;
            }
        }
    }
    oracle
}

struct FoldOutcome {
    daily_rows: HashMap<(NaiveDate, String), DailyMetricsRow>,
    technician_rows: HashMap<i64, TechnicianLoadRow>,
}

/// Folds the sequence incrementally, keeping the last emitted row per key.
fn fold(events: &[InterventionChangeEvent]) -> FoldOutcome {
    let ttl = Duration::from_secs(24 * 3600);
    let mut index = RetractionIndex::new(ttl);
    let mut daily = DailyMetricsPipeline::new(ttl);
    let mut technician = TechnicianLoadPipeline::new(ttl);

    let mut outcome = FoldOutcome {
        daily_rows: HashMap::new(),
        technician_rows: HashMap::new(),
    };

    for event in events {
        let prior = index.apply(event, event.source_ts);
        let change = ChangeWithPrior {
            event: event.clone(),
            prior,
        };
        for write in daily
            .apply(&change, event.source_ts)
            .into_iter()
            .chain(technician.apply(&change, event.source_ts))
        {
            match write {
                SinkWrite::DailyMetrics(row) => {
                    outcome
                        .daily_rows
                        .insert((row.metric_date, row.status.as_str().to_string()), row);
                }
                SinkWrite::TechnicianLoad(row) => {
                    outcome.technician_rows.insert(row.technician_id, row);
                }
                other => panic!("unexpected write: {other:?}"),
            }
        }
    }
    outcome
}

fn assert_close(left: Option<f64>, right: Option<f64>, context: &str) {
    match (left, right) {
        (None, None) => {}
        (Some(a), Some(b)) => {
            assert!((a - b).abs() < 1e-9, "{context}: {a} != {b}");
        }
        (a, b) => panic!("{context}: {a:?} != {b:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn incremental_fold_matches_batch_recompute(seeds in prop::collection::vec(event_seed(), 0..40)) {
        let events: Vec<InterventionChangeEvent> = seeds
            .iter()
            .enumerate()
            .map(|(seq, seed)| materialize(seed, seq))
            .collect();

        let oracle = recompute(&events);
        let outcome = fold(&events);

        // Every surviving group matches the batch recompute exactly.
        for (key, expected) in &oracle.daily {
            let row = outcome
                .daily_rows
                .get(key)
                .unwrap_or_else(|| panic!("missing daily row for {key:?}"));
            prop_assert_eq!(row.total_count, expected.count, "count for {:?}", key);
            assert_close(
                row.avg_completion_seconds,
                expected.avg(),
                &format!("daily avg for {key:?}"),
            );
        }
        // Groups the oracle no longer has were fully retracted to zero.
        for (key, row) in &outcome.daily_rows {
            if !oracle.daily.contains_key(key) {
                prop_assert_eq!(row.total_count, 0, "stale daily row for {:?}", key);
                prop_assert_eq!(row.avg_completion_seconds, None);
            }
        }

        for (technician, row) in &outcome.technician_rows {
            let expected_open = oracle.open_by_technician.get(technician).copied().unwrap_or(0);
            prop_assert_eq!(
                row.open_count,
                expected_open,
                "open count for technician {}",
                technician
            );
            let expected_avg = oracle
                .durations_by_technician
                .get(technician)
                .and_then(GroupOracle::avg);
            assert_close(
                row.avg_completion_seconds,
                expected_avg,
                &format!("technician avg for {technician}"),
            );
        }
        // No live technician aggregate is missing from the fold output.
        for (technician, open) in &oracle.open_by_technician {
            if *open > 0 {
                prop_assert!(
                    outcome.technician_rows.contains_key(technician),
                    "missing technician row for {}",
                    technician
                );
            }
        }
    }
}
