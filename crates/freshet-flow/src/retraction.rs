//! The id → last-contribution index that makes retraction explicit.
//!
//! The upstream dataflow engine handled updates and deletes through built-in
//! changelog semantics. Here the router stage records, per entity id, the
//! fields of the last admitted event that contribute to any aggregate. Each
//! fanned-out change then carries that prior snapshot, so every pipeline can
//! subtract the old contribution before adding the new one while still
//! owning its accumulator state exclusively.

use chrono::{DateTime, NaiveDate, Utc};

use freshet_core::{InterventionChangeEvent, InterventionStatus};

use crate::state::StateStore;

/// The contribution-relevant fields of the last admitted event for an id.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorContribution {
    /// Status the entity last carried.
    pub status: Option<InterventionStatus>,
    /// Daily-rollup group day the entity last contributed to.
    pub metric_date: Option<NaiveDate>,
    /// Technician the entity was last assigned to.
    pub technician_id: Option<i64>,
    /// Completion duration the entity last contributed, in seconds.
    pub completion_seconds: Option<i64>,
    /// Completion time, for the completed-today window.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PriorContribution {
    /// Snapshots the contribution-relevant fields of an event.
    #[must_use]
    pub fn of(event: &InterventionChangeEvent) -> Self {
        Self {
            status: event.status.clone(),
            metric_date: event.metric_date(),
            technician_id: event.technician_id,
            completion_seconds: event.completion_seconds(),
            completed_at: event.completed_at,
        }
    }

    /// Returns true when the snapshot carries anything worth retracting.
    #[must_use]
    pub fn is_value_bearing(&self) -> bool {
        self.status.is_some() || self.metric_date.is_some() || self.technician_id.is_some()
    }
}

/// A classified event paired with the prior contribution for its id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeWithPrior {
    /// The admitted event.
    pub event: InterventionChangeEvent,
    /// What the same id last contributed, when known.
    pub prior: Option<PriorContribution>,
}

/// Tracks the last contribution per entity id.
///
/// Entries expire on the same TTL as the accumulator stores; an update or
/// delete arriving for an expired id degrades to a best-effort fresh apply.
#[derive(Debug)]
pub struct RetractionIndex {
    entries: StateStore<i64, PriorContribution>,
}

impl RetractionIndex {
    /// Creates an index whose entries expire after `ttl` of inactivity.
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: StateStore::new(ttl),
        }
    }

    /// Registers an event and returns the prior contribution for its id.
    ///
    /// Non-delete events replace the tracked contribution. Deletes drop the
    /// entry; a value-carrying delete payload doubles as the prior when the
    /// index has none (key-only tombstones for unknown ids return `None`,
    /// and removal stays best-effort).
    pub fn apply(
        &mut self,
        event: &InterventionChangeEvent,
        now: DateTime<Utc>,
    ) -> Option<PriorContribution> {
        if event.is_delete() {
            return self.entries.remove(&event.id).or_else(|| {
                let from_payload = PriorContribution::of(event);
                from_payload.is_value_bearing().then_some(from_payload)
            });
        }
        self.entries.insert(event.id, PriorContribution::of(event), now)
    }

    /// Drops entries idle past the TTL. Returns the evicted count.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.entries.sweep(now)
    }

    /// Number of tracked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no ids are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
