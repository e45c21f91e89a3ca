//! Stream-progress tracking with bounded out-of-order tolerance.
//!
//! The watermark is the engine's claim that no event with a source time
//! earlier than it will be considered. It trails the maximum source time
//! seen by the allowed-lateness bound, and it never retreats. When the
//! source goes quiet, [`WatermarkTracker::advance_idle`] collapses the
//! lateness allowance so downstream views are not starved by a silent bus.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Tracks the stream watermark from observed event source times.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    lateness: ChronoDuration,
    max_source_ts: Option<DateTime<Utc>>,
    idle_floor: Option<DateTime<Utc>>,
}

impl WatermarkTracker {
    /// Creates a tracker with the given allowed-lateness bound.
    #[must_use]
    pub fn new(lateness: std::time::Duration) -> Self {
        Self {
            lateness: ChronoDuration::from_std(lateness).unwrap_or(ChronoDuration::MAX),
            max_source_ts: None,
            idle_floor: None,
        }
    }

    /// Records the source time of an admitted event.
    pub fn observe(&mut self, source_ts: DateTime<Utc>) {
        self.max_source_ts = Some(match self.max_source_ts {
            Some(current) => current.max(source_ts),
            None => source_ts,
        });
    }

    /// The current watermark, if any events have been observed.
    #[must_use]
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        let trailing = self
            .max_source_ts
            .and_then(|max| max.checked_sub_signed(self.lateness));
        match (trailing, self.idle_floor) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns true when an event with this source time is too late to be
    /// aggregated.
    #[must_use]
    pub fn is_late(&self, source_ts: DateTime<Utc>) -> bool {
        self.watermark().is_some_and(|w| source_ts < w)
    }

    /// Advances the watermark to the maximum source time seen, for use when
    /// the source has been idle past its timeout. Returns true when the
    /// watermark actually moved.
    pub fn advance_idle(&mut self) -> bool {
        let Some(max) = self.max_source_ts else {
            return false;
        };
        if self.idle_floor.is_some_and(|floor| floor >= max) {
            return false;
        }
        self.idle_floor = Some(max);
        true
    }
}
