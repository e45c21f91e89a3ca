//! Typed intervention change events and the classifier that produces them.
//!
//! The classifier turns one raw bus payload into an
//! [`InterventionChangeEvent`] or a [`ClassifyError`]. Missing optional
//! fields map to `None` rather than failing, so sparse tombstones and
//! partial updates flow through. A record is rejected only when it lacks an
//! entity id, a usable source timestamp, or carries an operation code
//! outside the CDC contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::ClassifyError;
use crate::status::{ChangeOp, InterventionStatus};
use crate::timestamp::FlexTimestamp;

/// One parsed change record from the intervention CDC topic.
///
/// Immutable once constructed; one event never mutates another.
#[derive(Debug, Clone, PartialEq)]
pub struct InterventionChangeEvent {
    /// Stable entity key.
    pub id: i64,
    /// Business reference, informational.
    pub reference: Option<String>,
    /// Title, informational.
    pub title: Option<String>,
    /// Description, informational.
    pub description: Option<String>,
    /// Lifecycle status; tombstones carry none.
    pub status: Option<InterventionStatus>,
    /// How the intervention was assigned, informational.
    pub assignment_mode: Option<String>,
    /// When the intervention is planned to happen.
    pub planned_at: Option<DateTime<Utc>>,
    /// When work started.
    pub started_at: Option<DateTime<Utc>>,
    /// When work finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the back office validated the work.
    pub validated_at: Option<DateTime<Utc>>,
    /// Row creation time upstream.
    pub created_at: Option<DateTime<Utc>>,
    /// Last row update time upstream.
    pub updated_at: Option<DateTime<Utc>>,
    /// Assigned technician, if any.
    pub technician_id: Option<i64>,
    /// Intervention site latitude.
    pub latitude: Option<f64>,
    /// Intervention site longitude.
    pub longitude: Option<f64>,
    /// The CDC operation this record describes.
    pub op: ChangeOp,
    /// Source time used as the watermark basis.
    pub source_ts: DateTime<Utc>,
}

impl InterventionChangeEvent {
    /// Creates a minimal event with every optional field unset.
    #[must_use]
    pub fn new(id: i64, op: ChangeOp, source_ts: DateTime<Utc>) -> Self {
        Self {
            id,
            reference: None,
            title: None,
            description: None,
            status: None,
            assignment_mode: None,
            planned_at: None,
            started_at: None,
            completed_at: None,
            validated_at: None,
            created_at: None,
            updated_at: None,
            technician_id: None,
            latitude: None,
            longitude: None,
            op,
            source_ts,
        }
    }

    /// Classifies a raw JSON payload into a typed event.
    ///
    /// # Errors
    ///
    /// Returns a [`ClassifyError`] when the payload is not JSON, has no id,
    /// has no usable source timestamp, or carries an unknown operation code.
    pub fn classify(payload: &[u8]) -> Result<Self, ClassifyError> {
        let raw: RawChangeRecord =
            serde_json::from_slice(payload).map_err(|err| ClassifyError::InvalidPayload {
                message: err.to_string(),
            })?;
        raw.into_event()
    }

    /// Returns the UTC calendar day the daily rollup groups this event
    /// under, derived from `planned_at`.
    #[must_use]
    pub fn metric_date(&self) -> Option<NaiveDate> {
        self.planned_at.map(|ts| ts.date_naive())
    }

    /// Returns `completed_at - started_at` in seconds when both are present.
    #[must_use]
    pub fn completion_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some(completed.signed_duration_since(started).num_seconds())
            }
            _ => None,
        }
    }

    /// Returns true when this record describes an upstream delete.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.op.is_delete()
    }

    /// Returns true when the record carries both coordinates.
    #[must_use]
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Wire shape of one change record. All value fields are optional; the
/// message key (if any) is ignored, value fields are authoritative.
#[derive(Debug, Deserialize)]
struct RawChangeRecord {
    id: Option<i64>,
    reference: Option<String>,
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    assignment_mode: Option<String>,
    planned_at: Option<FlexTimestamp>,
    started_at: Option<FlexTimestamp>,
    completed_at: Option<FlexTimestamp>,
    validated_at: Option<FlexTimestamp>,
    created_at: Option<FlexTimestamp>,
    updated_at: Option<FlexTimestamp>,
    technician_id: Option<i64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    op: Option<String>,
    #[serde(alias = "source_ts")]
    source_ts_ms: Option<FlexTimestamp>,
}

impl RawChangeRecord {
    fn into_event(self) -> Result<InterventionChangeEvent, ClassifyError> {
        let id = self.id.ok_or(ClassifyError::MissingId)?;

        let op = match self.op.as_deref() {
            None => ChangeOp::Update,
            Some(code) => ChangeOp::parse(code).ok_or_else(|| ClassifyError::UnknownOperation {
                op: code.to_string(),
            })?,
        };

        // Watermark basis: the connector's source clock, falling back to the
        // row's own modification times for producers that omit it.
        let source_ts = self
            .source_ts_ms
            .or(self.updated_at)
            .or(self.created_at)
            .map(FlexTimestamp::into_inner)
            .ok_or(ClassifyError::MissingSourceTimestamp)?;

        Ok(InterventionChangeEvent {
            id,
            reference: self.reference,
            title: self.title,
            description: self.description,
            status: self.status.map(InterventionStatus::from),
            assignment_mode: self.assignment_mode,
            planned_at: self.planned_at.map(FlexTimestamp::into_inner),
            started_at: self.started_at.map(FlexTimestamp::into_inner),
            completed_at: self.completed_at.map(FlexTimestamp::into_inner),
            validated_at: self.validated_at.map(FlexTimestamp::into_inner),
            created_at: self.created_at.map(FlexTimestamp::into_inner),
            updated_at: self.updated_at.map(FlexTimestamp::into_inner),
            technician_id: self.technician_id,
            latitude: self.latitude,
            longitude: self.longitude,
            op,
            source_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn classify(json: &str) -> Result<InterventionChangeEvent, ClassifyError> {
        InterventionChangeEvent::classify(json.as_bytes())
    }

    #[test]
    fn full_record_classifies() {
        let event = classify(
            r#"{
                "id": 42,
                "reference": "INT-0042",
                "title": "Replace meter",
                "status": "IN_PROGRESS",
                "assignment_mode": "MANUAL",
                "planned_at": "2024-01-01T08:00:00Z",
                "started_at": "2024-01-01T08:05:00Z",
                "technician_id": 7,
                "latitude": 48.8566,
                "longitude": 2.3522,
                "op": "u",
                "source_ts_ms": 1704096300000
            }"#,
        )
        .expect("record should classify");

        assert_eq!(event.id, 42);
        assert_eq!(event.status, Some(InterventionStatus::InProgress));
        assert_eq!(event.technician_id, Some(7));
        assert_eq!(event.op, ChangeOp::Update);
        assert_eq!(
            event.source_ts,
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap()
        );
        assert_eq!(
            event.metric_date(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert!(event.has_coordinates());
    }

    #[test]
    fn missing_optionals_map_to_none() {
        let event = classify(r#"{"id": 1, "op": "c", "source_ts_ms": 1704096000000}"#)
            .expect("sparse record should classify");
        assert_eq!(event.status, None);
        assert_eq!(event.technician_id, None);
        assert_eq!(event.planned_at, None);
        assert_eq!(event.metric_date(), None);
        assert!(!event.has_coordinates());
    }

    #[test]
    fn absent_op_is_update_equivalent() {
        let event = classify(r#"{"id": 1, "source_ts_ms": 1704096000000}"#)
            .expect("record without op should classify");
        assert_eq!(event.op, ChangeOp::Update);
        assert!(!event.is_delete());
    }

    #[test]
    fn tombstone_delete_classifies_with_id_only() {
        let event = classify(r#"{"id": 9, "op": "d", "source_ts": 1704096000000}"#)
            .expect("key-only tombstone should classify");
        assert!(event.is_delete());
        assert_eq!(event.status, None);
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = classify(r#"{"op": "c", "source_ts_ms": 1704096000000}"#)
            .expect_err("record without id must fail");
        assert!(matches!(err, ClassifyError::MissingId));
    }

    #[test]
    fn source_ts_falls_back_to_row_times() {
        let event = classify(r#"{"id": 1, "updated_at": "2024-01-01T10:00:00Z"}"#)
            .expect("updated_at should back the watermark");
        assert_eq!(
            event.source_ts,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );

        let err = classify(r#"{"id": 1}"#).expect_err("no timestamp at all must fail");
        assert!(matches!(err, ClassifyError::MissingSourceTimestamp));
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = classify(r#"{"id": 1, "op": "merge", "source_ts_ms": 1704096000000}"#)
            .expect_err("unknown op must fail");
        assert!(matches!(err, ClassifyError::UnknownOperation { .. }));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = classify("not json").expect_err("garbage must fail");
        assert!(matches!(err, ClassifyError::InvalidPayload { .. }));
    }

    #[test]
    fn completion_seconds_requires_both_bounds() {
        let mut event = InterventionChangeEvent::new(
            1,
            ChangeOp::Update,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        );
        assert_eq!(event.completion_seconds(), None);

        event.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        assert_eq!(event.completion_seconds(), None);

        event.completed_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap());
        assert_eq!(event.completion_seconds(), Some(5400));
    }
}
