//! Flexible timestamp decoding for CDC payloads.
//!
//! Connectors are inconsistent about temporal encoding: Debezium emits epoch
//! milliseconds, hand-rolled producers and replay fixtures emit RFC 3339
//! text. [`FlexTimestamp`] accepts both so the classifier does not have to
//! care which connector produced the record.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// A UTC timestamp decoded from either epoch milliseconds or RFC 3339 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlexTimestamp(pub DateTime<Utc>);

impl FlexTimestamp {
    /// Returns the decoded instant.
    #[must_use]
    pub const fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    fn from_text(value: &str) -> Option<Self> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
            return Some(Self(ts.with_timezone(&Utc)));
        }
        // Naive timestamps (no offset) are taken as UTC, matching the
        // upstream job's AT TIME ZONE 'UTC' convention.
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(Self(naive.and_utc()));
            }
        }
        None
    }
}

impl From<DateTime<Utc>> for FlexTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for FlexTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlexTimestampVisitor)
    }
}

struct FlexTimestampVisitor;

impl Visitor<'_> for FlexTimestampVisitor {
    type Value = FlexTimestamp;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("epoch milliseconds or an RFC 3339 timestamp")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        FlexTimestamp::from_epoch_millis(value)
            .ok_or_else(|| E::custom(format!("epoch milliseconds out of range: {value}")))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        let millis = i64::try_from(value)
            .map_err(|_| E::custom(format!("epoch milliseconds out of range: {value}")))?;
        self.visit_i64(millis)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        if !value.is_finite() {
            return Err(E::custom("epoch milliseconds must be finite"));
        }
        self.visit_i64(value as i64)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        FlexTimestamp::from_text(value)
            .ok_or_else(|| E::custom(format!("unrecognized timestamp format: {value}")))
    }
}
