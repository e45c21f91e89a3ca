//! Intervention lifecycle status and CDC operation kinds.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an intervention.
///
/// The upstream system uses SCREAMING_SNAKE_CASE strings and allows free
/// text; unknown values are preserved verbatim in [`Self::Other`] so that
/// grouping keys survive round trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InterventionStatus {
    /// The intervention is planned but not yet started.
    Scheduled,
    /// A technician is currently working the intervention.
    InProgress,
    /// Work is finished but not yet validated.
    Completed,
    /// Work is finished and validated by the back office.
    Validated,
    /// Any other status string, preserved as-is.
    Other(String),
}

impl InterventionStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Validated => "VALIDATED",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns true for statuses that count toward a technician's open load.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress)
    }

    /// Returns true for statuses that count as finished work
    /// (COMPLETED or VALIDATED).
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::Validated)
    }

    /// Returns true for the VALIDATED status.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated)
    }
}

impl From<String> for InterventionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SCHEDULED" => Self::Scheduled,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "VALIDATED" => Self::Validated,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for InterventionStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<InterventionStatus> for String {
    fn from(value: InterventionStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for InterventionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CDC operation kind attached to a change record.
///
/// Debezium-style single-letter codes are the wire format; long forms are
/// accepted for robustness. A record with no `op` field classifies as
/// [`Self::Update`] (create/update-equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// A new row was inserted upstream (`c`).
    Create,
    /// An existing row was updated upstream (`u`).
    Update,
    /// The row was deleted upstream (`d`).
    Delete,
    /// An initial-snapshot read of an existing row (`r`).
    Snapshot,
}

impl ChangeOp {
    /// Parses a wire operation code.
    ///
    /// Returns `None` for codes that are not part of the CDC contract.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "c" | "create" => Some(Self::Create),
            "u" | "update" => Some(Self::Update),
            "d" | "delete" => Some(Self::Delete),
            "r" | "read" | "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Returns true for delete operations.
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }

    /// Returns the long-form name, used in logs and metric labels.
    #[must_use]
    pub const fn as_name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Snapshot => "snapshot",
        }
    }
}
