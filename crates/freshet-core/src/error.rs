//! Error types and result aliases shared across Freshet components.

/// The result type used throughout freshet-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was missing or could not be parsed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Reasons a raw change record fails classification.
///
/// Classification failures are per-record: the caller counts and logs them
/// and keeps consuming the stream.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The payload was not valid JSON.
    #[error("payload is not valid JSON: {message}")]
    InvalidPayload {
        /// Parser description of what was wrong.
        message: String,
    },

    /// The record carries no entity id.
    #[error("change record is missing the entity id")]
    MissingId,

    /// None of `source_ts_ms`, `updated_at`, `created_at` were present, so
    /// the record cannot participate in watermarking.
    #[error("change record carries no usable source timestamp")]
    MissingSourceTimestamp,

    /// The operation code was present but not one of the known CDC codes.
    #[error("unrecognized operation code: {op}")]
    UnknownOperation {
        /// The code as it appeared on the wire.
        op: String,
    },
}
