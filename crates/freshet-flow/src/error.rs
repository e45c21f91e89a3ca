//! Error types for the aggregation engine.
//!
//! Per-record problems (malformed payloads, late events, retraction index
//! misses) are not errors at this level: the engine counts and logs them and
//! keeps going. The variants here cover the failures that can stop a stage.

/// The result type used throughout freshet-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The event source failed irrecoverably.
    #[error("source error: {message}")]
    Source {
        /// Description of the source failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A sink write failed (after retries, for the retrying decorator).
    #[error("sink error: {message}")]
    Sink {
        /// Description of the sink failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A row or payload could not be serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal channel closed while the engine still needed it.
    #[error("stage channel closed: {stage}")]
    ChannelClosed {
        /// The stage whose channel went away.
        stage: &'static str,
    },

    /// An engine task failed in a way that should not happen in normal
    /// operation (panic or cancellation).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An error from freshet-core.
    #[error("core error: {0}")]
    Core(#[from] freshet_core::Error),
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new source error with a cause.
    #[must_use]
    pub fn source_failure(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Source {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new sink error.
    #[must_use]
    pub fn sink_failure(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new sink error with a cause.
    #[must_use]
    pub fn sink_failure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Sink {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
