//! Error types for the Kestrel framework.

use thiserror::Error;
use tower::BoxError;

use kestrel_core::{OptionError, SessionError};

/// Result of every pipeline stage.
///
/// Domain errors are any boxed error; the framework's own failures are
/// [`FrameworkError`].
pub type EventResult = Result<(), BoxError>;

/// Failures raised by the framework itself.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// A guild-only guard saw an event without a guild scope.
    #[error("event `{event}` has no guild scope")]
    MissingGuild {
        /// Name of the event kind.
        event: &'static str,
    },

    /// A handler asked for a context value nobody injected.
    #[error("context value `{key}` was not injected")]
    MissingContextValue {
        /// Canonical key of the missing value.
        key: String,
    },

    /// The dispatch deadline passed before the pipeline finished.
    #[error("pipeline exceeded its {timeout_ms}ms deadline")]
    DeadlineExceeded {
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The pipeline was cancelled from outside.
    #[error("pipeline cancelled")]
    Cancelled,

    /// Extracting an interaction option failed.
    #[error(transparent)]
    Option(#[from] OptionError),

    /// A session call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl FrameworkError {
    /// Creates a missing-context-value error.
    pub fn missing_value(key: impl Into<String>) -> Self {
        Self::MissingContextValue { key: key.into() }
    }
}

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
