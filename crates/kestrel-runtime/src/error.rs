//! Runtime error types.

use thiserror::Error;

use kestrel_core::{SchemaError, SessionError};

use crate::config::ConfigError;

/// Errors that can occur while building or running the gateway.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The runtime was built without a session.
    #[error("No session configured; call RuntimeBuilder::session")]
    MissingSession,

    /// A module declared an invalid command.
    #[error("Module '{module}' declared an invalid command: {source}")]
    InvalidCommand {
        module: String,
        #[source]
        source: SchemaError,
    },

    /// Platform call failed during startup or shutdown.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Reading from the event source failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn invalid_command(module: impl Into<String>, source: SchemaError) -> Self {
        Self::InvalidCommand {
            module: module.into(),
            source,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
