//! Error types for the Kestrel core crate.
//!
//! Framework-level errors live in `kestrel-framework`; this module only holds
//! the errors produced by the model, the identifier type and the session
//! capability.

use thiserror::Error;

// =============================================================================
// Identifier Errors
// =============================================================================

/// Returned when an [`Identifier`](crate::Identifier) fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The namespace does not match `[a-z0-9-]{1,32}`.
    #[error("invalid identifier namespace: {0:?}")]
    InvalidNamespace(String),

    /// The id does not match `[a-z0-9-]{1,32}(/[a-z0-9-]{1,32})*`.
    #[error("invalid identifier id: {0:?}")]
    InvalidId(String),

    /// The string has no `namespace:id` separator.
    #[error("malformed identifier {0:?}, expected `namespace:id`")]
    Malformed(String),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Returned by [`CommandSchema::validate`](crate::command::CommandSchema::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A command or option name is not `[a-z0-9-]{1,32}`.
    #[error("invalid name {name:?} at `{path}`")]
    InvalidName {
        /// Path of the offending node.
        path: String,
        /// The rejected name.
        name: String,
    },

    /// Description is empty or longer than the platform limit.
    #[error("description at `{path}` must be 1..={max} characters")]
    InvalidDescription {
        /// Path of the offending node.
        path: String,
        /// Maximum allowed length.
        max: usize,
    },

    /// Too many options on a single node.
    #[error("`{path}` declares {count} options, at most {max} are allowed")]
    TooManyOptions {
        /// Path of the offending node.
        path: String,
        /// Number of declared options.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Two sibling options share a name.
    #[error("duplicate option {name:?} at `{path}`")]
    DuplicateOption {
        /// Path of the parent node.
        path: String,
        /// The repeated name.
        name: String,
    },

    /// A required option follows an optional one.
    #[error("required option {name:?} follows an optional option at `{path}`")]
    RequiredAfterOptional {
        /// Path of the parent node.
        path: String,
        /// The misplaced option.
        name: String,
    },

    /// Structural nesting rule violated (e.g. a group inside a subcommand).
    #[error("invalid nesting at `{path}`: {reason}")]
    InvalidNesting {
        /// Path of the offending node.
        path: String,
        /// What went wrong.
        reason: &'static str,
    },
}

// =============================================================================
// Option Errors
// =============================================================================

/// Returned when extracting a value from interaction options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// No option with this name was supplied.
    #[error("option {0:?} not found")]
    NotFound(String),

    /// The option exists but carries a different kind of value.
    #[error("option {name:?} has unexpected type: expected {expected}, got {got}")]
    UnexpectedType {
        /// Option name.
        name: String,
        /// Expected kind.
        expected: &'static str,
        /// Actual kind.
        got: &'static str,
    },
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors returned by a [`Session`](crate::Session) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// An initial response was already sent for this interaction.
    #[error("interaction {0} has already been acknowledged")]
    AlreadyAcknowledged(String),

    /// The interaction has no response yet (or is unknown to the platform).
    #[error("unknown interaction or no response sent: {0}")]
    UnknownInteraction(String),

    /// The addressed resource does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of resource.
        kind: &'static str,
        /// Its id.
        id: String,
    },

    /// The bot lacks permission for the operation.
    #[error("missing permissions: {0}")]
    Forbidden(String),

    /// The request was rejected as invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure reported by the platform client.
    #[error("platform request failed: {0}")]
    Request(String),
}

impl SessionError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a generic request failure.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Returns `true` if this error means an initial response already exists.
    pub fn is_already_acknowledged(&self) -> bool {
        matches!(self, Self::AlreadyAcknowledged(_))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for option extraction.
pub type OptionResult<T> = Result<T, OptionError>;
