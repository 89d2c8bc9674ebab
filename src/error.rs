//! Error types shared across the integrity pipeline.

use thiserror::Error;

/// Failure reported by a backing store (identities, whitelist, cache, audit).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error returned from [`crate::IntegrityAgent::check_status`].
///
/// Only failures central to the identity or the decision end up here.
/// Cache, reputation and audit failures are logged and swallowed.
#[derive(Debug, Error)]
pub enum CheckStatusError {
    /// A required request parameter was absent or blank.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// `rooted_device` was present but not a boolean.
    #[error("rooted_device parameter must be a boolean (true or false)")]
    InvalidRootedDevice,

    /// The identity could not be created because it failed validation.
    #[error("identity validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// A concurrent creation won the race and its record could not be read back.
    #[error("Identifier {0} is already being created")]
    Conflict(String),

    /// Anything else; details are logged, never shown to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckStatusError {
    /// Messages suitable for the `errors` array of an error response.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CheckStatusError::Validation(messages) => messages.clone(),
            CheckStatusError::Internal(_) => vec!["Internal server error".to_string()],
            other => vec![other.to_string()],
        }
    }
}
