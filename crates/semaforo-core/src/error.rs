//! Domain error types for the Semáforo core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad input that the user can fix (missing answer, unknown option, malformed DTO).
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A transition that is not allowed from the current flow state.
    #[error("Flow error: {message}")]
    Flow { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    pub fn flow(message: impl Into<String>) -> Self {
        CoreError::Flow {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound {
            message: message.into(),
        }
    }

    /// True for errors the user resolves by changing input rather than retrying.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CoreError::Validation { .. } | CoreError::Flow { .. })
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Failures of the external scoring collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scoring is not configured: {0}")]
    Config(String),
    #[error("scoring transport failed: {0}")]
    Transport(String),
    #[error("scoring service returned an empty response")]
    EmptyResponse,
    #[error("could not interpret scoring response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
