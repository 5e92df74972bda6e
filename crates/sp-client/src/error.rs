//! Client Error Types

use sp_binding::BindingError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Found multiple entities named '{name}'; specify a namespace")]
    AmbiguousReference { name: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Incomplete response: {message}")]
    IncompleteResponse { message: String },

    #[error("Timed out after {elapsed:?} waiting for job {sid}")]
    Timeout { sid: String, elapsed: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::IncompleteResponse { message: message.into() }
    }

    /// HTTP status of the underlying failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Binding(e) => e.status(),
            ClientError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
