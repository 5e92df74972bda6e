//! Search Command Errors

use sp_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Bad command line: syntax, unknown/duplicate/missing option or an
    /// invalid option value
    #[error("{0}")]
    Option(String),

    /// Raised by command code
    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl CommandError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn option(message: impl Into<String>) -> Self {
        Self::Option(message.into())
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
