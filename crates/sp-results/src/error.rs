//! Results Reader Errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("JSON error on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
