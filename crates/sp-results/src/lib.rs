//! Search Results Readers
//!
//! Turn a results body (job results, previews, oneshot or export output)
//! into a stream of records and server messages:
//! - ResultsReader: `output_mode=xml`, including concatenated export documents
//! - JsonResultsReader: `output_mode=json`, one JSON document per line

pub mod error;
pub mod json;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::ResultsError;
pub use json::JsonResultsReader;
pub use sp_common::{FieldValue, Record};
pub use xml::ResultsReader;

pub type Result<T> = std::result::Result<T, ResultsError>;

/// A message the server attached to the results (`DEBUG`, `INFO`, `WARN`,
/// `ERROR`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Message {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.text)
    }
}

/// One item of a results stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultItem {
    Result(Record),
    Message(Message),
}

impl ResultItem {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ResultItem::Result(record) => Some(record),
            ResultItem::Message(_) => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            ResultItem::Result(record) => Some(record),
            ResultItem::Message(_) => None,
        }
    }
}
