//! Binding Error Types

use std::fmt;
use thiserror::Error;

/// A non-2xx reply from the service.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: u16,
    pub reason: String,
    /// First message extracted from the XML or JSON error body
    pub message: Option<String>,
    pub body: String,
}

impl HttpError {
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = extract_message(&body);
        Self {
            status,
            reason: reason.into(),
            message,
            body,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status, self.reason)?;
        if let Some(message) = &self.message {
            write!(f, " -- {}", message)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("{0}")]
    Http(HttpError),

    #[error("Authentication failed: {0}")]
    Authentication(HttpError),

    #[error("Login response did not contain a session key")]
    MissingSessionKey,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl BindingError {
    /// HTTP status of the failed reply, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            BindingError::Http(e) | BindingError::Authentication(e) => Some(e.status),
            BindingError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Transport failures and 5xx replies are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            BindingError::Transport(_) => true,
            BindingError::Http(e) => e.status >= 500,
            _ => false,
        }
    }
}

impl From<quick_xml::Error> for BindingError {
    fn from(e: quick_xml::Error) -> Self {
        BindingError::Xml(e.to_string())
    }
}

/// Pull the first human-readable message out of an error body.
///
/// XML bodies look like `<response><messages><msg type="ERROR">..</msg>`;
/// JSON bodies like `{"messages":[{"type":"ERROR","text":".."}]}`.
fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        return value["messages"][0]["text"].as_str().map(str::to_string);
    }
    if trimmed.starts_with('<') {
        let root = crate::xml::parse(trimmed.as_bytes()).ok()?;
        return root.find("msg").map(|msg| msg.text().to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_xml_body() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <messages>
    <msg type="ERROR">Unknown search command 'foo'.</msg>
  </messages>
</response>"#;
        let err = HttpError::new(400, "Bad Request", body);
        assert_eq!(err.message.as_deref(), Some("Unknown search command 'foo'."));
        assert_eq!(err.to_string(), "HTTP 400 Bad Request -- Unknown search command 'foo'.");
    }

    #[test]
    fn test_message_from_json_body() {
        let body = r#"{"messages":[{"type":"ERROR","text":"Collection not found"}]}"#;
        let err = HttpError::new(404, "Not Found", body);
        assert_eq!(err.message.as_deref(), Some("Collection not found"));
    }

    #[test]
    fn test_plain_body_has_no_message() {
        let err = HttpError::new(502, "Bad Gateway", "upstream down");
        assert!(err.message.is_none());
        assert_eq!(err.to_string(), "HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_retryable() {
        assert!(BindingError::Http(HttpError::new(503, "Service Unavailable", "")).is_retryable());
        assert!(!BindingError::Http(HttpError::new(404, "Not Found", "")).is_retryable());
        assert!(!BindingError::Authentication(HttpError::new(401, "Unauthorized", "")).is_retryable());
        assert!(BindingError::Http(HttpError::new(404, "Not Found", "")).is_not_found());
    }
}
