//! Per-invocation command state: options, search info, messages and the service handle

use sp_client::Service;
use tracing::{debug, error, info, warn};

use crate::error::{CommandError, Result};
use crate::options::Arguments;
use crate::search_info::SearchInfo;
use crate::validators::OptionValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl MessageLevel {
    /// Level name in chunked inspector messages
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Info => "INFO",
            MessageLevel::Warning => "WARN",
            MessageLevel::Error => "ERROR",
        }
    }

    /// Header key in legacy protocol output
    pub fn v1_key(&self) -> &'static str {
        match self {
            MessageLevel::Debug => "debug_message",
            MessageLevel::Info => "info_message",
            MessageLevel::Warning => "warn_message",
            MessageLevel::Error => "error_message",
        }
    }
}

/// What a running command can see: the invoking search, its parsed
/// arguments, and a channel for messages shown to the search user.
#[derive(Debug, Default)]
pub struct CommandContext {
    search_info: SearchInfo,
    arguments: Arguments,
    messages: Vec<(MessageLevel, String)>,
}

impl CommandContext {
    pub fn new(search_info: SearchInfo) -> Self {
        Self {
            search_info,
            ..Self::default()
        }
    }

    pub fn search_info(&self) -> &SearchInfo {
        &self.search_info
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub(crate) fn set_arguments(&mut self, arguments: Arguments) {
        self.arguments = arguments;
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.arguments.get(name)
    }

    pub fn option_bool(&self, name: &str) -> bool {
        self.option(name).and_then(OptionValue::as_bool).unwrap_or(false)
    }

    pub fn option_int(&self, name: &str) -> Option<i64> {
        self.option(name).and_then(OptionValue::as_int)
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_str)
    }

    pub fn fieldnames(&self) -> &[String] {
        &self.arguments.fieldnames
    }

    pub fn write_debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "Command message");
        self.messages.push((MessageLevel::Debug, message));
    }

    pub fn write_info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "Command message");
        self.messages.push((MessageLevel::Info, message));
    }

    pub fn write_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "Command message");
        self.messages.push((MessageLevel::Warning, message));
    }

    pub fn write_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(%message, "Command message");
        self.messages.push((MessageLevel::Error, message));
    }

    /// Messages written since the last call
    pub fn take_messages(&mut self) -> Vec<(MessageLevel, String)> {
        std::mem::take(&mut self.messages)
    }

    /// Client for the service that runs the search, authenticated with
    /// the search's session key.
    pub fn service(&self) -> Result<Service> {
        let uri = self
            .search_info
            .splunkd_uri
            .as_deref()
            .ok_or_else(|| CommandError::command("Search info carries no splunkd_uri"))?;
        let session_key = self
            .search_info
            .session_key
            .as_deref()
            .ok_or_else(|| CommandError::command("Search info carries no session_key"))?;
        Ok(Service::from_session(uri, session_key, self.search_info.namespace())?)
    }
}
