//! Tracing subscriber setup
//!
//! Everything logs to stderr. Search commands own stdout for the wire
//! protocol, so nothing here may write there.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init(format: LogFormat, default_level: tracing::Level) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let result = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init(LogFormat::Text, tracing::Level::INFO);
        assert!(!init(LogFormat::Json, tracing::Level::DEBUG));
    }
}
