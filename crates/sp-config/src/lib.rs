//! Connection configuration
//!
//! Settings come from, in increasing precedence:
//! - built-in defaults
//! - a TOML file or a `.splunkrc` file (`key=value` lines)
//! - `SPLUNK_*` environment variables

use serde::{Deserialize, Serialize};
use sp_common::{Namespace, Sharing};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_SCHEME: &str = "https";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything needed to open a connection to the service's management port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Session key, with or without the `Splunk ` prefix
    pub token: Option<String>,
    pub bearer_token: Option<String>,
    /// Send HTTP basic credentials instead of logging in
    pub basic: bool,
    pub owner: Option<String>,
    pub app: Option<String>,
    pub sharing: Option<Sharing>,
    pub autologin: bool,
    /// Extra attempts after a transport error or 5xx reply
    pub retries: u32,
    /// Seconds to sleep between attempts
    pub retry_delay: u64,
    /// Verify the server's TLS certificate
    pub verify: bool,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
    /// Preset `Cookie` header value
    pub cookie: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            token: None,
            bearer_token: None,
            basic: false,
            owner: None,
            app: None,
            sharing: None,
            autologin: false,
            retries: 0,
            retry_delay: 10,
            verify: false,
            timeout: None,
            cookie: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse `.splunkrc` content on top of the defaults.
    pub fn from_splunkrc_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!(line = %line, "Skipping .splunkrc line without '='");
                continue;
            };
            config.set(key.trim(), value.trim())?;
        }
        Ok(config)
    }

    pub fn from_splunkrc_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read(path.as_ref())?;
        Self::from_splunkrc_str(&content)
    }

    /// `~/.splunkrc` if it exists, else the defaults, then the environment.
    pub fn load_default() -> Result<Self> {
        let mut config = match dirs::home_dir().map(|home| home.join(".splunkrc")) {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "Loading .splunkrc");
                Self::from_splunkrc_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `SPLUNK_*` overrides using the given lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        const VARS: &[(&str, &str)] = &[
            ("SPLUNK_SCHEME", "scheme"),
            ("SPLUNK_HOST", "host"),
            ("SPLUNK_PORT", "port"),
            ("SPLUNK_USERNAME", "username"),
            ("SPLUNK_PASSWORD", "password"),
            ("SPLUNK_TOKEN", "token"),
            ("SPLUNK_BEARER_TOKEN", "bearerToken"),
            ("SPLUNK_OWNER", "owner"),
            ("SPLUNK_APP", "app"),
            ("SPLUNK_SHARING", "sharing"),
        ];

        for (var, key) in VARS {
            if let Some(value) = lookup(var) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    /// Set one setting by its `.splunkrc` key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "scheme" => self.scheme = value.to_string(),
            "host" => self.host = value.to_string(),
            "port" => self.port = parse(key, value)?,
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "token" => self.token = Some(value.to_string()),
            "bearerToken" | "bearer_token" => self.bearer_token = Some(value.to_string()),
            "basic" => self.basic = parse_bool(key, value)?,
            "owner" => self.owner = Some(value.to_string()),
            "app" => self.app = Some(value.to_string()),
            "sharing" => {
                self.sharing = Some(value.parse().map_err(|_| invalid(key, value))?);
            }
            "autologin" => self.autologin = parse_bool(key, value)?,
            "retries" => self.retries = parse(key, value)?,
            "retryDelay" | "retry_delay" => self.retry_delay = parse(key, value)?,
            "verify" => self.verify = parse_bool(key, value)?,
            "timeout" => self.timeout = Some(parse(key, value)?),
            "cookie" => self.cookie = Some(value.to_string()),
            "version" => {}
            other => debug!(key = %other, "Ignoring unknown configuration key"),
        }
        Ok(())
    }

    /// `scheme://host:port`, with IPv6 literals bracketed.
    pub fn base_url(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}", self.scheme, host, self.port)
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.owner.clone(), self.app.clone(), self.sharing)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "https://localhost:8089");
        assert!(config.namespace().is_empty());
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_splunkrc_parsing() {
        let content = "\
# connection settings
host=splunk.example.com
port=8090

username=admin
password=changed=me
scheme=http
retries=3
autologin=true
unknown=ignored
";
        let config = ClientConfig::from_splunkrc_str(content).unwrap();
        assert_eq!(config.host, "splunk.example.com");
        assert_eq!(config.port, 8090);
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.password.as_deref(), Some("changed=me"));
        assert_eq!(config.retries, 3);
        assert!(config.autologin);
        assert_eq!(config.base_url(), "http://splunk.example.com:8090");
    }

    #[test]
    fn test_splunkrc_invalid_port() {
        let err = ClientConfig::from_splunkrc_str("port=eighty").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "port"));
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host = \"10.0.0.5\"\nport = 9089\napp = \"search\"\nsharing = \"app\"\nretry_delay = 2"
        )
        .unwrap();

        let config = ClientConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9089);
        assert_eq!(config.sharing, Some(Sharing::App));
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.scheme, "https");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("SPLUNK_HOST", "envhost"), ("SPLUNK_PORT", "1234")]
            .into_iter()
            .collect();

        let mut config = ClientConfig::from_splunkrc_str("host=filehost\nusername=bob").unwrap();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.host, "envhost");
        assert_eq!(config.port, 1234);
        assert_eq!(config.username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_ipv6_base_url() {
        let mut config = ClientConfig::default();
        config.host = "::1".to_string();
        assert_eq!(config.base_url(), "https://[::1]:8089");
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::from_splunkrc_file("/nonexistent/.splunkrc").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
