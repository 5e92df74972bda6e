//! Service
//!
//! Entry point of the object model. Wraps an authenticated [`Context`] and
//! hands out the typed collections.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use sp_binding::{Context, Namespace, Params};
use sp_config::ClientConfig;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::collection::Collection;
use crate::conf::Configurations;
use crate::entity::{single_entry, Entity};
use crate::error::{ClientError, Result};
use crate::job::{Job, Jobs, SearchApi};
use crate::kvstore::KvStoreCollections;
use crate::saved_search::SavedSearches;

/// `major.minor.patch` of the server; extra components are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplunkVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SplunkVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

/// First release serving the `search/v2` endpoints
pub const V2_SEARCH_API_VERSION: SplunkVersion = SplunkVersion::new(9, 0, 2);

impl FromStr for SplunkVersion {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.').map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        });

        let major = parts
            .next()
            .flatten()
            .ok_or_else(|| ClientError::incomplete(format!("unparseable server version '{}'", s)))?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Ok(Self { major, minor, patch })
    }
}

impl fmt::Display for SplunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    context: Context,
    version: Arc<OnceCell<SplunkVersion>>,
    search_api: Option<SearchApi>,
}

impl Service {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            version: Arc::new(OnceCell::new()),
            search_api: None,
        }
    }

    /// Build a context from `config` and log in when it carries a username
    /// and password but no other credential.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let has_password = config.username.is_some() && config.password.is_some();
        let service = Self::new(Context::from_config(config)?);

        if has_password && !service.context.is_authenticated() {
            service.login().await?;
        }
        Ok(service)
    }

    /// Reuse a session handed over by the server, e.g. to a search command.
    pub fn from_session(splunkd_uri: &str, session_key: &str, namespace: Namespace) -> Result<Self> {
        let config = ClientConfig {
            token: Some(session_key.to_string()),
            owner: namespace.owner,
            app: namespace.app,
            sharing: namespace.sharing,
            ..ClientConfig::default()
        };
        let context = Context::builder(config).base_url(splunkd_uri).build()?;
        Ok(Self::new(context))
    }

    /// Pin the job API generation instead of asking the server.
    pub fn with_search_api(mut self, api: SearchApi) -> Self {
        self.search_api = Some(api);
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn namespace(&self) -> &Namespace {
        self.context.namespace()
    }

    pub async fn login(&self) -> Result<()> {
        self.context.login().await?;
        Ok(())
    }

    pub fn logout(&self) {
        self.context.logout();
    }

    /// Content of `server/info`
    pub async fn info(&self) -> Result<Map<String, Value>> {
        let response = self
            .context
            .get("/services/server/info", &Namespace::default(), Params::new())
            .await?;
        let entry = single_entry(&response, "server/info")?;
        match entry.content {
            Value::Object(map) => Ok(map),
            _ => Err(ClientError::incomplete("server/info carried no content")),
        }
    }

    /// Server version, fetched once per service and shared by its clones.
    pub async fn splunk_version(&self) -> Result<SplunkVersion> {
        let version = self
            .version
            .get_or_try_init(|| async {
                let info = self.info().await?;
                let raw = info
                    .get("version")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::incomplete("server/info has no version"))?;
                let version: SplunkVersion = raw.parse()?;
                info!(version = %version, "Detected server version");
                Ok::<_, ClientError>(version)
            })
            .await?;
        Ok(*version)
    }

    pub async fn is_v2_search_api_supported(&self) -> Result<bool> {
        Ok(self.search_api().await? == SearchApi::V2)
    }

    /// Job API generation to use: the pinned one, else by server version.
    pub async fn search_api(&self) -> Result<SearchApi> {
        if let Some(api) = self.search_api {
            return Ok(api);
        }
        let version = self.splunk_version().await?;
        let api = if version >= V2_SEARCH_API_VERSION {
            SearchApi::V2
        } else {
            SearchApi::V1
        };
        debug!(version = %version, api = ?api, "Selected search API");
        Ok(api)
    }

    pub fn jobs(&self) -> Jobs {
        Jobs::new(self.clone())
    }

    pub fn saved_searches(&self) -> SavedSearches {
        SavedSearches::new(self.clone())
    }

    pub fn confs(&self) -> Configurations {
        Configurations::new(self.clone())
    }

    pub fn kvstore(&self) -> KvStoreCollections {
        KvStoreCollections::new(self.clone())
    }

    /// Any listing endpoint: `apps/local`, `data/indexes`,
    /// `authentication/users`, `authorization/roles`, ...
    pub fn collection(&self, path: &str) -> Collection<Entity> {
        Collection::new(self.clone(), path)
    }

    /// Start a normal search job.
    pub async fn search(&self, query: &str, params: Params) -> Result<Job> {
        self.jobs().create(query, params).await
    }

    /// Ask the server to parse a query; returns the raw parser reply.
    pub async fn parse(&self, query: &str, params: Params) -> Result<Bytes> {
        let mut form = Params::new().with("q", query);
        form.extend(params);

        let namespace = Namespace::default();
        let response = match self.search_api().await? {
            SearchApi::V1 => self.context.get("search/parser", &namespace, form).await?,
            SearchApi::V2 => self.context.post("search/v2/parser", &namespace, form).await?,
        };
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!("9.0.2".parse::<SplunkVersion>().unwrap(), SplunkVersion::new(9, 0, 2));
        assert_eq!("8.2".parse::<SplunkVersion>().unwrap(), SplunkVersion::new(8, 2, 0));
        assert_eq!(
            "9.1.0.1".parse::<SplunkVersion>().unwrap(),
            SplunkVersion::new(9, 1, 0)
        );
        assert_eq!(
            "10.0.0-beta".parse::<SplunkVersion>().unwrap(),
            SplunkVersion::new(10, 0, 0)
        );
        assert!("dev".parse::<SplunkVersion>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(SplunkVersion::new(9, 0, 1) < V2_SEARCH_API_VERSION);
        assert!(SplunkVersion::new(9, 1, 0) > V2_SEARCH_API_VERSION);
        assert!(SplunkVersion::new(10, 0, 0) > V2_SEARCH_API_VERSION);
    }

    #[test]
    fn test_from_session_uses_session_key() {
        let service = Service::from_session(
            "https://127.0.0.1:8089",
            "abc",
            Namespace::user("admin", "search"),
        )
        .unwrap();
        assert_eq!(service.context().token().as_deref(), Some("Splunk abc"));
        assert_eq!(service.namespace().app.as_deref(), Some("search"));
        assert_eq!(service.context().base_url(), "https://127.0.0.1:8089");
    }
}
