//! HTTP Context
//!
//! Sends requests to the service's management port. A `Context` is cheap to
//! clone; clones share the underlying connection pool and login state.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use sp_common::Namespace;
use sp_config::ClientConfig;
use tracing::{debug, info, warn};

use crate::atom::{self, AtomFeed};
use crate::error::{BindingError, HttpError};
use crate::url::{abspath, Params};
use crate::xml::{self, XmlElement};
use crate::Result;

const LOGIN_PATH: &str = "/services/auth/login";
const SESSION_COOKIE_PREFIX: &str = "splunkd_";

/// A successful reply
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn xml(&self) -> Result<XmlElement> {
        xml::parse(&self.body)
    }

    pub fn atom(&self) -> Result<AtomFeed> {
        atom::load_feed(&self.body)
    }
}

/// One request, before credentials are attached.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub namespace: Namespace,
    /// Query string for GET/DELETE; form body for POST unless `body` is set
    pub params: Params,
    pub headers: Vec<(String, String)>,
    pub body: Option<(String, Bytes)>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            namespace: Namespace::default(),
            params: Params::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Raw body; `params` then travel in the query string.
    pub fn body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.body = Some((content_type.into(), body.into()));
        self
    }

    pub fn json_body(self, value: &serde_json::Value) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.body("application/json", body))
    }
}

#[derive(Debug, Default)]
struct Session {
    /// Full `Authorization` value, e.g. `Splunk <key>`
    token: Option<String>,
    cookies: IndexMap<String, String>,
}

#[derive(Debug)]
struct Inner {
    client: reqwest::Client,
    base_url: String,
    namespace: Namespace,
    username: Option<String>,
    password: Option<String>,
    bearer_token: Option<String>,
    basic: bool,
    autologin: bool,
    retries: u32,
    retry_delay: Duration,
    session: RwLock<Session>,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

/// Builder for [`Context`]
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    config: ClientConfig,
    base_url: Option<String>,
    client: Option<reqwest::Client>,
    connect_timeout: Duration,
}

impl ContextBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            base_url: None,
            client: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Override `scheme://host:port`, e.g. to point at a mock server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Bring your own HTTP client (proxies, custom roots, ...)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Context> {
        let config = self.config;

        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder()
                    .connect_timeout(self.connect_timeout)
                    .danger_accept_invalid_certs(!config.verify);
                if let Some(timeout) = config.timeout() {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        let base_url = self
            .base_url
            .unwrap_or_else(|| config.base_url())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&base_url).map_err(|e| BindingError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let mut session = Session {
            token: config.token.as_deref().map(normalize_token),
            cookies: IndexMap::new(),
        };
        if let Some(cookie) = &config.cookie {
            session.cookies.extend(parse_cookie_header(cookie));
        }

        Ok(Context {
            inner: Arc::new(Inner {
                client,
                base_url,
                namespace: config.namespace(),
                username: config.username.clone(),
                password: config.password.clone(),
                bearer_token: config.bearer_token.clone(),
                basic: config.basic,
                autologin: config.autologin,
                retries: config.retries,
                retry_delay: config.retry_delay(),
                session: RwLock::new(session),
            }),
        })
    }
}

impl Context {
    pub fn builder(config: ClientConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        ContextBuilder::new(config).build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Default namespace applied when a request leaves owner/app unset
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn token(&self) -> Option<String> {
        self.inner.session.read().token.clone()
    }

    pub fn set_token(&self, token: &str) {
        self.inner.session.write().token = Some(normalize_token(token));
    }

    pub fn has_cookies(&self) -> bool {
        !self.inner.session.read().cookies.is_empty()
    }

    pub fn cookies(&self) -> IndexMap<String, String> {
        self.inner.session.read().cookies.clone()
    }

    /// True when some credential will be attached to requests
    pub fn is_authenticated(&self) -> bool {
        let session = self.inner.session.read();
        session.token.is_some()
            || !session.cookies.is_empty()
            || self.inner.bearer_token.is_some()
            || (self.inner.basic && self.inner.username.is_some() && self.inner.password.is_some())
    }

    fn can_login(&self) -> bool {
        self.inner.username.is_some() && self.inner.password.is_some()
    }

    /// Log in with username/password and keep the session key and cookies.
    pub async fn login(&self) -> Result<()> {
        let (Some(username), Some(password)) = (&self.inner.username, &self.inner.password) else {
            return Err(BindingError::Authentication(HttpError::new(
                401,
                "Unauthorized",
                "username and password are required to log in",
            )));
        };

        let params = Params::new()
            .with("username", username)
            .with("password", password)
            .with("cookie", "1");
        let spec = RequestSpec::new(Method::POST, LOGIN_PATH).params(params);

        let response = match self.send_once(&spec, false).await {
            Ok(response) => response,
            Err(BindingError::Http(e)) if (400..500).contains(&e.status) => {
                return Err(BindingError::Authentication(e));
            }
            Err(e) => return Err(e),
        };

        let root = response.xml()?;
        let key = root
            .find("sessionKey")
            .map(|k| k.text().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(BindingError::MissingSessionKey)?;

        self.inner.session.write().token = Some(format!("Splunk {}", key));
        info!(username = %username, "Logged in");
        Ok(())
    }

    pub fn logout(&self) {
        let mut session = self.inner.session.write();
        session.token = None;
        session.cookies.clear();
        debug!("Logged out");
    }

    pub async fn get(&self, path: &str, namespace: &Namespace, params: Params) -> Result<Response> {
        self.send(
            RequestSpec::new(Method::GET, path)
                .namespace(namespace.clone())
                .params(params),
        )
        .await
    }

    pub async fn post(&self, path: &str, namespace: &Namespace, params: Params) -> Result<Response> {
        self.send(
            RequestSpec::new(Method::POST, path)
                .namespace(namespace.clone())
                .params(params),
        )
        .await
    }

    pub async fn delete(&self, path: &str, namespace: &Namespace, params: Params) -> Result<Response> {
        self.send(
            RequestSpec::new(Method::DELETE, path)
                .namespace(namespace.clone())
                .params(params),
        )
        .await
    }

    /// Send with autologin and retries.
    ///
    /// A 401 triggers one fresh login when credentials are known and
    /// autologin is on. Transport errors and 5xx replies are retried up to
    /// `retries` times with a fixed delay.
    pub async fn send(&self, spec: RequestSpec) -> Result<Response> {
        let mut attempts_left = self.inner.retries;
        let mut relogged = false;

        loop {
            match self.send_once(&spec, true).await {
                Ok(response) => return Ok(response),
                Err(BindingError::Http(e)) if e.status == 401 => {
                    if self.inner.autologin && self.can_login() && !relogged {
                        debug!(path = %spec.path, "Session expired, logging in again");
                        relogged = true;
                        self.login().await?;
                        continue;
                    }
                    return Err(BindingError::Authentication(e));
                }
                Err(e) if e.is_retryable() && attempts_left > 0 => {
                    attempts_left -= 1;
                    warn!(
                        path = %spec.path,
                        error = %e,
                        attempts_left,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(self.inner.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, spec: &RequestSpec, authenticate: bool) -> Result<Response> {
        let namespace = spec.namespace.or(&self.inner.namespace);
        let url = format!("{}{}", self.inner.base_url, abspath(&spec.path, &namespace));
        debug!(method = %spec.method, url = %url, "Sending request");

        let mut request = self.inner.client.request(spec.method.clone(), &url);

        match (&spec.body, spec.method == Method::POST) {
            (Some((content_type, body)), _) => {
                if !spec.params.is_empty() {
                    request = request.query(spec.params.pairs());
                }
                request = request.header(CONTENT_TYPE, content_type.as_str()).body(body.clone());
            }
            (None, true) => request = request.form(spec.params.pairs()),
            (None, false) => {
                if !spec.params.is_empty() {
                    request = request.query(spec.params.pairs());
                }
            }
        }

        if authenticate {
            request = request.headers(self.auth_headers());
        }
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        self.store_cookies(&headers);
        let body = response.bytes().await?;
        let reason = status.canonical_reason().unwrap_or("").to_string();

        if status.is_success() {
            Ok(Response {
                status: status.as_u16(),
                reason,
                headers,
                body,
            })
        } else {
            let error = HttpError::new(status.as_u16(), reason, String::from_utf8_lossy(&body));
            debug!(url = %url, error = %error, "Request failed");
            Err(BindingError::Http(error))
        }
    }

    /// Credentials for one request: session cookies, then basic, then
    /// bearer token, then session key.
    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let session = self.inner.session.read();

        let value = if !session.cookies.is_empty() {
            let cookie = session
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(COOKIE, value);
            }
            return headers;
        } else if let (true, Some(user), Some(pass)) =
            (self.inner.basic, &self.inner.username, &self.inner.password)
        {
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
            Some(format!("Basic {}", encoded))
        } else if let Some(bearer) = &self.inner.bearer_token {
            Some(format!("Bearer {}", bearer))
        } else {
            session.token.clone()
        };

        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let cookies: Vec<(String, String)> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .filter(|(name, _)| name.trim().starts_with(SESSION_COOKIE_PREFIX))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        if !cookies.is_empty() {
            self.inner.session.write().cookies.extend(cookies);
        }
    }
}

/// `abc` → `Splunk abc`; values that already name a scheme are kept.
fn normalize_token(token: &str) -> String {
    if token.starts_with("Splunk ") || token.starts_with("Bearer ") || token.starts_with("Basic ") {
        token.to_string()
    } else {
        format!("Splunk {}", token)
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            username: Some("admin".to_string()),
            password: Some("changeme".to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("abc"), "Splunk abc");
        assert_eq!(normalize_token("Splunk abc"), "Splunk abc");
        assert_eq!(normalize_token("Bearer xyz"), "Bearer xyz");
    }

    #[test]
    fn test_session_key_header() {
        let ctx = Context::from_config(ClientConfig {
            token: Some("k1".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(ctx.auth_headers().get(AUTHORIZATION).unwrap(), "Splunk k1");
    }

    #[test]
    fn test_bearer_beats_session_key() {
        let ctx = Context::from_config(ClientConfig {
            token: Some("k1".to_string()),
            bearer_token: Some("jwt".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(ctx.auth_headers().get(AUTHORIZATION).unwrap(), "Bearer jwt");
    }

    #[test]
    fn test_basic_auth_header() {
        let ctx = Context::from_config(ClientConfig {
            basic: true,
            ..config()
        })
        .unwrap();
        // base64("admin:changeme")
        assert_eq!(
            ctx.auth_headers().get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46Y2hhbmdlbWU="
        );
    }

    #[test]
    fn test_cookies_take_precedence() {
        let ctx = Context::from_config(ClientConfig {
            token: Some("k1".to_string()),
            cookie: Some("splunkd_8089=abc; other=1".to_string()),
            ..config()
        })
        .unwrap();
        let headers = ctx.auth_headers();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get(COOKIE).unwrap(), "splunkd_8089=abc; other=1");
    }

    #[test]
    fn test_logout_clears_session() {
        let ctx = Context::from_config(ClientConfig {
            token: Some("k1".to_string()),
            ..config()
        })
        .unwrap();
        assert!(ctx.is_authenticated());
        ctx.logout();
        assert!(!ctx.is_authenticated());
        assert!(ctx.token().is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        let result = Context::builder(config()).base_url("not a url").build();
        assert!(matches!(result, Err(BindingError::InvalidUrl(_))));
    }

    #[test]
    fn test_store_only_session_cookies() {
        let ctx = Context::from_config(config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("splunkd_8089=s3cr3t; Path=/; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("tracking=1; Path=/"));
        ctx.store_cookies(&headers);

        let cookies = ctx.cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("splunkd_8089").map(String::as_str), Some("s3cr3t"));
    }
}
