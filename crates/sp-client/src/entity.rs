//! Entity
//!
//! A single REST resource (saved search, index, app, stanza, ...). The
//! last-read Atom entry is cached as [`EntityState`]; `refresh` reloads it.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use sp_binding::{AtomEntry, Namespace, Params, Response, Sharing};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::service::Service;

/// `eai:acl` block of an entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Access {
    pub owner: Option<String>,
    pub app: Option<String>,
    pub sharing: Option<Sharing>,
    pub can_write: bool,
    pub can_list: bool,
    pub modifiable: bool,
    pub removable: bool,
    pub perms_read: Vec<String>,
    pub perms_write: Vec<String>,
}

impl Access {
    fn from_value(acl: &Value) -> Self {
        let perms = &acl["perms"];
        Self {
            owner: acl["owner"].as_str().map(str::to_string),
            app: acl["app"].as_str().map(str::to_string),
            sharing: acl["sharing"].as_str().and_then(|s| s.parse().ok()),
            can_write: value_is_true(&acl["can_write"]),
            can_list: value_is_true(&acl["can_list"]),
            modifiable: value_is_true(&acl["modifiable"]),
            removable: value_is_true(&acl["removable"]),
            perms_read: string_list(&perms["read"]),
            perms_write: string_list(&perms["write"]),
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.owner.clone(), self.app.clone(), self.sharing)
    }
}

/// `eai:attributes` block: which fields a create/update accepts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub wildcard: Vec<String>,
}

impl Fields {
    fn from_value(attributes: &Value) -> Self {
        Self {
            required: string_list(&attributes["requiredFields"]),
            optional: string_list(&attributes["optionalFields"]),
            wildcard: string_list(&attributes["wildcardFields"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub title: String,
    pub id: String,
    pub updated: Option<String>,
    pub author: Option<String>,
    pub links: IndexMap<String, String>,
    pub content: Map<String, Value>,
    pub access: Access,
    pub fields: Fields,
}

impl EntityState {
    pub fn from_entry(entry: AtomEntry) -> Self {
        let mut content = match entry.content {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let access = content
            .remove("eai:acl")
            .map(|acl| Access::from_value(&acl))
            .unwrap_or_default();
        let fields = content
            .remove("eai:attributes")
            .map(|attrs| Fields::from_value(&attrs))
            .unwrap_or_default();

        Self {
            title: entry.title,
            id: entry.id,
            updated: entry.updated,
            author: entry.author,
            links: entry.links,
            content,
            access,
            fields,
        }
    }

    /// Absolute path of the resource, from its `alternate` link or its id
    pub fn path(&self) -> Option<String> {
        if let Some(alternate) = self.links.get("alternate") {
            return Some(alternate.clone());
        }
        reqwest::Url::parse(&self.id).ok().map(|url| url.path().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    service: Service,
    path: String,
    state: EntityState,
}

impl Entity {
    pub fn new(service: Service, path: impl Into<String>, state: EntityState) -> Self {
        Self {
            service,
            path: path.into(),
            state,
        }
    }

    /// Build from a listing/lookup entry
    pub fn from_entry(service: Service, entry: AtomEntry) -> Result<Self> {
        let state = EntityState::from_entry(entry);
        let path = state
            .path()
            .ok_or_else(|| ClientError::incomplete(format!("entry '{}' has no alternate link", state.title)))?;
        Ok(Self::new(service, path, state))
    }

    /// GET `path` and load the single entry it returns.
    pub async fn fetch(service: Service, path: &str, namespace: &Namespace) -> Result<Self> {
        let response = service.context().get(path, namespace, Params::new()).await?;
        let entry = single_entry(&response, path)?;
        let state = EntityState::from_entry(entry);
        let path = state.path().unwrap_or_else(|| path.to_string());
        Ok(Self::new(service, path, state))
    }

    pub fn name(&self) -> &str {
        &self.state.title
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.state.content
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.content.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.state.content.get(key).and_then(Value::as_str)
    }

    /// `"1"`/`"true"` style flags in content
    pub fn get_bool(&self, key: &str) -> bool {
        self.state.content.get(key).map(value_is_true).unwrap_or(false)
    }

    pub fn access(&self) -> &Access {
        &self.state.access
    }

    pub fn fields(&self) -> &Fields {
        &self.state.fields
    }

    pub fn links(&self) -> &IndexMap<String, String> {
        &self.state.links
    }

    pub async fn refresh(&mut self) -> Result<&EntityState> {
        let response = Endpoint::get(&*self, "", Params::new()).await?;
        self.load_state(&response)?;
        Ok(&self.state)
    }

    /// POST new attribute values. When the reply carries the updated entry
    /// the cached state is replaced with it.
    pub async fn update(&mut self, params: Params) -> Result<()> {
        if params.contains("name") {
            return Err(ClientError::invalid_argument("cannot update the name of an entity"));
        }
        let response = Endpoint::post(&*self, "", params).await?;
        if let Err(e) = self.load_state(&response) {
            debug!(path = %self.path, error = %e, "Update reply carried no entry");
        }
        Ok(())
    }

    pub async fn enable(&mut self) -> Result<()> {
        Endpoint::post(&*self, "enable", Params::new()).await?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn disable(&mut self) -> Result<()> {
        Endpoint::post(&*self, "disable", Params::new()).await?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn reload(&mut self) -> Result<()> {
        Endpoint::post(&*self, "_reload", Params::new()).await?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn delete(self) -> Result<()> {
        Endpoint::delete(&self, "", Params::new()).await?;
        Ok(())
    }

    fn load_state(&mut self, response: &Response) -> Result<()> {
        let entry = single_entry(response, &self.path)?;
        self.state = EntityState::from_entry(entry);
        Ok(())
    }
}

#[async_trait]
impl Endpoint for Entity {
    fn service(&self) -> &Service {
        &self.service
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn namespace(&self) -> Namespace {
        let access = self.state.access.namespace();
        if access.is_empty() {
            self.service.context().namespace().clone()
        } else {
            access
        }
    }
}

/// Exactly one entry, else NotFound/AmbiguousReference
pub(crate) fn single_entry(response: &Response, name: &str) -> Result<AtomEntry> {
    let mut entries = response.atom()?.entries;
    match entries.len() {
        0 => Err(ClientError::not_found("Entity", name)),
        1 => Ok(entries.remove(0)),
        _ => Err(ClientError::AmbiguousReference { name: name.to_string() }),
    }
}

pub(crate) fn value_is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "t" | "yes"),
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> AtomEntry {
        AtomEntry {
            title: "main".to_string(),
            id: "https://localhost:8089/servicesNS/nobody/search/data/indexes/main".to_string(),
            updated: None,
            author: Some("nobody".to_string()),
            links: IndexMap::new(),
            content: json!({
                "maxTotalDataSizeMB": "500000",
                "disabled": "0",
                "eai:acl": {
                    "owner": "nobody",
                    "app": "search",
                    "sharing": "app",
                    "can_write": "1",
                    "perms": {"read": ["*"], "write": ["admin", "power"]}
                },
                "eai:attributes": {
                    "requiredFields": [],
                    "optionalFields": ["maxTotalDataSizeMB", "homePath"],
                    "wildcardFields": null
                }
            }),
        }
    }

    #[test]
    fn test_state_splits_acl_and_attributes() {
        let state = EntityState::from_entry(entry());
        assert!(!state.content.contains_key("eai:acl"));
        assert_eq!(state.access.owner.as_deref(), Some("nobody"));
        assert_eq!(state.access.sharing, Some(Sharing::App));
        assert!(state.access.can_write);
        assert_eq!(state.access.perms_write, vec!["admin", "power"]);
        assert_eq!(state.fields.optional, vec!["maxTotalDataSizeMB", "homePath"]);
        assert!(state.fields.wildcard.is_empty());
    }

    #[test]
    fn test_path_falls_back_to_id() {
        let state = EntityState::from_entry(entry());
        assert_eq!(state.path().as_deref(), Some("/servicesNS/nobody/search/data/indexes/main"));

        let mut with_link = entry();
        with_link
            .links
            .insert("alternate".to_string(), "/servicesNS/nobody/search/data/indexes/main2".to_string());
        let state = EntityState::from_entry(with_link);
        assert_eq!(state.path().as_deref(), Some("/servicesNS/nobody/search/data/indexes/main2"));
    }

    #[test]
    fn test_value_is_true() {
        assert!(value_is_true(&json!("1")));
        assert!(value_is_true(&json!("True")));
        assert!(value_is_true(&json!(true)));
        assert!(!value_is_true(&json!("0")));
        assert!(!value_is_true(&Value::Null));
    }
}
