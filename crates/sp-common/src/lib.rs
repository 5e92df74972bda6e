use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod logging;

// ============================================================================
// Record Types
// ============================================================================

/// A single field value as carried by search results and search commands.
///
/// The service distinguishes single values from multi-value fields; both the
/// results readers and the search-command record codec preserve that split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    /// First value, or `None` for an empty multi-value.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value.as_str()),
            FieldValue::Multi(values) => values.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(value) => vec![value.as_str()],
            FieldValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, FieldValue::Multi(_))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Single(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Multi(values)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        FieldValue::Multi(values.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Single(value) => f.write_str(value),
            FieldValue::Multi(values) => f.write_str(&values.join("\n")),
        }
    }
}

/// An ordered set of fields. Field order is the order of first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// First value of a field
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::first)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fieldnames(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

// ============================================================================
// Namespace Types
// ============================================================================

/// Sharing level of a knowledge object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sharing {
    User,
    App,
    Global,
    System,
}

impl Sharing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sharing::User => "user",
            Sharing::App => "app",
            Sharing::Global => "global",
            Sharing::System => "system",
        }
    }
}

impl fmt::Display for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid sharing mode: {0}")]
pub struct InvalidSharing(pub String);

impl FromStr for Sharing {
    type Err = InvalidSharing;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Sharing::User),
            "app" => Ok(Sharing::App),
            "global" => Ok(Sharing::Global),
            "system" => Ok(Sharing::System),
            other => Err(InvalidSharing(other.to_string())),
        }
    }
}

/// Owner/app/sharing triple that selects a REST namespace.
///
/// `"-"` is the wildcard for owner or app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub owner: Option<String>,
    pub app: Option<String>,
    pub sharing: Option<Sharing>,
}

impl Namespace {
    pub fn new(owner: Option<String>, app: Option<String>, sharing: Option<Sharing>) -> Self {
        Self { owner, app, sharing }
    }

    pub fn user(owner: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            app: Some(app.into()),
            sharing: Some(Sharing::User),
        }
    }

    pub fn app(app: impl Into<String>) -> Self {
        Self {
            owner: None,
            app: Some(app.into()),
            sharing: Some(Sharing::App),
        }
    }

    pub fn system() -> Self {
        Self {
            owner: None,
            app: None,
            sharing: Some(Sharing::System),
        }
    }

    pub fn wildcard() -> Self {
        Self {
            owner: Some("-".to_string()),
            app: Some("-".to_string()),
            sharing: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.app.is_none() && self.sharing.is_none()
    }

    /// Apply the service's sharing rules and return the effective owner/app.
    ///
    /// `system` pins owner `nobody` and app `system`; `app` and `global` pin
    /// owner `nobody`; `user` (or no sharing) keeps owner and app as given.
    pub fn resolve(&self) -> (Option<String>, Option<String>) {
        match self.sharing {
            Some(Sharing::System) => (Some("nobody".to_string()), Some("system".to_string())),
            Some(Sharing::App) | Some(Sharing::Global) => (Some("nobody".to_string()), self.app.clone()),
            Some(Sharing::User) | None => (self.owner.clone(), self.app.clone()),
        }
    }

    /// Fill unset parts from `defaults`.
    pub fn or(&self, defaults: &Namespace) -> Namespace {
        Namespace {
            owner: self.owner.clone().or_else(|| defaults.owner.clone()),
            app: self.app.clone().or_else(|| defaults.app.clone()),
            sharing: self.sharing.or(defaults.sharing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_preserves_insertion_order() {
        let mut record = Record::new();
        record.insert("b", "2");
        record.insert("a", "1");
        record.insert("b", "3");

        let names: Vec<&str> = record.fieldnames().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(record.get_str("b"), Some("3"));
    }

    #[test]
    fn test_field_value_first_and_display() {
        let mv = FieldValue::from(vec!["x", "y"]);
        assert_eq!(mv.first(), Some("x"));
        assert_eq!(mv.to_string(), "x\ny");
        assert!(mv.is_multi());
        assert_eq!(FieldValue::Multi(vec![]).first(), None);
    }

    #[test]
    fn test_record_serializes_as_json_object() {
        let record = Record::new().with("host", "web01").with("tag", vec!["a", "b"]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"host": "web01", "tag": ["a", "b"]}));
    }

    #[test]
    fn test_namespace_resolution() {
        assert_eq!(
            Namespace::system().resolve(),
            (Some("nobody".to_string()), Some("system".to_string()))
        );

        let ns = Namespace::new(Some("admin".into()), Some("search".into()), Some(Sharing::App));
        assert_eq!(ns.resolve(), (Some("nobody".to_string()), Some("search".to_string())));

        let ns = Namespace::new(Some("admin".into()), None, Some(Sharing::Global));
        assert_eq!(ns.resolve(), (Some("nobody".to_string()), None));

        let ns = Namespace::user("admin", "search");
        assert_eq!(ns.resolve(), (Some("admin".to_string()), Some("search".to_string())));
    }

    #[test]
    fn test_namespace_defaults() {
        let defaults = Namespace::user("admin", "search");
        let ns = Namespace::new(None, Some("launcher".into()), None);
        let merged = ns.or(&defaults);
        assert_eq!(merged.owner.as_deref(), Some("admin"));
        assert_eq!(merged.app.as_deref(), Some("launcher"));
        assert_eq!(merged.sharing, Some(Sharing::User));
    }

    #[test]
    fn test_sharing_from_str() {
        assert_eq!("GLOBAL".parse::<Sharing>().unwrap(), Sharing::Global);
        assert!("everyone".parse::<Sharing>().is_err());
    }
}
