//! Search info
//!
//! The v2 protocol delivers it as the `searchinfo` object of the getinfo
//! chunk. The v1 protocol points at an `info.csv` file through the
//! `infoPath` header.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;
use sp_common::Namespace;

use crate::error::{CommandError, Result};

pub const DEFAULT_MAXRESULTROWS: usize = 50_000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchInfo {
    pub args: Vec<String>,
    pub raw_args: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub dispatch_dir: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub app: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub owner: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub username: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub session_key: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub splunkd_uri: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub splunk_version: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub search: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub command: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub earliest_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub latest_time: Option<String>,
    #[serde(deserialize_with = "lenient_usize")]
    pub maxresultrows: Option<usize>,
}

impl SearchInfo {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Build from the v1 `info.csv` file: a header row and one value row.
    pub fn from_info_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let row = reader
            .records()
            .next()
            .transpose()?
            .ok_or_else(|| CommandError::protocol(format!("{} has no value row", path.display())))?;

        let info: HashMap<&str, &str> = headers.iter().zip(row.iter()).collect();
        let get = |key: &str| {
            info.get(key)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };

        Ok(Self {
            dispatch_dir: path.parent().map(|dir| dir.display().to_string()),
            sid: get("_sid"),
            app: get("_ppc.app"),
            owner: get("_ppc.user"),
            username: get("_ppc.user"),
            session_key: get("_auth_token"),
            splunkd_uri: get("_splunkd_uri"),
            splunk_version: get("_splunk_version"),
            search: get("_search"),
            earliest_time: get("_search_et"),
            latest_time: get("_search_lt"),
            maxresultrows: get("_maxresultrows").and_then(|rows| rows.parse().ok()),
            ..Self::default()
        })
    }

    pub fn maxresultrows(&self) -> usize {
        match self.maxresultrows {
            Some(rows) if rows > 0 => rows,
            _ => DEFAULT_MAXRESULTROWS,
        }
    }

    /// Namespace of the search that invoked the command
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.owner.clone(), self.app.clone(), None)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_usize<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UsizeVisitor;

    impl<'de> Visitor<'de> for UsizeVisitor {
        type Value = Option<usize>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or a string holding one")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            usize::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            usize::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(Some(v as usize))
            } else {
                Err(E::custom(format!("expected a whole number, got {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            if v.trim().is_empty() {
                return Ok(None);
            }
            v.trim().parse().map(Some).map_err(E::custom)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_option(UsizeVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_searchinfo_from_getinfo_metadata() {
        let info = SearchInfo::from_value(&json!({
            "args": ["count=3", "host"],
            "raw_args": ["count=3", "host"],
            "sid": "1700000000.42",
            "app": "search",
            "owner": "admin",
            "session_key": "abc",
            "splunkd_uri": "https://127.0.0.1:8089",
            "splunk_version": 9.1,
            "maxresultrows": "10000",
            "earliest_time": 0,
            "unknown_key": true
        }))
        .unwrap();

        assert_eq!(info.args, vec!["count=3", "host"]);
        assert_eq!(info.sid.as_deref(), Some("1700000000.42"));
        assert_eq!(info.splunk_version.as_deref(), Some("9.1"));
        assert_eq!(info.earliest_time.as_deref(), Some("0"));
        assert_eq!(info.maxresultrows(), 10_000);
        assert_eq!(info.namespace(), Namespace::new(Some("admin".into()), Some("search".into()), None));
    }

    #[test]
    fn test_maxresultrows_default() {
        let info = SearchInfo::from_value(&json!({ "maxresultrows": null })).unwrap();
        assert_eq!(info.maxresultrows(), DEFAULT_MAXRESULTROWS);
    }

    #[test]
    fn test_searchinfo_from_info_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "_sid,_search,_splunkd_uri,_auth_token,_ppc.app,_ppc.user,_search_et,_search_lt").unwrap();
        writeln!(file, "scheduler_42,\"search index=main | mycmd\",https://localhost:8089,tok,search,admin,,").unwrap();
        drop(file);

        let info = SearchInfo::from_info_csv(&path).unwrap();
        assert_eq!(info.sid.as_deref(), Some("scheduler_42"));
        assert_eq!(info.search.as_deref(), Some("search index=main | mycmd"));
        assert_eq!(info.session_key.as_deref(), Some("tok"));
        assert_eq!(info.owner.as_deref(), Some("admin"));
        assert_eq!(info.earliest_time, None);
        assert_eq!(info.dispatch_dir.as_deref(), Some(dir.path().to_str().unwrap()));
    }
}
