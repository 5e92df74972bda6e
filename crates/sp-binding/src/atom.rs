//! Atom feed loading
//!
//! Collection listings and entity reads come back as Atom feeds whose
//! `<content>` holds the service's own dictionary markup:
//!
//! ```xml
//! <s:dict>
//!   <s:key name="search">search *</s:key>
//!   <s:key name="eai:acl"><s:dict>...</s:dict></s:key>
//!   <s:key name="roles"><s:list><s:item>admin</s:item></s:list></s:key>
//! </s:dict>
//! ```
//!
//! which loads into a `serde_json::Value` (dict → object, list → array,
//! text → string, empty → null).

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::xml::{self, XmlElement};
use crate::{BindingError, Result};

#[derive(Debug, Clone, Default)]
pub struct AtomFeed {
    pub title: Option<String>,
    pub updated: Option<String>,
    pub total_results: Option<u64>,
    pub items_per_page: Option<u64>,
    pub start_index: Option<u64>,
    pub entries: Vec<AtomEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomEntry {
    pub title: String,
    pub id: String,
    pub updated: Option<String>,
    pub author: Option<String>,
    /// `rel` → `href`
    pub links: IndexMap<String, String>,
    pub content: Value,
}

impl AtomEntry {
    fn from_element(element: &XmlElement) -> Self {
        let links = element
            .children_named("link")
            .filter_map(|link| Some((link.attr("rel")?.to_string(), link.attr("href")?.to_string())))
            .collect();

        let author = element
            .child("author")
            .and_then(|a| a.child_text("name"))
            .map(str::to_string);

        let content = element.child("content").map(load_content).unwrap_or(Value::Null);

        Self {
            title: element.child_text("title").unwrap_or_default().to_string(),
            id: element.child_text("id").unwrap_or_default().to_string(),
            updated: element.child_text("updated").map(str::to_string),
            author,
            links,
            content,
        }
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }
}

/// Load an Atom `<feed>` or a bare `<entry>` document.
///
/// An empty body yields an empty feed.
pub fn load_feed(body: &[u8]) -> Result<AtomFeed> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AtomFeed::default());
    }

    let root = xml::parse(body)?;
    match root.name.as_str() {
        "feed" => Ok(AtomFeed {
            title: root.child_text("title").map(str::to_string),
            updated: root.child_text("updated").map(str::to_string),
            total_results: parse_u64(root.child_text("totalResults")),
            items_per_page: parse_u64(root.child_text("itemsPerPage")),
            start_index: parse_u64(root.child_text("startIndex")),
            entries: root.children_named("entry").map(AtomEntry::from_element).collect(),
        }),
        "entry" => Ok(AtomFeed {
            entries: vec![AtomEntry::from_element(&root)],
            ..AtomFeed::default()
        }),
        other => Err(BindingError::Xml(format!("expected an Atom feed, found <{}>", other))),
    }
}

fn parse_u64(text: Option<&str>) -> Option<u64> {
    text.and_then(|t| t.parse().ok())
}

/// Load the value held by a `<content>`, `<key>` or `<item>` element.
pub fn load_content(element: &XmlElement) -> Value {
    if let Some(dict) = element.child("dict") {
        return load_dict(dict);
    }
    if let Some(list) = element.child("list") {
        return load_list(list);
    }
    match element.text() {
        "" => Value::Null,
        text => Value::String(text.to_string()),
    }
}

fn load_dict(dict: &XmlElement) -> Value {
    let mut map = Map::new();
    for key in dict.children_named("key") {
        if let Some(name) = key.attr("name") {
            map.insert(name.to_string(), load_content(key));
        }
    }
    Value::Object(map)
}

fn load_list(list: &XmlElement) -> Value {
    Value::Array(list.children_named("item").map(load_content).collect())
}
