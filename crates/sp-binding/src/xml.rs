//! Minimal XML element tree
//!
//! Replies such as `<response><sid>..</sid></response>` or the login
//! `<sessionKey>` are small; building a tree keeps the callers simple.
//! Element and attribute names are stored without their namespace prefix.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{BindingError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();

        Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Text content with surrounding whitespace removed
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text content exactly as it appeared
    pub fn raw_text(&self) -> &str {
        &self.text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search, including `self`
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(XmlElement::text)
    }
}

/// Parse a document and return its root element.
pub fn parse(xml: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => stack.push(XmlElement::from_start(e)),
            Event::Empty(ref e) => {
                let element = XmlElement::from_start(e);
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(ref t) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape()?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(ref c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| BindingError::Xml("document has no root element".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sid_response() {
        let root = parse(b"<?xml version='1.0'?>\n<response>\n  <sid>1700000000.42</sid>\n</response>").unwrap();
        assert_eq!(root.name, "response");
        assert_eq!(root.child_text("sid"), Some("1700000000.42"));
    }

    #[test]
    fn test_namespace_prefixes_are_dropped() {
        let root = parse(
            br#"<s:dict xmlns:s="http://dev.splunk.com/ns/rest"><s:key name="a">1 &amp; 2</s:key><s:key name="b"/></s:dict>"#,
        )
        .unwrap();
        assert_eq!(root.name, "dict");
        let keys: Vec<_> = root.children_named("key").collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].attr("name"), Some("a"));
        assert_eq!(keys[0].text(), "1 & 2");
        assert_eq!(keys[1].text(), "");
    }

    #[test]
    fn test_find_nested() {
        let root = parse(b"<response><messages><msg type=\"WARN\">careful</msg></messages></response>").unwrap();
        let msg = root.find("msg").unwrap();
        assert_eq!(msg.attr("type"), Some("WARN"));
        assert_eq!(msg.text(), "careful");
    }

    #[test]
    fn test_empty_document_is_an_error() {
        assert!(parse(b"   ").is_err());
    }
}
