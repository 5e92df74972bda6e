//! JSON results reader
//!
//! `output_mode=json` bodies (and json export streams) carry one JSON
//! object per line with any of `preview`, `messages`, `result` and
//! `results`.

use std::collections::VecDeque;
use std::io::BufRead;

use serde_json::{Map, Value};
use sp_common::{FieldValue, Record};

use crate::{Message, Result, ResultItem, ResultsError};

const UNKNOWN_MESSAGE_TYPE: &str = "Unknown Message Type";

pub struct JsonResultsReader<R: BufRead> {
    input: R,
    line: String,
    line_number: usize,
    pending: VecDeque<ResultItem>,
    is_preview: bool,
    done: bool,
}

impl<R: BufRead> JsonResultsReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            line_number: 0,
            pending: VecDeque::new(),
            is_preview: false,
            done: false,
        }
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    /// Read lines until one produces items; false at end of input.
    fn fill(&mut self) -> Result<bool> {
        loop {
            self.line.clear();
            if self.input.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_number += 1;

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: Value = serde_json::from_str(line).map_err(|source| ResultsError::Json {
                line: self.line_number,
                source,
            })?;
            self.load(parsed);

            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }

    fn load(&mut self, parsed: Value) {
        if let Some(preview) = parsed.get("preview") {
            self.is_preview = match preview {
                Value::Bool(b) => *b,
                Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
                Value::Number(n) => n.as_i64() == Some(1),
                _ => false,
            };
        }

        if let Some(Value::Array(messages)) = parsed.get("messages") {
            for message in messages {
                let kind = message
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_MESSAGE_TYPE);
                let text = message.get("text").map(render).unwrap_or_default();
                self.pending
                    .push_back(ResultItem::Message(Message::new(kind, text)));
            }
        }

        if let Some(Value::Object(result)) = parsed.get("result") {
            self.pending.push_back(ResultItem::Result(to_record(result)));
        }

        if let Some(Value::Array(results)) = parsed.get("results") {
            for result in results.iter().filter_map(Value::as_object) {
                self.pending.push_back(ResultItem::Result(to_record(result)));
            }
        }
    }
}

fn to_record(object: &Map<String, Value>) -> Record {
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(items) => FieldValue::Multi(items.iter().map(render).collect()),
                other => FieldValue::Single(render(other)),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Scalar as text; strings without quotes, null as empty.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl<R: BufRead> Iterator for JsonResultsReader<R> {
    type Item = Result<ResultItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.pop_front() {
            return Some(Ok(item));
        }
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(true) => self.pending.pop_front().map(Ok),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> Vec<ResultItem> {
        JsonResultsReader::new(input.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_results_body() {
        let body = r#"{"preview":false,"init_offset":0,"messages":[{"type":"INFO","text":"Your timerange was substituted"}],"results":[{"host":"idx1","count":"12"},{"host":"idx2","tag":["a","b"]}]}"#;
        let items = read_all(body);

        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0],
            ResultItem::Message(Message::new("INFO", "Your timerange was substituted"))
        );
        assert_eq!(items[1].as_record().unwrap().get_str("count"), Some("12"));
        assert_eq!(
            items[2].as_record().unwrap().get("tag"),
            Some(&FieldValue::from(vec!["a", "b"]))
        );
    }

    #[test]
    fn test_export_lines_and_preview() {
        let stream = "{\"preview\":true,\"offset\":0,\"result\":{\"n\":1}}\n\n{\"preview\":false,\"offset\":0,\"lastrow\":true,\"result\":{\"n\":2,\"ok\":true}}\n";
        let mut reader = JsonResultsReader::new(stream.as_bytes());

        let first = reader.next().unwrap().unwrap();
        assert!(reader.is_preview());
        assert_eq!(first.as_record().unwrap().get_str("n"), Some("1"));

        let second = reader.next().unwrap().unwrap();
        assert!(!reader.is_preview());
        assert_eq!(second.as_record().unwrap().get_str("ok"), Some("true"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_message_without_type() {
        let items = read_all(r#"{"messages":[{"text":"no type"}]}"#);
        assert_eq!(
            items,
            vec![ResultItem::Message(Message::new(UNKNOWN_MESSAGE_TYPE, "no type"))]
        );
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let mut reader = JsonResultsReader::new("{\"result\":{}}\nnot json\n".as_bytes());
        assert!(reader.next().unwrap().is_ok());
        match reader.next() {
            Some(Err(ResultsError::Json { line, .. })) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
