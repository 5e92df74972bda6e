//! XML results reader
//!
//! Pulls `<result>` and `<msg>` items off a `<results>` stream without
//! building a tree. Export output concatenates several `<results>`
//! documents, each with its own declaration; they are read back to back.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sp_common::{FieldValue, Record};
use tracing::{debug, trace};

use crate::{Message, Result, ResultItem, ResultsError};

/// Text being collected for a value or a message
enum Capture {
    Value { depth: usize, text: String },
    Message { kind: String, text: String },
}

enum Step {
    Item(ResultItem),
    Continue,
    Eof,
}

pub struct ResultsReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    is_preview: bool,
    record: Option<Record>,
    field: Option<(String, Vec<String>)>,
    capture: Option<Capture>,
    done: bool,
}

impl<R: BufRead> ResultsReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            is_preview: false,
            record: None,
            field: None,
            capture: None,
            done: false,
        }
    }

    /// Whether the most recent `<results>` document was a preview
    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    fn read_item(&mut self) -> Result<Option<ResultItem>> {
        let mut buf = std::mem::take(&mut self.buf);
        let outcome = loop {
            buf.clear();
            match self.step(&mut buf) {
                Ok(Step::Continue) => continue,
                Ok(Step::Item(item)) => break Ok(Some(item)),
                Ok(Step::Eof) => break Ok(None),
                Err(e) => break Err(e),
            }
        };
        self.buf = buf;
        outcome
    }

    fn step(&mut self, buf: &mut Vec<u8>) -> Result<Step> {
        let event = match self.reader.read_event_into(buf) {
            Ok(event) => event,
            Err(e) => return Err(self.error(e)),
        };

        match event {
            Event::Start(ref start) => {
                if let Some(Capture::Value { depth, .. }) = &mut self.capture {
                    // highlighting markup inside <v>
                    *depth += 1;
                    return Ok(Step::Continue);
                }
                self.open(start, false)
            }
            Event::Empty(ref start) => {
                if self.capture.is_some() {
                    return Ok(Step::Continue);
                }
                self.open(start, true)
            }
            Event::Text(ref text) => {
                if self.capture.is_none() {
                    return Ok(Step::Continue);
                }
                let unescaped = match text.unescape() {
                    Ok(unescaped) => unescaped.into_owned(),
                    Err(e) => return Err(self.error(e)),
                };
                if let Some(capture) = &mut self.capture {
                    capture.push(&unescaped);
                }
                Ok(Step::Continue)
            }
            Event::CData(ref data) => {
                if let Some(capture) = &mut self.capture {
                    capture.push(&String::from_utf8_lossy(data.as_ref()));
                }
                Ok(Step::Continue)
            }
            Event::End(ref end) => {
                let name = end.local_name();
                Ok(self.close(name.as_ref()))
            }
            Event::Eof => {
                if self.record.is_some() {
                    debug!("Results stream ended inside a <result>; dropping it");
                }
                Ok(Step::Eof)
            }
            _ => Ok(Step::Continue),
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<Step> {
        match start.local_name().as_ref() {
            b"results" => {
                self.is_preview = attribute(start, b"preview").as_deref() == Some("1");
                trace!(preview = self.is_preview, "Results document");
            }
            b"result" => {
                if empty {
                    return Ok(Step::Item(ResultItem::Result(Record::new())));
                }
                self.record = Some(Record::new());
            }
            b"field" if self.record.is_some() => {
                let key = attribute(start, b"k").unwrap_or_default();
                if empty {
                    if let Some(record) = &mut self.record {
                        record.insert(key, FieldValue::Single(String::new()));
                    }
                } else {
                    self.field = Some((key, Vec::new()));
                }
            }
            b"text" | b"v" if self.field.is_some() => {
                if empty {
                    if let Some((_, values)) = &mut self.field {
                        values.push(String::new());
                    }
                } else {
                    self.capture = Some(Capture::Value {
                        depth: 0,
                        text: String::new(),
                    });
                }
            }
            b"msg" => {
                let kind = attribute(start, b"type").unwrap_or_default();
                if empty {
                    return Ok(Step::Item(ResultItem::Message(Message::new(kind, ""))));
                }
                self.capture = Some(Capture::Message {
                    kind,
                    text: String::new(),
                });
            }
            _ => {}
        }
        Ok(Step::Continue)
    }

    fn close(&mut self, name: &[u8]) -> Step {
        match self.capture.take() {
            Some(Capture::Value { depth, text }) if depth > 0 => {
                self.capture = Some(Capture::Value { depth: depth - 1, text });
                return Step::Continue;
            }
            Some(Capture::Value { text, .. }) => {
                if let Some((_, values)) = &mut self.field {
                    values.push(text);
                }
                return Step::Continue;
            }
            Some(Capture::Message { kind, text }) => {
                return Step::Item(ResultItem::Message(Message::new(kind, text)));
            }
            None => {}
        }

        match name {
            b"field" => {
                if let (Some((key, mut values)), Some(record)) = (self.field.take(), &mut self.record) {
                    let value = if values.len() == 1 {
                        FieldValue::Single(values.remove(0))
                    } else {
                        FieldValue::Multi(values)
                    };
                    record.insert(key, value);
                }
                Step::Continue
            }
            b"result" => match self.record.take() {
                Some(record) => Step::Item(ResultItem::Result(record)),
                None => Step::Continue,
            },
            _ => Step::Continue,
        }
    }

    fn error(&self, e: quick_xml::Error) -> ResultsError {
        ResultsError::Xml {
            position: self.reader.buffer_position(),
            message: e.to_string(),
        }
    }
}

impl Capture {
    fn push(&mut self, s: &str) {
        match self {
            Capture::Value { text, .. } | Capture::Message { text, .. } => text.push_str(s),
        }
    }
}

fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| {
            attr.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
        })
}

impl<R: BufRead> Iterator for ResultsReader<R> {
    type Item = Result<ResultItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
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
