//! Chunked transfer
//!
//! Every message of the v2 protocol is
//! `chunked 1.0,<metadata bytes>,<body bytes>\n<metadata JSON><body CSV>`.

use std::io::{BufRead, ErrorKind, Read, Write};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{CommandError, Result};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^chunked\s+1.0\s*,\s*(\d+)\s*,\s*(\d+)\s*\n").expect("chunk header pattern is valid")
});

/// One request or reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub metadata: Map<String, Value>,
    pub body: Vec<u8>,
}

impl Chunk {
    pub fn action(&self) -> Option<&str> {
        self.metadata.get("action").and_then(Value::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.metadata.get("finished").and_then(Value::as_bool).unwrap_or(false)
    }
}

pub struct ChunkedReader<R: BufRead> {
    input: R,
}

impl<R: BufRead> ChunkedReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Next chunk; `None` at end of input before a header.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut header = String::new();
        if self.input.read_line(&mut header)? == 0 {
            return Ok(None);
        }

        let captures = HEADER_RE
            .captures(&header)
            .ok_or_else(|| CommandError::protocol(format!("malformed chunk header: {:?}", header)))?;
        let metadata_length = parse_length(&captures[1])?;
        let body_length = parse_length(&captures[2])?;
        trace!(metadata_length, body_length, "Reading chunk");

        let metadata = self.read_exact(metadata_length, "metadata")?;
        let metadata = if metadata.is_empty() {
            Map::new()
        } else {
            match serde_json::from_slice(&metadata)? {
                Value::Object(map) => map,
                other => {
                    return Err(CommandError::protocol(format!(
                        "chunk metadata must be a JSON object, not {}",
                        other
                    )))
                }
            }
        };
        let body = self.read_exact(body_length, "body")?;

        Ok(Some(Chunk { metadata, body }))
    }

    fn read_exact(&mut self, length: usize, part: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        match self.input.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(CommandError::protocol(format!(
                "input ended before the {} bytes of chunk {} promised by its header",
                length, part
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_length(digits: &str) -> Result<usize> {
    digits
        .parse()
        .map_err(|_| CommandError::protocol(format!("chunk length out of range: {}", digits)))
}

pub struct ChunkedWriter<W: Write> {
    output: W,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Write one chunk and flush. Nothing is written when both parts are
    /// empty; null metadata values are dropped.
    pub fn write_chunk(&mut self, metadata: &Map<String, Value>, body: &[u8]) -> Result<()> {
        let metadata: Map<String, Value> = metadata
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let metadata = if metadata.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&metadata)?
        };

        if metadata.is_empty() && body.is_empty() {
            return Ok(());
        }

        writeln!(self.output, "chunked 1.0,{},{}", metadata.len(), body.len())?;
        self.output.write_all(&metadata)?;
        self.output.write_all(body)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_chunks_until_eof() {
        let input = b"chunked 1.0,20,0\n{\"action\":\"getinfo\"}chunked 1.0 , 36 , 4\n{\"action\":\"execute\",\"finished\":true}a\r\n1";
        let mut reader = ChunkedReader::new(&input[..]);

        let first = reader.read_chunk().unwrap().unwrap();
        assert_eq!(first.action(), Some("getinfo"));
        assert!(first.body.is_empty());

        let second = reader.read_chunk().unwrap().unwrap();
        assert_eq!(second.action(), Some("execute"));
        assert!(second.is_finished());
        assert_eq!(second.body, b"a\r\n1");

        assert!(reader.read_chunk().unwrap().is_none());
    }

    #[test]
    fn test_bad_header() {
        let mut reader = ChunkedReader::new(&b"chunked 2.0,0,0\n"[..]);
        assert!(matches!(reader.read_chunk(), Err(CommandError::Protocol(_))));
    }

    #[test]
    fn test_short_body() {
        let mut reader = ChunkedReader::new(&b"chunked 1.0,2,10\n{}abc"[..]);
        assert!(matches!(reader.read_chunk(), Err(CommandError::Protocol(_))));
    }

    #[test]
    fn test_metadata_must_be_object() {
        let mut reader = ChunkedReader::new(&b"chunked 1.0,2,0\n[]"[..]);
        assert!(matches!(reader.read_chunk(), Err(CommandError::Protocol(_))));
    }

    #[test]
    fn test_writer_drops_nulls_and_empty_chunks() {
        let mut writer = ChunkedWriter::new(Vec::new());
        writer.write_chunk(&Map::new(), b"").unwrap();

        let mut metadata = Map::new();
        metadata.insert("finished".to_string(), json!(true));
        metadata.insert("inspector".to_string(), Value::Null);
        writer.write_chunk(&metadata, b"x\n").unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(output, "chunked 1.0,17,2\n{\"finished\":true}x\n");
    }
}
