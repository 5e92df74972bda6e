//! Legacy protocol driver
//!
//! The command is started once per phase with `__GETINFO__` or
//! `__EXECUTE__` as its first argument. Input is a `key:value` header
//! ended by a blank line, then CSV. Output is a message header
//! (`error_message=...` lines), a blank line, then CSV.

use std::io::{BufRead, Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::command::Processor;
use crate::context::{CommandContext, MessageLevel};
use crate::error::{CommandError, Result};
use crate::records::{decode_records, encode_records};
use crate::search_info::SearchInfo;

pub const GETINFO: &str = "__GETINFO__";
pub const EXECUTE: &str = "__EXECUTE__";

pub fn run<P, R, W>(processor: &mut P, action: &str, args: &[String], mut input: R, mut output: W) -> i32
where
    P: Processor + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut ctx = CommandContext::default();

    let result = process(processor, action, args, &mut input, &mut ctx)
        .and_then(|body| write_reply(&mut output, ctx.take_messages(), &body));
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(command = processor.name(), action, error = %e, "Search command failed");
            ctx.write_error(e.to_string());
            if let Err(e) = write_reply(&mut output, ctx.take_messages(), b"") {
                error!(error = %e, "Failed to report error to the search head");
            }
            1
        }
    }
}

fn process<P, R>(
    processor: &mut P,
    action: &str,
    args: &[String],
    input: &mut R,
    ctx: &mut CommandContext,
) -> Result<Vec<u8>>
where
    P: Processor + ?Sized,
    R: BufRead,
{
    let header = read_header(input)?;
    let mut search_info = match header.get("infoPath") {
        Some(path) => SearchInfo::from_info_csv(Path::new(path.trim()))?,
        None => SearchInfo::default(),
    };
    search_info.args = args.to_vec();
    *ctx = CommandContext::new(search_info);

    let config = crate::prepare(processor, ctx, args)?;

    match action {
        GETINFO => encode_records(&[config.to_v1_settings()]),
        EXECUTE => {
            let mut body = Vec::new();
            input.read_to_end(&mut body)?;
            let records = if processor.consumes_input() {
                decode_records(&body)?
            } else {
                Vec::new()
            };
            debug!(count = records.len(), "Execute request");

            let max_rows = ctx.search_info().maxresultrows();
            let mut pending = Some(records);
            let mut output = Vec::new();
            loop {
                let batch = processor.execute(pending.take().unwrap_or_default(), true, max_rows, ctx)?;
                output.extend(batch.records);
                if batch.finished {
                    break;
                }
            }
            encode_records(&output)
        }
        other => Err(CommandError::protocol(format!("unknown action {}", other))),
    }
}

/// `key:value` lines up to a blank line; lines without a key continue the
/// previous value.
pub fn read_header<R: BufRead>(input: &mut R) -> Result<IndexMap<String, String>> {
    let mut header: IndexMap<String, String> = IndexMap::new();
    let mut last_key: Option<String> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }

        match line.split_once(':') {
            Some((key, value)) if !key.is_empty() && !key.contains(char::is_whitespace) => {
                header.insert(key.to_string(), value.to_string());
                last_key = Some(key.to_string());
            }
            _ => {
                let value = last_key
                    .as_ref()
                    .and_then(|key| header.get_mut(key))
                    .ok_or_else(|| CommandError::protocol(format!("malformed header line: {:?}", line)))?;
                value.push('\n');
                value.push_str(line);
            }
        }
    }
    Ok(header)
}

fn write_reply<W: Write>(output: &mut W, messages: Vec<(MessageLevel, String)>, body: &[u8]) -> Result<()> {
    for (level, text) in messages {
        write!(output, "{}={}\r\n", level.v1_key(), text.replace(['\r', '\n'], " "))?;
    }
    output.write_all(b"\r\n")?;
    output.write_all(body)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_with_continuation() {
        let mut input = &b"authString:<auth>\n<userId>admin</userId></auth>\ninfoPath:/tmp/info.csv\n\r\nhost\nweb1\n"[..];
        let header = read_header(&mut input).unwrap();
        assert_eq!(header["authString"], "<auth>\n<userId>admin</userId></auth>");
        assert_eq!(header["infoPath"], "/tmp/info.csv");
        assert_eq!(input, b"host\nweb1\n");
    }

    #[test]
    fn test_header_must_start_with_key() {
        let mut input = &b"no key here\n\n"[..];
        assert!(matches!(read_header(&mut input), Err(CommandError::Protocol(_))));
    }
}
