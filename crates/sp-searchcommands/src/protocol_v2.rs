//! Chunked protocol driver
//!
//! One getinfo exchange, then one reply per execute request until the
//! command reports `finished` or input ends. Output larger than
//! `maxresultrows` goes out as `partial` chunks; the search head answers
//! each with an empty execute request.

use std::io::{BufRead, Write};

use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::chunked::{Chunk, ChunkedReader, ChunkedWriter};
use crate::command::{Batch, Processor};
use crate::context::{CommandContext, MessageLevel};
use crate::error::{CommandError, Result};
use crate::records::{decode_records, encode_records};
use crate::search_info::SearchInfo;

pub fn run<P, R, W>(processor: &mut P, input: R, output: W) -> i32
where
    P: Processor + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut reader = ChunkedReader::new(input);
    let mut writer = ChunkedWriter::new(output);
    let mut ctx = CommandContext::default();

    match process(processor, &mut reader, &mut writer, &mut ctx) {
        Ok(()) => 0,
        Err(e) => {
            error!(command = processor.name(), error = %e, "Search command failed");
            ctx.write_error(e.to_string());

            let mut metadata = Map::new();
            metadata.insert("finished".into(), json!(true));
            attach_messages(&mut metadata, &mut ctx);
            if let Err(e) = writer.write_chunk(&metadata, b"") {
                error!(error = %e, "Failed to report error to the search head");
            }
            1
        }
    }
}

fn process<P, R, W>(
    processor: &mut P,
    reader: &mut ChunkedReader<R>,
    writer: &mut ChunkedWriter<W>,
    ctx: &mut CommandContext,
) -> Result<()>
where
    P: Processor + ?Sized,
    R: BufRead,
    W: Write,
{
    let getinfo = reader
        .read_chunk()?
        .ok_or_else(|| CommandError::protocol("input ended before the getinfo request"))?;
    if getinfo.action() != Some("getinfo") {
        return Err(CommandError::protocol(format!(
            "expected a getinfo request, got action {:?}",
            getinfo.action()
        )));
    }

    let search_info = match getinfo.metadata.get("searchinfo") {
        Some(value) => SearchInfo::from_value(value)?,
        None => SearchInfo::default(),
    };
    let args = search_info.args.clone();
    *ctx = CommandContext::new(search_info);

    let config = crate::prepare(processor, ctx, &args)?;
    let max_rows = ctx.search_info().maxresultrows();
    info!(command = processor.name(), command_type = %config.command_type, max_rows, "Command configured");

    let mut metadata = config.to_metadata();
    attach_messages(&mut metadata, ctx);
    writer.write_chunk(&metadata, b"")?;

    while let Some(request) = reader.read_chunk()? {
        expect_execute(&request)?;
        let records = if processor.consumes_input() {
            decode_records(&request.body)?
        } else {
            Vec::new()
        };
        debug!(count = records.len(), finished = request.is_finished(), "Execute request");

        let batch = processor.execute(records, request.is_finished(), max_rows, ctx)?;
        let finished = batch.finished;
        if !write_batch(reader, writer, ctx, batch, max_rows)? || finished {
            break;
        }
    }
    Ok(())
}

/// Write a batch, splitting it into partial chunks. False when input ended
/// while the search head was being asked for continuation.
fn write_batch<R: BufRead, W: Write>(
    reader: &mut ChunkedReader<R>,
    writer: &mut ChunkedWriter<W>,
    ctx: &mut CommandContext,
    batch: Batch,
    max_rows: usize,
) -> Result<bool> {
    let mut records = batch.records;

    while records.len() > max_rows {
        let rest = records.split_off(max_rows);
        let mut metadata = Map::new();
        metadata.insert("finished".into(), json!(false));
        metadata.insert("partial".into(), json!(true));
        attach_messages(&mut metadata, ctx);
        writer.write_chunk(&metadata, &encode_records(&records)?)?;
        records = rest;

        match reader.read_chunk()? {
            Some(request) => {
                expect_execute(&request)?;
                if !request.body.is_empty() {
                    return Err(CommandError::protocol(
                        "expected an empty execute request after a partial reply",
                    ));
                }
            }
            None => return Ok(false),
        }
    }

    let mut metadata = Map::new();
    metadata.insert("finished".into(), json!(batch.finished));
    attach_messages(&mut metadata, ctx);
    writer.write_chunk(&metadata, &encode_records(&records)?)?;
    Ok(true)
}

fn expect_execute(chunk: &Chunk) -> Result<()> {
    match chunk.action() {
        Some("execute") => Ok(()),
        other => Err(CommandError::protocol(format!(
            "expected an execute request, got action {:?}",
            other
        ))),
    }
}

fn attach_messages(metadata: &mut Map<String, Value>, ctx: &mut CommandContext) {
    let messages = ctx.take_messages();
    if messages.is_empty() {
        return;
    }
    let messages: Vec<Value> = messages
        .iter()
        .map(|(level, text): &(MessageLevel, String)| json!([level.as_str(), text]))
        .collect();
    metadata.insert("inspector".into(), json!({ "messages": messages }));
}
