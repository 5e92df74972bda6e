use std::io::Write;

use regex::Regex;
use serde_json::{json, Value};
use sp_searchcommands::chunked::{Chunk, ChunkedReader};
use sp_searchcommands::records::decode_records;
use sp_searchcommands::validators::{Duration, Fieldname, Integer, RegularExpression};
use sp_searchcommands::{
    run, CommandContext, CommandError, CommandSpec, Configuration, FieldValue, Generating,
    GeneratingCommand, OptionSpec, OptionValue, Record, Reporting, ReportingCommand, Result,
    Streaming, StreamingCommand,
};

// ============================================================================
// Commands under test
// ============================================================================

/// `countmatches fieldname=<out> pattern=<regex> <field>...`
#[derive(Default)]
struct CountMatches {
    output: String,
    pattern: Option<Regex>,
}

impl CommandSpec for CountMatches {
    fn name(&self) -> &str {
        "countmatches"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::new("fieldname", Fieldname).required(),
            OptionSpec::new("pattern", RegularExpression).required(),
        ]
    }

    fn configure(&self, config: &mut Configuration) {
        config.required_fields = vec!["text".into()];
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<()> {
        self.output = ctx.option_str("fieldname").unwrap_or_default().to_string();
        self.pattern = ctx.option("pattern").and_then(OptionValue::as_regex).cloned();
        if ctx.fieldnames().is_empty() {
            return Err(CommandError::command("countmatches needs at least one field"));
        }
        Ok(())
    }
}

impl StreamingCommand for CountMatches {
    fn stream(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| CommandError::command("no pattern"))?;
        Ok(records
            .into_iter()
            .map(|mut record| {
                let count: usize = ctx
                    .fieldnames()
                    .iter()
                    .filter_map(|field| record.get(field))
                    .flat_map(|value| value.values())
                    .map(|value| pattern.find_iter(value).count())
                    .sum();
                record.insert(self.output.clone(), count.to_string());
                record
            })
            .collect())
    }
}

/// `generatehello count=<n>`
#[derive(Default)]
struct GenerateHello {
    remaining: i64,
    next: i64,
}

impl CommandSpec for GenerateHello {
    fn name(&self) -> &str {
        "generatehello"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new("count", Integer::at_least(0)).required()]
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<()> {
        self.remaining = ctx.option_int("count").unwrap_or(0);
        Ok(())
    }
}

impl GeneratingCommand for GenerateHello {
    fn generate(&mut self, _ctx: &mut CommandContext, max_rows: usize) -> Result<Vec<Record>> {
        let take = self.remaining.min(max_rows as i64);
        let records = (0..take)
            .map(|i| {
                Record::new()
                    .with("_serial", (self.next + i + 1).to_string())
                    .with("_raw", format!("Hello World {}", self.next + i + 1))
            })
            .collect();
        self.next += take;
        self.remaining -= take;
        Ok(records)
    }
}

/// `bucket span=<duration>`
#[derive(Default)]
struct Bucket {
    span: u64,
}

impl CommandSpec for Bucket {
    fn name(&self) -> &str {
        "bucket"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new("span", Duration).required()]
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<()> {
        self.span = ctx.option("span").and_then(OptionValue::as_duration).unwrap_or(0);
        Ok(())
    }
}

impl StreamingCommand for Bucket {
    fn stream(&mut self, records: Vec<Record>, _ctx: &mut CommandContext) -> Result<Vec<Record>> {
        let span = self.span.max(1);
        Ok(records
            .into_iter()
            .map(|mut record| {
                let time: u64 = record.get_str("_time").and_then(|t| t.parse().ok()).unwrap_or(0);
                record.insert("bucket", (time - time % span).to_string());
                record
            })
            .collect())
    }
}

/// `sum <field>...`
#[derive(Default)]
struct Sum;

impl CommandSpec for Sum {
    fn name(&self) -> &str {
        "sum"
    }
}

impl ReportingCommand for Sum {
    fn supports_map(&self) -> bool {
        true
    }

    fn map(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>> {
        Ok(vec![totals(&records, ctx)])
    }

    fn reduce(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>> {
        Ok(vec![totals(&records, ctx)])
    }
}

fn totals(records: &[Record], ctx: &CommandContext) -> Record {
    ctx.fieldnames()
        .iter()
        .map(|field| {
            let total: f64 = records
                .iter()
                .filter_map(|record| record.get_str(field))
                .filter_map(|value| value.parse::<f64>().ok())
                .sum();
            (field.clone(), total.to_string())
        })
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn chunk(metadata: Value, body: &str) -> Vec<u8> {
    let metadata = metadata.to_string();
    format!("chunked 1.0,{},{}\n{}{}", metadata.len(), body.len(), metadata, body).into_bytes()
}

fn getinfo(args: &[&str], maxresultrows: Option<usize>) -> Vec<u8> {
    let mut searchinfo = json!({
        "args": args,
        "sid": "1700000000.7",
        "app": "search",
        "owner": "admin",
        "splunkd_uri": "https://127.0.0.1:8089",
        "session_key": "abc",
    });
    if let Some(rows) = maxresultrows {
        searchinfo["maxresultrows"] = json!(rows);
    }
    chunk(json!({ "action": "getinfo", "preview": false, "searchinfo": searchinfo }), "")
}

fn execute(finished: bool, body: &str) -> Vec<u8> {
    chunk(json!({ "action": "execute", "finished": finished }), body)
}

fn run_v2<P: sp_searchcommands::Processor>(mut processor: P, requests: &[Vec<u8>]) -> (i32, Vec<Chunk>) {
    let input = requests.concat();
    let mut output = Vec::new();
    let status = run(&mut processor, &[], &input[..], &mut output);

    let mut reader = ChunkedReader::new(&output[..]);
    let mut replies = Vec::new();
    while let Some(reply) = reader.read_chunk().unwrap() {
        replies.push(reply);
    }
    (status, replies)
}

fn metadata(chunk: &Chunk) -> Value {
    Value::Object(chunk.metadata.clone())
}

fn args(line: &[&str]) -> Vec<String> {
    line.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Chunked protocol
// ============================================================================

#[test]
fn test_streaming_command() {
    let (status, replies) = run_v2(
        Streaming(CountMatches::default()),
        &[
            getinfo(&["fieldname=matches", "pattern=[0-9]+", "text"], None),
            execute(false, "text,__mv_text\nab12cd345,\nnone,\n"),
            execute(true, "text,__mv_text\n\"a1\nb2\",$a1$;$b2$\n"),
        ],
    );

    assert_eq!(status, 0);
    assert_eq!(replies.len(), 3);
    assert_eq!(
        metadata(&replies[0]),
        json!({ "type": "streaming", "required_fields": ["text"] })
    );

    assert_eq!(metadata(&replies[1]), json!({ "finished": false }));
    let first = decode_records(&replies[1].body).unwrap();
    assert_eq!(first[0].get_str("matches"), Some("2"));
    assert_eq!(first[1].get_str("matches"), Some("0"));

    assert_eq!(metadata(&replies[2]), json!({ "finished": true }));
    let second = decode_records(&replies[2].body).unwrap();
    assert_eq!(second[0].get("text"), Some(&FieldValue::from(vec!["a1", "b2"])));
    assert_eq!(second[0].get_str("matches"), Some("2"));
}

#[test]
fn test_generating_command_respects_maxresultrows() {
    let (status, replies) = run_v2(
        Generating(GenerateHello::default()),
        &[
            getinfo(&["count=5"], Some(2)),
            execute(true, ""),
            execute(true, ""),
            execute(true, ""),
        ],
    );

    assert_eq!(status, 0);
    assert_eq!(
        metadata(&replies[0]),
        json!({ "type": "stateful", "generating": true })
    );

    let counts: Vec<usize> = replies[1..]
        .iter()
        .map(|reply| decode_records(&reply.body).unwrap().len())
        .collect();
    assert_eq!(counts, vec![2, 2, 1]);
    assert!(!replies[1].is_finished());
    assert!(!replies[2].is_finished());
    assert!(replies[3].is_finished());

    let last = decode_records(&replies[3].body).unwrap();
    assert_eq!(last[0].get_str("_raw"), Some("Hello World 5"));
}

#[test]
fn test_reporting_command_reduces_once() {
    let (status, replies) = run_v2(
        Reporting::new(Sum),
        &[
            getinfo(&["value"], None),
            execute(false, "value\n1\n2\n"),
            execute(true, "value\n3.5\n"),
        ],
    );

    assert_eq!(status, 0);
    assert_eq!(
        metadata(&replies[0]),
        json!({ "type": "reporting", "streaming_preop": "sum phase=\"map\" value" })
    );
    assert_eq!(metadata(&replies[1]), json!({ "finished": false }));
    assert!(replies[1].body.is_empty());

    assert!(replies[2].is_finished());
    let totals = decode_records(&replies[2].body).unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].get_str("value"), Some("6.5"));
}

#[test]
fn test_reporting_map_phase_streams() {
    let (status, replies) = run_v2(
        Reporting::new(Sum),
        &[
            getinfo(&["phase=map", "value"], None),
            execute(false, "value\n1\n2\n"),
            execute(true, "value\n4\n"),
        ],
    );

    assert_eq!(status, 0);
    assert_eq!(metadata(&replies[0]), json!({ "type": "streaming" }));
    assert_eq!(decode_records(&replies[1].body).unwrap()[0].get_str("value"), Some("3"));
    assert_eq!(decode_records(&replies[2].body).unwrap()[0].get_str("value"), Some("4"));
}

#[test]
fn test_large_output_is_sent_in_partial_chunks() {
    let (status, replies) = run_v2(
        Streaming(CountMatches::default()),
        &[
            getinfo(&["fieldname=n", "pattern=x", "text"], Some(2)),
            execute(true, "text\nx\nxx\nxxx\n"),
            execute(false, ""),
        ],
    );

    assert_eq!(status, 0);
    assert_eq!(replies.len(), 3);
    assert_eq!(metadata(&replies[1]), json!({ "finished": false, "partial": true }));
    assert_eq!(decode_records(&replies[1].body).unwrap().len(), 2);
    assert!(replies[2].is_finished());
    assert_eq!(decode_records(&replies[2].body).unwrap()[0].get_str("n"), Some("3"));
}

#[test]
fn test_option_error_is_reported_through_inspector() {
    let (status, replies) = run_v2(
        Streaming(CountMatches::default()),
        &[getinfo(&["fieldname=n", "pattern=x", "bogus=1", "text"], None)],
    );

    assert_eq!(status, 1);
    assert_eq!(replies.len(), 1);
    assert_eq!(
        metadata(&replies[0]),
        json!({
            "finished": true,
            "inspector": { "messages": [["ERROR", "Unrecognized option: bogus=1"]] }
        })
    );
}

#[test]
fn test_duration_option() {
    let (status, replies) = run_v2(
        Streaming(Bucket::default()),
        &[getinfo(&["span=1:00"], None), execute(true, "_time\n125\n")],
    );

    assert_eq!(status, 0);
    let records = decode_records(&replies[1].body).unwrap();
    assert_eq!(records[0].get_str("bucket"), Some("120"));
}

#[test]
fn test_overflowing_duration_is_reported_through_inspector() {
    let (status, replies) = run_v2(
        Streaming(Bucket::default()),
        &[getinfo(&["span=5124095576030432:00:00"], None)],
    );

    assert_eq!(status, 1);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].is_finished());
    let message = &replies[0].metadata["inspector"]["messages"][0];
    assert_eq!(message[0], json!("ERROR"));
    assert!(message[1]
        .as_str()
        .unwrap()
        .starts_with("Invalid value for span=5124095576030432:00:00"));
}

#[test]
fn test_command_error_is_reported_through_inspector() {
    let (status, replies) = run_v2(
        Streaming(CountMatches::default()),
        &[getinfo(&["fieldname=n", "pattern=x"], None)],
    );

    assert_eq!(status, 1);
    assert_eq!(
        replies[0].metadata["inspector"]["messages"][0],
        json!(["ERROR", "countmatches needs at least one field"])
    );
}

#[test]
fn test_first_request_must_be_getinfo() {
    let (status, replies) = run_v2(Streaming(CountMatches::default()), &[execute(true, "")]);
    assert_eq!(status, 1);
    assert!(replies[0].is_finished());
}

#[test]
fn test_show_configuration() {
    let (status, replies) = run_v2(
        Generating(GenerateHello::default()),
        &[getinfo(&["count=0", "show_configuration=t"], None), execute(true, "")],
    );

    assert_eq!(status, 0);
    let messages = &replies[0].metadata["inspector"]["messages"];
    assert_eq!(messages[0][0], json!("INFO"));
    assert!(messages[0][1]
        .as_str()
        .unwrap()
        .starts_with("generatehello command configuration: type=stateful"));
    assert!(replies[1].is_finished());
    assert!(replies[1].body.is_empty());
}

// ============================================================================
// Legacy protocol
// ============================================================================

#[test]
fn test_v1_getinfo() {
    let mut output = Vec::new();
    let status = run(
        &mut Streaming(CountMatches::default()),
        &args(&["__GETINFO__", "fieldname=n", "pattern=x", "text"]),
        &b"\n"[..],
        &mut output,
    );

    assert_eq!(status, 0);
    let output = String::from_utf8(output).unwrap();
    let csv = output.strip_prefix("\r\n").unwrap();
    let settings = decode_records(csv.as_bytes()).unwrap();
    assert_eq!(settings[0].get_str("streaming"), Some("1"));
    assert_eq!(settings[0].get_str("generating"), Some("0"));
    assert_eq!(settings[0].get_str("required_fields"), Some("text"));
}

#[test]
fn test_v1_execute_with_info_file() {
    let dir = tempfile::tempdir().unwrap();
    let info_path = dir.path().join("info.csv");
    let mut info = std::fs::File::create(&info_path).unwrap();
    writeln!(info, "_sid,_auth_token,_splunkd_uri,_ppc.app,_ppc.user").unwrap();
    writeln!(info, "sched_1,tok,https://localhost:8089,search,admin").unwrap();
    drop(info);

    let input = format!("infoPath:{}\n\ntext\nab1\n", info_path.display());
    let mut output = Vec::new();
    let mut processor = Streaming(CountMatches::default());
    let status = run(
        &mut processor,
        &args(&["__EXECUTE__", "fieldname=n", "pattern=[a-z]", "text"]),
        input.as_bytes(),
        &mut output,
    );

    assert_eq!(status, 0);
    let output = String::from_utf8(output).unwrap();
    let csv = output.strip_prefix("\r\n").unwrap();
    let records = decode_records(csv.as_bytes()).unwrap();
    assert_eq!(records[0].get_str("n"), Some("2"));
}

#[test]
fn test_v1_error_message_header() {
    let mut output = Vec::new();
    let status = run(
        &mut Streaming(CountMatches::default()),
        &args(&["__EXECUTE__", "pattern=x", "text"]),
        &b"\ntext\nx\n"[..],
        &mut output,
    );

    assert_eq!(status, 1);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "error_message=A value for option fieldname is required\r\n\r\n"
    );
}
