//! Custom search commands
//!
//! A search command is an executable the search head runs as part of a
//! pipeline. It speaks one of two protocols over stdin/stdout:
//!
//! - **chunked (v2)**: one long-lived process exchanging
//!   `chunked 1.0,<m>,<b>` messages; see [`protocol_v2`]
//! - **legacy (v1)**: one process per phase, started with `__GETINFO__`
//!   or `__EXECUTE__`; see [`protocol_v1`]
//!
//! Commands implement [`CommandSpec`] plus one of [`StreamingCommand`],
//! [`EventingCommand`], [`GeneratingCommand`] or [`ReportingCommand`] and
//! hand the wrapped command to [`dispatch`]:
//!
//! ```ignore
//! fn main() {
//!     std::process::exit(dispatch(Streaming(MyCommand::default())));
//! }
//! ```
//!
//! Logs go to stderr; stdout belongs to the protocol.

pub mod chunked;
pub mod command;
pub mod context;
pub mod error;
pub mod options;
pub mod protocol_v1;
pub mod protocol_v2;
pub mod records;
pub mod search_info;
pub mod validators;

use std::io::{self, BufRead, Write};

pub use command::{
    Batch, CommandSpec, CommandType, Configuration, EventingCommand, Eventing, GeneratingCommand,
    Generating, Processor, ReportingCommand, Reporting, Streaming, StreamingCommand,
};
pub use context::{CommandContext, MessageLevel};
pub use error::{CommandError, Result};
pub use options::{Arguments, OptionSpec};
pub use search_info::SearchInfo;
pub use sp_common::{FieldValue, Record};
pub use validators::{OptionValue, Validator};

use sp_common::logging::{self, LogFormat};

/// Run against the process arguments, stdin and stdout. Returns the exit
/// status.
pub fn dispatch<P: Processor>(mut processor: P) -> i32 {
    logging::init(LogFormat::Text, tracing::Level::WARN);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let stdin = io::stdin();
    let stdout = io::stdout();
    run(&mut processor, &args, stdin.lock(), stdout.lock())
}

/// Pick the protocol from `args` (program name excluded) and run it.
pub fn run<P, R, W>(processor: &mut P, args: &[String], input: R, output: W) -> i32
where
    P: Processor + ?Sized,
    R: BufRead,
    W: Write,
{
    match args.split_first() {
        Some((action, rest)) if action == protocol_v1::GETINFO || action == protocol_v1::EXECUTE => {
            protocol_v1::run(processor, action, rest, input, output)
        }
        _ => protocol_v2::run(processor, input, output),
    }
}

/// Parse arguments, prepare the command and report its configuration when
/// `show_configuration` is set.
pub(crate) fn prepare<P: Processor + ?Sized>(
    processor: &mut P,
    ctx: &mut CommandContext,
    args: &[String],
) -> Result<Configuration> {
    let mut specs = processor.option_specs();
    specs.push(options::show_configuration());
    let arguments = options::parse_arguments(&specs, args)?;
    ctx.set_arguments(arguments);

    let config = processor.prepare(ctx)?;
    if ctx.option_bool(options::SHOW_CONFIGURATION) {
        let description = format!("{} command configuration: {}", processor.name(), config.describe());
        ctx.write_info(description);
    }
    Ok(config)
}
