//! Command kinds
//!
//! A command implements [`CommandSpec`] plus one of the kind traits and is
//! handed to the protocol drivers wrapped in the matching adapter
//! ([`Streaming`], [`Eventing`], [`Generating`], [`Reporting`]), which
//! implements [`Processor`].

use std::fmt;

use serde_json::{json, Map, Value};
use sp_common::Record;
use tracing::debug;

use crate::context::CommandContext;
use crate::error::Result;
use crate::options::{quote, OptionSpec};
use crate::validators::{OptionValue, Set};

pub const PHASE: &str = "phase";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Streaming,
    Stateful,
    Events,
    Reporting,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Streaming => "streaming",
            CommandType::Stateful => "stateful",
            CommandType::Events => "events",
            CommandType::Reporting => "reporting",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a command tells the search head at getinfo time
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub command_type: CommandType,
    pub generating: bool,
    pub required_fields: Vec<String>,
    /// Run on indexers as well as the search head
    pub distributed: bool,
    pub run_in_preview: bool,
    pub maxinputs: Option<usize>,
    pub maxwait: Option<u64>,
    pub streaming_preop: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            command_type: CommandType::Streaming,
            generating: false,
            required_fields: Vec::new(),
            distributed: true,
            run_in_preview: true,
            maxinputs: None,
            maxwait: None,
            streaming_preop: None,
        }
    }
}

impl Configuration {
    /// getinfo reply metadata of the chunked protocol
    pub fn to_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("type".into(), json!(self.command_type.as_str()));
        if self.generating {
            metadata.insert("generating".into(), json!(true));
        }
        if !self.required_fields.is_empty() {
            metadata.insert("required_fields".into(), json!(self.required_fields));
        }
        if !self.run_in_preview {
            metadata.insert("run_in_preview".into(), json!(false));
        }
        if let Some(maxwait) = self.maxwait {
            metadata.insert("maxwait".into(), json!(maxwait));
        }
        if let Some(preop) = &self.streaming_preop {
            metadata.insert("streaming_preop".into(), json!(preop));
        }
        metadata
    }

    /// getinfo settings row of the legacy protocol
    pub fn to_v1_settings(&self) -> Record {
        let flag = |b: bool| if b { "1" } else { "0" };
        let streaming = matches!(self.command_type, CommandType::Streaming | CommandType::Stateful);
        let retains_events = matches!(self.command_type, CommandType::Streaming | CommandType::Events);

        let mut settings = Record::new()
            .with("generating", flag(self.generating))
            .with("streaming", flag(streaming))
            .with("retainsevents", flag(retains_events))
            .with("supports_multivalues", "1")
            .with("requires_preop", flag(self.streaming_preop.is_some()))
            .with("local", flag(!self.distributed))
            .with("run_in_preview", flag(self.run_in_preview));
        if !self.required_fields.is_empty() {
            settings.insert("required_fields", self.required_fields.join(","));
        }
        if let Some(preop) = &self.streaming_preop {
            settings.insert("streaming_preop", preop.as_str());
        }
        if let Some(maxinputs) = self.maxinputs {
            settings.insert("maxinputs", maxinputs.to_string());
        }
        settings
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![format!("type={}", self.command_type)];
        if self.generating {
            parts.push("generating=true".into());
        }
        parts.push(format!("distributed={}", self.distributed));
        parts.push(format!("run_in_preview={}", self.run_in_preview));
        if !self.required_fields.is_empty() {
            parts.push(format!("required_fields={}", self.required_fields.join(",")));
        }
        if let Some(maxinputs) = self.maxinputs {
            parts.push(format!("maxinputs={}", maxinputs));
        }
        if let Some(preop) = &self.streaming_preop {
            parts.push(format!("streaming_preop={}", quote(preop)));
        }
        parts.join(", ")
    }
}

/// Declarations shared by every command kind
pub trait CommandSpec {
    /// Name the command is invoked by in the search language
    fn name(&self) -> &str;

    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    /// Adjust the configuration reported at getinfo time.
    fn configure(&self, _config: &mut Configuration) {}

    /// Called once options are parsed, before any records arrive.
    fn prepare(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }
}

/// Record-at-a-time processing
pub trait StreamingCommand: CommandSpec {
    fn stream(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>>;
}

/// Filters or reorders the full event set, keeping events
pub trait EventingCommand: CommandSpec {
    fn transform(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>>;
}

/// Produces records from nothing. Each call returns at most `max_rows`;
/// fewer means the generator is exhausted.
pub trait GeneratingCommand: CommandSpec {
    fn generate(&mut self, ctx: &mut CommandContext, max_rows: usize) -> Result<Vec<Record>>;
}

/// Aggregates. `map` runs distributed per chunk when `supports_map` is
/// true; `reduce` sees every record once input is finished.
pub trait ReportingCommand: CommandSpec {
    fn supports_map(&self) -> bool {
        false
    }

    fn map(&mut self, records: Vec<Record>, _ctx: &mut CommandContext) -> Result<Vec<Record>> {
        Ok(records)
    }

    fn reduce(&mut self, records: Vec<Record>, ctx: &mut CommandContext) -> Result<Vec<Record>>;
}

/// Output of one execute step
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<Record>,
    pub finished: bool,
}

/// Uniform face the drivers use for all command kinds
pub trait Processor {
    fn name(&self) -> &str;

    fn option_specs(&self) -> Vec<OptionSpec>;

    /// Run `prepare` and produce the getinfo configuration.
    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<Configuration>;

    /// Whether the command reads input records
    fn consumes_input(&self) -> bool {
        true
    }

    fn execute(
        &mut self,
        records: Vec<Record>,
        finished: bool,
        max_rows: usize,
        ctx: &mut CommandContext,
    ) -> Result<Batch>;
}

pub struct Streaming<C>(pub C);

impl<C: StreamingCommand> Processor for Streaming<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn option_specs(&self) -> Vec<OptionSpec> {
        self.0.options()
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<Configuration> {
        self.0.prepare(ctx)?;
        let mut config = Configuration::default();
        self.0.configure(&mut config);
        if !config.distributed && config.command_type == CommandType::Streaming {
            config.command_type = CommandType::Stateful;
        }
        Ok(config)
    }

    fn execute(
        &mut self,
        records: Vec<Record>,
        finished: bool,
        _max_rows: usize,
        ctx: &mut CommandContext,
    ) -> Result<Batch> {
        Ok(Batch {
            records: self.0.stream(records, ctx)?,
            finished,
        })
    }
}

pub struct Eventing<C>(pub C);

impl<C: EventingCommand> Processor for Eventing<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn option_specs(&self) -> Vec<OptionSpec> {
        self.0.options()
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<Configuration> {
        self.0.prepare(ctx)?;
        let mut config = Configuration {
            command_type: CommandType::Events,
            ..Configuration::default()
        };
        self.0.configure(&mut config);
        Ok(config)
    }

    fn execute(
        &mut self,
        records: Vec<Record>,
        finished: bool,
        _max_rows: usize,
        ctx: &mut CommandContext,
    ) -> Result<Batch> {
        Ok(Batch {
            records: self.0.transform(records, ctx)?,
            finished,
        })
    }
}

pub struct Generating<C>(pub C);

impl<C: GeneratingCommand> Processor for Generating<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn option_specs(&self) -> Vec<OptionSpec> {
        self.0.options()
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<Configuration> {
        self.0.prepare(ctx)?;
        let mut config = Configuration {
            generating: true,
            distributed: false,
            ..Configuration::default()
        };
        self.0.configure(&mut config);
        config.generating = true;
        if !config.distributed && config.command_type == CommandType::Streaming {
            config.command_type = CommandType::Stateful;
        }
        Ok(config)
    }

    fn consumes_input(&self) -> bool {
        false
    }

    fn execute(
        &mut self,
        _records: Vec<Record>,
        _finished: bool,
        max_rows: usize,
        ctx: &mut CommandContext,
    ) -> Result<Batch> {
        let records = self.0.generate(ctx, max_rows)?;
        let finished = records.len() < max_rows;
        debug!(count = records.len(), finished, "Generated records");
        Ok(Batch { records, finished })
    }
}

/// Adapter for reporting commands. Adds the `phase` option: `phase=map`
/// runs `map` per chunk, the default `phase=reduce` buffers everything and
/// reduces once.
pub struct Reporting<C> {
    command: C,
    mapping: bool,
    pending: Vec<Record>,
}

impl<C: ReportingCommand> Reporting<C> {
    pub fn new(command: C) -> Self {
        Self {
            command,
            mapping: false,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> C {
        self.command
    }
}

impl<C: ReportingCommand> Processor for Reporting<C> {
    fn name(&self) -> &str {
        self.command.name()
    }

    fn option_specs(&self) -> Vec<OptionSpec> {
        let mut specs = self.command.options();
        specs.push(OptionSpec::new(PHASE, Set::new(["map", "reduce"])).default(OptionValue::Str("reduce".into())));
        specs
    }

    fn prepare(&mut self, ctx: &mut CommandContext) -> Result<Configuration> {
        self.mapping = ctx.option(PHASE).and_then(OptionValue::as_str) == Some("map");
        self.command.prepare(ctx)?;

        let mut config = if self.mapping {
            Configuration::default()
        } else {
            Configuration {
                command_type: CommandType::Reporting,
                ..Configuration::default()
            }
        };
        self.command.configure(&mut config);

        if !self.mapping && self.command.supports_map() && config.streaming_preop.is_none() {
            let rest = ctx.arguments().to_command_line(&[PHASE]);
            let preop = if rest.is_empty() {
                format!("{} {}=\"map\"", self.command.name(), PHASE)
            } else {
                format!("{} {}=\"map\" {}", self.command.name(), PHASE, rest)
            };
            config.streaming_preop = Some(preop);
        }
        Ok(config)
    }

    fn execute(
        &mut self,
        records: Vec<Record>,
        finished: bool,
        _max_rows: usize,
        ctx: &mut CommandContext,
    ) -> Result<Batch> {
        if self.mapping {
            return Ok(Batch {
                records: self.command.map(records, ctx)?,
                finished,
            });
        }

        self.pending.extend(records);
        if !finished {
            return Ok(Batch::default());
        }
        let records = std::mem::take(&mut self.pending);
        debug!(count = records.len(), "Reducing");
        Ok(Batch {
            records: self.command.reduce(records, ctx)?,
            finished: true,
        })
    }
}
