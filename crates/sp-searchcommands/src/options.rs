//! Command-line options
//!
//! A command line is `name=value` options followed by field names. Values
//! and field names may be double-quoted; inside quotes `""` is a literal
//! quote and `\` escapes the next character.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{CommandError, Result};
use crate::validators::{Boolean, OptionValue, Validator};

pub const SHOW_CONFIGURATION: &str = "show_configuration";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"(?:\\.|""|[^"\\])*"|\\.|[^\s"\\])+"#).expect("token pattern is valid")
});

static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([_a-zA-Z][_.a-zA-Z0-9]*)=(.+)$").expect("option pattern is valid")
});

/// Declaration of one `name=value` option
pub struct OptionSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<OptionValue>,
    pub validator: Box<dyn Validator>,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, validator: impl Validator + 'static) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            validator: Box::new(validator),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: OptionValue) -> Self {
        self.default = Some(value);
        self
    }
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// Option that every command accepts
pub fn show_configuration() -> OptionSpec {
    OptionSpec::new(SHOW_CONFIGURATION, Boolean).default(OptionValue::Bool(false))
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    /// Validated values, defaults included
    pub options: IndexMap<String, OptionValue>,
    /// Options as written, unquoted
    pub given: Vec<(String, String)>,
    pub fieldnames: Vec<String>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.given.iter().any(|(given, _)| given == name)
    }

    /// Render back into command-line syntax, leaving out `exclude`.
    pub fn to_command_line(&self, exclude: &[&str]) -> String {
        let options = self
            .given
            .iter()
            .filter(|(name, _)| !exclude.contains(&name.as_str()))
            .map(|(name, value)| format!("{}={}", name, quote(value)));
        let fieldnames = self.fieldnames.iter().map(|name| quote(name));
        options.chain(fieldnames).collect::<Vec<_>>().join(" ")
    }
}

/// Parse `args` against `specs`.
pub fn parse_arguments(specs: &[OptionSpec], args: &[String]) -> Result<Arguments> {
    let line = args.join(" ");
    let mut arguments = Arguments::default();

    let mut consumed = 0;
    for token in TOKEN_RE.find_iter(&line) {
        let gap = &line[consumed..token.start()];
        if !gap.trim().is_empty() {
            return Err(syntax_error(&line));
        }
        consumed = token.end();

        let token = token.as_str();
        match OPTION_RE.captures(token) {
            Some(captures) => {
                if !arguments.fieldnames.is_empty() {
                    return Err(CommandError::option(format!(
                        "Syntax error: options must precede field names, found {} after {}",
                        token,
                        arguments.fieldnames.join(" ")
                    )));
                }
                let name = &captures[1];
                let value = unquote(&captures[2]);
                add_option(specs, &mut arguments, name, value)?;
            }
            None => arguments.fieldnames.push(unquote(token)),
        }
    }
    if !line[consumed..].trim().is_empty() {
        return Err(syntax_error(&line));
    }

    let missing: Vec<&str> = specs
        .iter()
        .filter(|spec| spec.required && !arguments.options.contains_key(&spec.name))
        .map(|spec| spec.name.as_str())
        .collect();
    match missing.as_slice() {
        [] => {}
        [name] => {
            return Err(CommandError::option(format!("A value for option {} is required", name)));
        }
        names => {
            return Err(CommandError::option(format!(
                "Values for these required options are missing: {}",
                names.join(", ")
            )));
        }
    }

    for spec in specs {
        if let Some(default) = &spec.default {
            if !arguments.options.contains_key(&spec.name) {
                arguments.options.insert(spec.name.clone(), default.clone());
            }
        }
    }

    Ok(arguments)
}

fn add_option(specs: &[OptionSpec], arguments: &mut Arguments, name: &str, value: String) -> Result<()> {
    let spec = specs
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| CommandError::option(format!("Unrecognized option: {}={}", name, value)))?;

    if arguments.options.contains_key(name) {
        return Err(CommandError::option(format!("Duplicate option: {}", name)));
    }

    let parsed = spec
        .validator
        .validate(&value)
        .map_err(|message| CommandError::option(format!("Invalid value for {}={}: {}", name, value, message)))?;
    arguments.options.insert(name.to_string(), parsed);
    arguments.given.push((name.to_string(), value));
    Ok(())
}

fn syntax_error(line: &str) -> CommandError {
    CommandError::option(format!("Syntax error: {}", line))
}

/// Strip surrounding quotes and resolve `""` and `\` escapes.
pub fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    let inner = if quoted { &value[1..value.len() - 1] } else { value };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => result.push(chars.next().unwrap_or('\\')),
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                result.push('"');
            }
            '"' if !quoted => {}
            c => result.push(c),
        }
    }
    result
}

/// Quote a value when it would not survive [`unquote`] as written.
pub fn quote(value: &str) -> String {
    let plain = !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\');
    if plain {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\"\""))
}
