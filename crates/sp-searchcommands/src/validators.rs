//! Option validators
//!
//! A validator turns the raw text of a `name=value` option into a typed
//! [`OptionValue`] and formats typed values back into option syntax.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static FIELDNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_.a-zA-Z-][_.a-zA-Z0-9-]*$").expect("fieldname pattern is valid"));

static OPTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w&&\D]\w*$").expect("option name pattern is valid"));

const TRUE_VALUES: &[&str] = &["1", "true", "t", "y", "yes", "on"];
const FALSE_VALUES: &[&str] = &["0", "false", "f", "n", "no", "off"];

/// Typed option value
#[derive(Debug, Clone)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Seconds
    Duration(u64),
    List(Vec<OptionValue>),
    Regex(Regex),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(f) => Some(*f),
            OptionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<u64> {
        match self {
            OptionValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[OptionValue]> {
        match self {
            OptionValue::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<&Regex> {
        match self {
            OptionValue::Regex(re) => Some(re),
            _ => None,
        }
    }
}

impl PartialEq for OptionValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OptionValue::Bool(a), OptionValue::Bool(b)) => a == b,
            (OptionValue::Int(a), OptionValue::Int(b)) => a == b,
            (OptionValue::Float(a), OptionValue::Float(b)) => a == b,
            (OptionValue::Str(a), OptionValue::Str(b)) => a == b,
            (OptionValue::Duration(a), OptionValue::Duration(b)) => a == b,
            (OptionValue::List(a), OptionValue::List(b)) => a == b,
            (OptionValue::Regex(a), OptionValue::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => f.write_str(if *b { "t" } else { "f" }),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Str(s) => f.write_str(s),
            OptionValue::Duration(seconds) => f.write_str(&format_duration(*seconds)),
            OptionValue::List(values) => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&items.join(","))
            }
            OptionValue::Regex(re) => f.write_str(re.as_str()),
        }
    }
}

/// Converts option text to a typed value. Errors are messages meant for
/// the search user.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &str) -> Result<OptionValue, String>;

    fn format(&self, value: &OptionValue) -> String {
        value.to_string()
    }
}

pub struct Boolean;

impl Validator for Boolean {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        let lowered = value.to_ascii_lowercase();
        if TRUE_VALUES.contains(&lowered.as_str()) {
            Ok(OptionValue::Bool(true))
        } else if FALSE_VALUES.contains(&lowered.as_str()) {
            Ok(OptionValue::Bool(false))
        } else {
            Err(format!("Unrecognized truth value: {}", value))
        }
    }
}

#[derive(Default)]
pub struct Integer {
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

impl Integer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(minimum: i64, maximum: i64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    pub fn at_least(minimum: i64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: None,
        }
    }
}

impl Validator for Integer {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        let parsed: i64 = value
            .trim()
            .parse()
            .map_err(|_| format!("Expected integer value, not {:?}", value))?;
        check_range(parsed, self.minimum, self.maximum, "integer")?;
        Ok(OptionValue::Int(parsed))
    }
}

#[derive(Default)]
pub struct Float {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl Float {
    pub fn range(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }
}

impl Validator for Float {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("Expected float value, not {:?}", value))?;
        if !parsed.is_finite() {
            return Err(format!("Expected float value, not {:?}", value));
        }
        check_range(parsed, self.minimum, self.maximum, "float")?;
        Ok(OptionValue::Float(parsed))
    }
}

fn check_range<T: PartialOrd + fmt::Display>(
    value: T,
    minimum: Option<T>,
    maximum: Option<T>,
    kind: &str,
) -> Result<(), String> {
    let below = minimum.as_ref().is_some_and(|min| value < *min);
    let above = maximum.as_ref().is_some_and(|max| value > *max);
    if !(below || above) {
        return Ok(());
    }
    let minimum = minimum.map_or_else(|| "-∞".to_string(), |min| min.to_string());
    let maximum = maximum.map_or_else(|| "+∞".to_string(), |max| max.to_string());
    Err(format!(
        "Expected {} in the range [{},{}], not {}",
        kind, minimum, maximum, value
    ))
}

/// `[[HH:]MM:]SS` to seconds
pub struct Duration;

impl Validator for Duration {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        let invalid = || format!("Invalid duration value: {}", value);
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let numbers = parts
            .iter()
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<u64>, String>>()?;

        let seconds = match numbers.as_slice() {
            [s] => Some(*s),
            [m, s] if *s < 60 => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
            [h, m, s] if *m < 60 && *s < 60 => h
                .checked_mul(3600)
                .and_then(|h| h.checked_add(m * 60 + s)),
            _ => None,
        };
        seconds.map(OptionValue::Duration).ok_or_else(invalid)
    }
}

pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

pub struct Fieldname;

impl Validator for Fieldname {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        if FIELDNAME_RE.is_match(value) {
            Ok(OptionValue::Str(value.to_string()))
        } else {
            Err(format!("Illegal characters in fieldname: {}", value))
        }
    }
}

pub struct OptionName;

impl Validator for OptionName {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        if OPTION_NAME_RE.is_match(value) {
            Ok(OptionValue::Str(value.to_string()))
        } else {
            Err(format!("Illegal characters in option name: {}", value))
        }
    }
}

/// Comma-separated values, optionally validated one by one
#[derive(Default)]
pub struct List {
    pub validator: Option<Box<dyn Validator>>,
}

impl List {
    pub fn of(validator: impl Validator + 'static) -> Self {
        Self {
            validator: Some(Box::new(validator)),
        }
    }
}

impl Validator for List {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(value.as_bytes());
        let row = match reader.records().next() {
            Some(row) => row.map_err(|e| format!("Invalid list value {:?}: {}", value, e))?,
            None => return Ok(OptionValue::List(Vec::new())),
        };

        let values = row
            .iter()
            .map(|item| match &self.validator {
                Some(validator) => validator.validate(item),
                None => Ok(OptionValue::Str(item.to_string())),
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(OptionValue::List(values))
    }

    fn format(&self, value: &OptionValue) -> String {
        match value {
            OptionValue::List(values) => {
                let mut writer = csv::WriterBuilder::new()
                    .terminator(csv::Terminator::Any(b'\n'))
                    .from_writer(Vec::new());
                let items: Vec<String> = values
                    .iter()
                    .map(|item| match &self.validator {
                        Some(validator) => validator.format(item),
                        None => item.to_string(),
                    })
                    .collect();
                if writer.write_record(&items).is_err() {
                    return items.join(",");
                }
                match writer.into_inner() {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).trim_end_matches('\n').to_string(),
                    Err(_) => items.join(","),
                }
            }
            other => other.to_string(),
        }
    }
}

/// Translates keywords into values
pub struct Map {
    pub mapping: HashMap<String, OptionValue>,
}

impl Map {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, OptionValue)>) -> Self {
        Self {
            mapping: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Validator for Map {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        self.mapping
            .get(value)
            .cloned()
            .ok_or_else(|| format!("Unrecognized value: {}", value))
    }

    fn format(&self, value: &OptionValue) -> String {
        self.mapping
            .iter()
            .find(|(_, mapped)| *mapped == value)
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| value.to_string())
    }
}

/// Value must match a pattern, anchored at the start
pub struct Match {
    name: String,
    pattern: Regex,
}

impl Match {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(&format!("^(?:{})", pattern))?,
        })
    }
}

impl Validator for Match {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        if self.pattern.is_match(value) {
            Ok(OptionValue::Str(value.to_string()))
        } else {
            Err(format!("Expected {}, not {}", self.name, value))
        }
    }
}

pub struct RegularExpression;

impl Validator for RegularExpression {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        Regex::new(value)
            .map(OptionValue::Regex)
            .map_err(|e| format!("Invalid regular expression {:?}: {}", value, e))
    }
}

/// Value must be one of a fixed set
pub struct Set {
    members: Vec<String>,
}

impl Set {
    pub fn new<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for Set {
    fn validate(&self, value: &str) -> Result<OptionValue, String> {
        if self.members.iter().any(|member| member == value) {
            Ok(OptionValue::Str(value.to_string()))
        } else {
            Err(format!("Unrecognized value: {}", value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean() {
        for value in ["1", "TRUE", "t", "Yes", "on"] {
            assert_eq!(Boolean.validate(value), Ok(OptionValue::Bool(true)));
        }
        for value in ["0", "false", "F", "no", "OFF"] {
            assert_eq!(Boolean.validate(value), Ok(OptionValue::Bool(false)));
        }
        assert_eq!(
            Boolean.validate("maybe"),
            Err("Unrecognized truth value: maybe".to_string())
        );
        assert_eq!(Boolean.format(&OptionValue::Bool(true)), "t");
    }

    #[test]
    fn test_integer_range() {
        let validator = Integer::range(1, 10);
        assert_eq!(validator.validate("10"), Ok(OptionValue::Int(10)));
        assert_eq!(
            validator.validate("11"),
            Err("Expected integer in the range [1,10], not 11".to_string())
        );
        assert!(validator.validate("ten").is_err());
        assert!(Integer::at_least(0).validate("-1").unwrap_err().contains("+∞"));
    }

    #[test]
    fn test_float() {
        assert_eq!(Float::default().validate("0.5"), Ok(OptionValue::Float(0.5)));
        assert!(Float::range(0.0, 1.0).validate("1.5").is_err());
        assert!(Float::default().validate("NaN").is_err());
    }

    #[test]
    fn test_duration() {
        assert_eq!(Duration.validate("42"), Ok(OptionValue::Duration(42)));
        assert_eq!(Duration.validate("2:05"), Ok(OptionValue::Duration(125)));
        assert_eq!(Duration.validate("1:00:01"), Ok(OptionValue::Duration(3601)));
        assert!(Duration.validate("1:60").is_err());
        assert!(Duration.validate("1:2:3:4").is_err());
        assert!(Duration.validate("").is_err());
        assert_eq!(Duration.format(&OptionValue::Duration(3725)), "01:02:05");
    }

    #[test]
    fn test_duration_overflow_is_invalid() {
        assert_eq!(
            Duration.validate("5124095576030432:00:00"),
            Err("Invalid duration value: 5124095576030432:00:00".to_string())
        );
        assert!(Duration.validate("307445734561825861:00").is_err());
        assert!(Duration.validate("18446744073709551616").is_err());
        assert_eq!(
            Duration.validate("5124095576030431:00:00"),
            Ok(OptionValue::Duration(5_124_095_576_030_431 * 3600))
        );
    }

    #[test]
    fn test_names() {
        assert!(Fieldname.validate("host.name-1").is_ok());
        assert!(Fieldname.validate("1abc").is_err());
        assert!(Fieldname.validate("a b").is_err());
        assert!(OptionName.validate("max_count2").is_ok());
        assert!(OptionName.validate("2count").is_err());
    }

    #[test]
    fn test_list() {
        assert_eq!(
            List::default().validate("a,\"b,c\""),
            Ok(OptionValue::List(vec![
                OptionValue::Str("a".into()),
                OptionValue::Str("b,c".into())
            ]))
        );
        let ints = List::of(Integer::new());
        assert_eq!(
            ints.validate("1,2"),
            Ok(OptionValue::List(vec![OptionValue::Int(1), OptionValue::Int(2)]))
        );
        assert!(ints.validate("1,x").is_err());
        assert_eq!(List::default().format(&List::default().validate("a,\"b,c\"").unwrap()), "a,\"b,c\"");
    }

    #[test]
    fn test_map_match_set_regex() {
        let map = Map::new([("low", OptionValue::Int(1)), ("high", OptionValue::Int(9))]);
        assert_eq!(map.validate("high"), Ok(OptionValue::Int(9)));
        assert_eq!(map.format(&OptionValue::Int(1)), "low");
        assert!(map.validate("medium").is_err());

        let ip = Match::new("an IPv4 address", r"\d+\.\d+\.\d+\.\d+").unwrap();
        assert!(ip.validate("10.0.0.1").is_ok());
        assert_eq!(ip.validate("x"), Err("Expected an IPv4 address, not x".to_string()));

        let set = Set::new(["map", "reduce"]);
        assert!(set.validate("map").is_ok());
        assert_eq!(set.validate("both"), Err("Unrecognized value: both".to_string()));

        assert!(RegularExpression.validate("^a+$").unwrap().as_regex().unwrap().is_match("aaa"));
        assert!(RegularExpression.validate("(").is_err());
    }
}
