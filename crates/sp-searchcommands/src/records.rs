//! Record codec
//!
//! Records travel as CSV. Each field `f` has a companion column `__mv_f`:
//! empty for single values, `$a$;$b$` (with `$` doubled) for multi-values,
//! in which case `f` holds the values joined by newlines.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use sp_common::{FieldValue, Record};

use crate::error::Result;

pub const MV_PREFIX: &str = "__mv_";

static ENCODED_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$((?:\$\$|[^$])*)\$(?:;|$)").expect("multi-value pattern is valid")
});

/// `(value column, __mv_ column)` for one field value
pub fn encode_value(value: &FieldValue) -> (String, String) {
    match value {
        FieldValue::Single(value) => (value.clone(), String::new()),
        FieldValue::Multi(values) => match values.as_slice() {
            [] => (String::new(), String::new()),
            [single] => (single.clone(), String::new()),
            values => {
                let joined = values.join("\n");
                let encoded = values
                    .iter()
                    .map(|value| format!("${}$", value.replace('$', "$$")))
                    .collect::<Vec<_>>()
                    .join(";");
                (joined, encoded)
            }
        },
    }
}

/// Values of an `__mv_` column
pub fn decode_multivalue(encoded: &str) -> Vec<String> {
    ENCODED_VALUE_RE
        .captures_iter(encoded)
        .map(|captures| captures[1].replace("$$", "$"))
        .collect()
}

/// Field names of `records` in first-seen order
pub fn fieldnames<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<String> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for record in records {
        names.extend(record.fieldnames());
    }
    names.into_iter().map(str::to_string).collect()
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

/// Encode records as CSV with `__mv_` companion columns. The header is the
/// union of all field names. No records means no output at all.
pub fn encode_records(records: &[Record]) -> Result<Vec<u8>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let names = fieldnames(records);
    let mut writer = csv_writer();

    let header = names
        .iter()
        .flat_map(|name| [name.clone(), format!("{}{}", MV_PREFIX, name)]);
    writer.write_record(header)?;

    for record in records {
        let mut row = Vec::with_capacity(names.len() * 2);
        for name in &names {
            let (value, multi) = record.get(name).map(encode_value).unwrap_or_default();
            row.push(value);
            row.push(multi);
        }
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Decode CSV with optional `__mv_` columns. A non-empty `__mv_f` turns `f`
/// into a multi-value; `__mv_` columns never appear as fields.
pub fn decode_records(body: &[u8]) -> Result<Vec<Record>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(body);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (name, value) in headers.iter().zip(row.iter()) {
            match name.strip_prefix(MV_PREFIX) {
                Some(field) => {
                    if !value.is_empty() {
                        record.insert(field, FieldValue::Multi(decode_multivalue(value)));
                    }
                }
                None => {
                    if !record.contains(name) {
                        record.insert(name, value);
                    }
                }
            }
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_multivalue() {
        let value = FieldValue::from(vec!["a", "b$c"]);
        assert_eq!(
            encode_value(&value),
            ("a\nb$c".to_string(), "$a$;$b$$c$".to_string())
        );
        assert_eq!(
            encode_value(&FieldValue::from(vec!["only"])),
            ("only".to_string(), String::new())
        );
        assert_eq!(encode_value(&FieldValue::Multi(vec![])), (String::new(), String::new()));
    }

    #[test]
    fn test_decode_multivalue() {
        assert_eq!(decode_multivalue("$a$;$b$$c$"), vec!["a", "b$c"]);
        assert_eq!(decode_multivalue("$$"), vec![""]);
        assert!(decode_multivalue("").is_empty());
    }

    #[test]
    fn test_records_keep_multivalues() {
        let records = vec![
            Record::new().with("host", "web1").with("tags", vec!["x", "y"]),
            Record::new().with("host", "web2").with("extra", "1"),
        ];
        let encoded = encode_records(&records).unwrap();
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.starts_with("host,__mv_host,tags,__mv_tags,extra,__mv_extra\n"));

        let decoded = decode_records(&encoded).unwrap();
        assert_eq!(decoded[0].get("tags"), Some(&FieldValue::from(vec!["x", "y"])));
        assert_eq!(decoded[0].get_str("host"), Some("web1"));
        assert_eq!(decoded[1].get_str("extra"), Some("1"));
        assert!(decoded[0].fieldnames().all(|name| !name.starts_with(MV_PREFIX)));
    }

    #[test]
    fn test_decode_plain_csv() {
        let decoded = decode_records(b"a,b\n1,\"two, three\"\n").unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].get_str("b"), Some("two, three"));
    }

    #[test]
    fn test_empty_input() {
        assert!(decode_records(b"").unwrap().is_empty());
        assert!(encode_records(&[]).unwrap().is_empty());
    }
}
