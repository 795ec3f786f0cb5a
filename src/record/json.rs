//! JSON-lines flow decoding.
//!
//! Each line is an object mapping catalog field names to values. Counters
//! and identifiers are JSON numbers, timestamps are RFC 3339 strings or epoch
//! milliseconds, addresses and MACs are strings and blobs are hex strings.
//! `null` members are skipped.

use std::net::IpAddr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Map;
use thiserror::Error;

use super::{FlowRecord, Record, RecordError};
use crate::field::{FieldId, FieldType, MacAddr, Value};

/// Errors that can occur while decoding a flow line.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },

    #[error("unknown field name {name:?}")]
    UnknownField { name: String },

    #[error("field {field}: {reason}")]
    InvalidValue { field: FieldId, reason: String },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Decodes one JSON line into a fresh [`Record`].
pub fn parse_line(line: &str) -> Result<Record, ParseError> {
    let doc: serde_json::Value = serde_json::from_str(line)?;
    let obj = match doc {
        serde_json::Value::Object(obj) => obj,
        other => {
            return Err(ParseError::NotAnObject {
                kind: json_kind(&other),
            })
        }
    };

    let mut rec = Record::new();
    for (name, raw) in obj {
        if raw.is_null() {
            continue;
        }
        let field = FieldId::from_name(&name).ok_or(ParseError::UnknownField { name })?;
        let value = decode_value(field, &raw)?;
        rec.set_field(field, value)?;
    }
    Ok(rec)
}

fn decode_value(field: FieldId, raw: &serde_json::Value) -> Result<Value, ParseError> {
    let ty = field
        .field_type()
        .ok_or(RecordError::UnknownField(field))?;
    let invalid = |reason: String| ParseError::InvalidValue { field, reason };

    let value = match ty {
        FieldType::U8 => Value::U8(narrow(field, raw)?),
        FieldType::U16 => Value::U16(narrow(field, raw)?),
        FieldType::U32 => Value::U32(narrow(field, raw)?),
        FieldType::U64 => Value::U64(unsigned(field, raw)?),
        FieldType::F64 => Value::F64(
            raw.as_f64()
                .ok_or_else(|| invalid(format!("expected a number, got {}", json_kind(raw))))?,
        ),
        FieldType::Timestamp => Value::Timestamp(timestamp(field, raw)?),
        FieldType::Addr => {
            let s = string(field, raw)?;
            let addr: IpAddr = s
                .parse()
                .map_err(|e| invalid(format!("{s:?}: {e}")))?;
            Value::Addr(addr)
        }
        FieldType::Mac => {
            let mac = string(field, raw)?
                .parse::<MacAddr>()
                .map_err(|e| invalid(e.to_string()))?;
            Value::Mac(mac)
        }
        FieldType::Str => Value::Str(string(field, raw)?.to_string()),
        FieldType::Blob => Value::Blob(hex(field, string(field, raw)?)?),
    };
    Ok(value)
}

fn unsigned(field: FieldId, raw: &serde_json::Value) -> Result<u64, ParseError> {
    raw.as_u64().ok_or_else(|| ParseError::InvalidValue {
        field,
        reason: format!("expected an unsigned integer, got {raw}"),
    })
}

fn narrow<T: TryFrom<u64>>(field: FieldId, raw: &serde_json::Value) -> Result<T, ParseError> {
    let wide = unsigned(field, raw)?;
    T::try_from(wide).map_err(|_| ParseError::InvalidValue {
        field,
        reason: format!("{wide} out of range"),
    })
}

fn string(field: FieldId, raw: &serde_json::Value) -> Result<&str, ParseError> {
    raw.as_str().ok_or_else(|| ParseError::InvalidValue {
        field,
        reason: format!("expected a string, got {}", json_kind(raw)),
    })
}

fn timestamp(field: FieldId, raw: &serde_json::Value) -> Result<DateTime<Utc>, ParseError> {
    let invalid = |reason: String| ParseError::InvalidValue { field, reason };
    match raw {
        serde_json::Value::Number(n) => {
            let ms = n
                .as_i64()
                .ok_or_else(|| invalid(format!("{n} is not integral milliseconds")))?;
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| invalid(format!("{ms} ms out of range")))
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| invalid(format!("{s:?}: {e}"))),
        other => Err(invalid(format!(
            "expected a timestamp, got {}",
            json_kind(other)
        ))),
    }
}

fn hex(field: FieldId, s: &str) -> Result<Vec<u8>, ParseError> {
    if s.len() % 2 != 0 {
        return Err(ParseError::InvalidValue {
            field,
            reason: "odd-length hex string".to_string(),
        });
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ParseError::InvalidValue {
                    field,
                    reason: format!("invalid hex at offset {i}"),
                })
        })
        .collect()
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Encodes a value for JSON output.
pub fn encode_value(value: &Value) -> serde_json::Value {
    match value {
        Value::U8(v) => serde_json::Value::from(*v),
        Value::U16(v) => serde_json::Value::from(*v),
        Value::U32(v) => serde_json::Value::from(*v),
        Value::U64(v) => serde_json::Value::from(*v),
        // Non-finite floats become null.
        Value::F64(v) => serde_json::Value::from(*v),
        Value::Timestamp(t) => {
            serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Value::Addr(_) | Value::Mac(_) | Value::Str(_) | Value::Blob(_) => {
            serde_json::Value::String(value.to_string())
        }
    }
}

/// Encodes the listed fields of a record as a JSON object, skipping unset
/// ones.
pub fn encode_fields<R: FlowRecord + ?Sized>(
    rec: &R,
    fields: &[FieldId],
) -> Result<Map<String, serde_json::Value>, RecordError> {
    let mut out = Map::new();
    for &field in fields {
        match rec.get_field(field) {
            Ok(v) => {
                out.insert(field.name().to_string(), encode_value(&v));
            }
            Err(RecordError::NotSet(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_line() {
        let rec = parse_line(
            r#"{"first":"2017-05-28T15:55:00.000Z","last":1495986902000,
                "srcip":"192.168.1.1","dstport":53,"bytes":20,"proto":17}"#,
        )
        .expect("parse line");

        let first = DateTime::from_timestamp_millis(1_495_986_900_000).expect("ts");
        let last = DateTime::from_timestamp_millis(1_495_986_902_000).expect("ts");
        assert_eq!(rec.get_field(FieldId::FIRST), Ok(Value::Timestamp(first)));
        assert_eq!(rec.get_field(FieldId::LAST), Ok(Value::Timestamp(last)));
        assert_eq!(
            rec.get_field(FieldId::SRCADDR),
            Ok(Value::Addr("192.168.1.1".parse().expect("ip")))
        );
        assert_eq!(rec.get_field(FieldId::DSTPORT), Ok(Value::U16(53)));
        assert_eq!(rec.get_field(FieldId::DOCTETS), Ok(Value::U64(20)));
        assert_eq!(rec.get_field(FieldId::PROT), Ok(Value::U8(17)));
    }

    #[test]
    fn test_parse_mac_blob_and_null() {
        let rec = parse_line(r#"{"insrcmac":"00:11:22:33:44:55","mpls":"0a0b","tos":null}"#)
            .expect("parse line");
        assert_eq!(
            rec.get_field(FieldId::IN_SRC_MAC),
            Ok(Value::Mac(MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x55])))
        );
        assert_eq!(
            rec.get_field(FieldId::MPLS_LABEL),
            Ok(Value::Blob(vec![0x0a, 0x0b]))
        );
        assert_eq!(rec.get_field(FieldId::TOS), Err(RecordError::NotSet(FieldId::TOS)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse_line("{"), Err(ParseError::Json(_))));
        assert!(matches!(
            parse_line("[1,2]"),
            Err(ParseError::NotAnObject { kind: "array" })
        ));
        assert!(matches!(
            parse_line(r#"{"nosuchfield":1}"#),
            Err(ParseError::UnknownField { .. })
        ));
        assert!(matches!(
            parse_line(r#"{"srcport":70000}"#),
            Err(ParseError::InvalidValue { field: FieldId::SRCPORT, .. })
        ));
        assert!(matches!(
            parse_line(r#"{"srcip":"not-an-ip"}"#),
            Err(ParseError::InvalidValue { field: FieldId::SRCADDR, .. })
        ));
        assert!(matches!(
            parse_line(r#"{"mpls":"abc"}"#),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_encode_fields_skips_unset() {
        let rec = parse_line(r#"{"srcport":53,"bytes":40,"first":0}"#).expect("parse line");
        let out = encode_fields(&rec, &[FieldId::SRCPORT, FieldId::DPKTS, FieldId::FIRST])
            .expect("encode");
        assert_eq!(out.len(), 2);
        assert_eq!(out["srcport"], serde_json::json!(53));
        assert_eq!(out["first"], serde_json::json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_encode_float() {
        assert_eq!(encode_value(&Value::F64(280.0)), serde_json::json!(280.0));
        assert_eq!(encode_value(&Value::F64(f64::NAN)), serde_json::Value::Null);
    }
}
