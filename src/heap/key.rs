//! Canonical group keys.
//!
//! A key is the concatenation of every key-template value rendered as a
//! one-letter type tag, `:`, the value text and a `;` terminator. String
//! values escape `\` and `;` so distinct tuples never render the same.

use std::fmt::Write;

use chrono::SecondsFormat;

use crate::field::{FieldId, Value};
use crate::record::{FlowRecord, RecordError};

use super::error::HeapError;
use super::template::FieldSpec;

/// Which member of a pair field a key is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Plain,
    Source,
    Destination,
}

impl Side {
    fn resolve(self, field: FieldId) -> FieldId {
        match (self, field.pair()) {
            (Side::Source, Some((src, _))) => src,
            (Side::Destination, Some((_, dst))) => dst,
            _ => field,
        }
    }
}

/// Builds the canonical key and the masked key tuple for `rec`.
pub fn build_key<R: FlowRecord + ?Sized>(
    rec: &R,
    template: &[FieldSpec],
    side: Side,
) -> Result<(String, Vec<Value>), HeapError> {
    let mut key = String::with_capacity(template.len() * 12);
    let mut values = Vec::with_capacity(template.len());

    for spec in template {
        let field = side.resolve(spec.field);
        let value = match rec.get_field(field) {
            Ok(v) => v,
            Err(RecordError::NotSet(_)) => spec.ty.zero_value(),
            Err(e) => return Err(map_record_error(e, spec.field)),
        }
        .masked(spec.v4_prefix, spec.v6_prefix);

        render_value(&value, &mut key);
        values.push(value);
    }

    Ok((key, values))
}

/// Reads the value-template fields of `rec`. Unset fields are absent.
pub fn build_values<R: FlowRecord + ?Sized>(
    rec: &R,
    template: &[FieldSpec],
) -> Result<Vec<Option<Value>>, HeapError> {
    template
        .iter()
        .map(|spec| match rec.get_field(spec.field) {
            Ok(v) => Ok(Some(v)),
            Err(RecordError::NotSet(_)) => Ok(None),
            Err(e) => Err(map_record_error(e, spec.field)),
        })
        .collect()
}

fn map_record_error(err: RecordError, field: FieldId) -> HeapError {
    match err {
        RecordError::NotAllocated => HeapError::RecordNotAllocated,
        _ => HeapError::UnknownField(field),
    }
}

/// Appends the tagged, terminated rendering of `value` to `out`.
pub fn render_value(value: &Value, out: &mut String) {
    // Writing into a String cannot fail.
    let _ = match value {
        Value::U8(v) => write!(out, "b:{v}"),
        Value::U16(v) => write!(out, "w:{v}"),
        Value::U32(v) => write!(out, "d:{v}"),
        Value::U64(v) => write!(out, "q:{v}"),
        // -0.0 == 0.0, so both must render the same key.
        Value::F64(v) => write!(out, "f:{}", if *v == 0.0 { 0.0 } else { *v }),
        Value::Timestamp(t) => write!(
            out,
            "t:{}",
            t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ),
        Value::Addr(a) => write!(out, "a:{a}"),
        Value::Mac(m) => write!(out, "m:{m}"),
        Value::Str(s) => {
            out.push_str("s:");
            for c in s.chars() {
                if c == '\\' || c == ';' {
                    out.push('\\');
                }
                out.push(c);
            }
            Ok(())
        }
        Value::Blob(b) => {
            out.push_str("x:");
            b.iter().try_for_each(|byte| write!(out, "{byte:02x}"))
        }
    };
    out.push(';');
}

/// Renders a complete key from an already built tuple.
pub fn render_key(values: &[Value]) -> String {
    let mut key = String::new();
    for v in values {
        render_value(v, &mut key);
    }
    key
}
