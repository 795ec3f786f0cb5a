//! Flow records addressed by field identifier.
//!
//! The aggregation engine never looks inside a record directly; it reads and
//! writes values through [`FlowRecord`]. [`Record`] is the in-memory
//! implementation used by the CLI and the tests.

pub mod json;

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::field::{FieldId, FieldType, Value};

/// Errors returned by record accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not allocated")]
    NotAllocated,

    #[error("unknown field {0}")]
    UnknownField(FieldId),

    #[error("field {0} is not set")]
    NotSet(FieldId),

    #[error("field {field} expects {expected}, got {actual}")]
    TypeMismatch {
        field: FieldId,
        expected: FieldType,
        actual: FieldType,
    },
}

/// Get/set access to one flow record.
pub trait FlowRecord {
    /// Whether the record is backed by valid storage.
    fn is_allocated(&self) -> bool;

    /// Reads a field. Unset fields return [`RecordError::NotSet`].
    fn get_field(&self, field: FieldId) -> Result<Value, RecordError>;

    /// Writes a field, rejecting values of the wrong type.
    fn set_field(&mut self, field: FieldId, value: Value) -> Result<(), RecordError>;

    /// Unsets every field.
    fn clear(&mut self);
}

/// Hash-map backed flow record.
///
/// Pair pseudo-fields have no storage of their own: reading one returns the
/// source side, writing one sets both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    allocated: bool,
    values: FxHashMap<FieldId, Value>,
}

impl Record {
    /// Creates an empty, allocated record.
    pub fn new() -> Self {
        Self {
            allocated: true,
            values: FxHashMap::default(),
        }
    }

    /// Creates a record without backing storage. Every accessor fails.
    pub fn unallocated() -> Self {
        Self {
            allocated: false,
            values: FxHashMap::default(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: FieldId, value: Value) -> Result<Self, RecordError> {
        self.set_field(field, value)?;
        Ok(self)
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored fields ordered by identifier.
    pub fn fields(&self) -> Vec<(FieldId, &Value)> {
        let mut out: Vec<_> = self.values.iter().map(|(f, v)| (*f, v)).collect();
        out.sort_by_key(|(f, _)| *f);
        out
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRecord for Record {
    fn is_allocated(&self) -> bool {
        self.allocated
    }

    fn get_field(&self, field: FieldId) -> Result<Value, RecordError> {
        if !self.allocated {
            return Err(RecordError::NotAllocated);
        }
        if field.def().is_none() {
            return Err(RecordError::UnknownField(field));
        }
        let stored = field.pair().map_or(field, |(src, _)| src);
        self.values
            .get(&stored)
            .cloned()
            .ok_or(RecordError::NotSet(field))
    }

    fn set_field(&mut self, field: FieldId, value: Value) -> Result<(), RecordError> {
        if !self.allocated {
            return Err(RecordError::NotAllocated);
        }
        let expected = field
            .field_type()
            .ok_or(RecordError::UnknownField(field))?;
        let actual = value.field_type();
        if expected != actual {
            return Err(RecordError::TypeMismatch {
                field,
                expected,
                actual,
            });
        }

        match field.pair() {
            Some((src, dst)) => {
                self.values.insert(src, value.clone());
                self.values.insert(dst, value);
            }
            None => {
                self.values.insert(field, value);
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// The common subset of flow fields, read and written in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicRecord {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: u8,
    pub bytes: u64,
    pub packets: u64,
    pub flows: u64,
}

impl BasicRecord {
    /// Writes every field of the basic record into `rec`.
    pub fn write_to<R: FlowRecord + ?Sized>(&self, rec: &mut R) -> Result<(), RecordError> {
        rec.set_field(FieldId::FIRST, Value::Timestamp(self.first))?;
        rec.set_field(FieldId::LAST, Value::Timestamp(self.last))?;
        rec.set_field(FieldId::SRCADDR, Value::Addr(self.src_addr))?;
        rec.set_field(FieldId::DSTADDR, Value::Addr(self.dst_addr))?;
        rec.set_field(FieldId::SRCPORT, Value::U16(self.src_port))?;
        rec.set_field(FieldId::DSTPORT, Value::U16(self.dst_port))?;
        rec.set_field(FieldId::PROT, Value::U8(self.proto))?;
        rec.set_field(FieldId::DOCTETS, Value::U64(self.bytes))?;
        rec.set_field(FieldId::DPKTS, Value::U64(self.packets))?;
        rec.set_field(FieldId::AGGR_FLOWS, Value::U64(self.flows))?;
        Ok(())
    }

    /// Reads the basic record from `rec`. Unset fields read as zero.
    pub fn read_from<R: FlowRecord + ?Sized>(rec: &R) -> Result<Self, RecordError> {
        let get = |field: FieldId| -> Result<Value, RecordError> {
            match rec.get_field(field) {
                Ok(v) => Ok(v),
                Err(RecordError::NotSet(_)) => field
                    .field_type()
                    .map(FieldType::zero_value)
                    .ok_or(RecordError::UnknownField(field)),
                Err(e) => Err(e),
            }
        };

        Ok(Self {
            first: timestamp(FieldId::FIRST, get(FieldId::FIRST)?)?,
            last: timestamp(FieldId::LAST, get(FieldId::LAST)?)?,
            src_addr: addr(FieldId::SRCADDR, get(FieldId::SRCADDR)?)?,
            dst_addr: addr(FieldId::DSTADDR, get(FieldId::DSTADDR)?)?,
            src_port: port(FieldId::SRCPORT, get(FieldId::SRCPORT)?)?,
            dst_port: port(FieldId::DSTPORT, get(FieldId::DSTPORT)?)?,
            proto: match get(FieldId::PROT)? {
                Value::U8(v) => v,
                other => return Err(mismatch(FieldId::PROT, FieldType::U8, &other)),
            },
            bytes: counter(FieldId::DOCTETS, get(FieldId::DOCTETS)?)?,
            packets: counter(FieldId::DPKTS, get(FieldId::DPKTS)?)?,
            flows: counter(FieldId::AGGR_FLOWS, get(FieldId::AGGR_FLOWS)?)?,
        })
    }
}

fn mismatch(field: FieldId, expected: FieldType, actual: &Value) -> RecordError {
    RecordError::TypeMismatch {
        field,
        expected,
        actual: actual.field_type(),
    }
}

fn timestamp(field: FieldId, v: Value) -> Result<DateTime<Utc>, RecordError> {
    match v {
        Value::Timestamp(t) => Ok(t),
        other => Err(mismatch(field, FieldType::Timestamp, &other)),
    }
}

fn addr(field: FieldId, v: Value) -> Result<IpAddr, RecordError> {
    match v {
        Value::Addr(a) => Ok(a),
        other => Err(mismatch(field, FieldType::Addr, &other)),
    }
}

fn port(field: FieldId, v: Value) -> Result<u16, RecordError> {
    match v {
        Value::U16(p) => Ok(p),
        other => Err(mismatch(field, FieldType::U16, &other)),
    }
}

fn counter(field: FieldId, v: Value) -> Result<u64, RecordError> {
    match v {
        Value::U64(c) => Ok(c),
        other => Err(mismatch(field, FieldType::U64, &other)),
    }
}
