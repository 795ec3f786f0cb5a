use crate::field::{FieldType, Value};

use super::template::AggrKind;

/// Element-wise accumulator merge, resolved once per template entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOp {
    Min,
    Max,
    /// Wrapping for integers.
    Sum,
    Or,
    /// Retains the first observed value.
    Keep,
}

macro_rules! int_merge {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            MergeOp::Min => $a.min($b),
            MergeOp::Max => $a.max($b),
            MergeOp::Sum => $a.wrapping_add($b),
            MergeOp::Or => $a | $b,
            MergeOp::Keep => $a,
        }
    };
}

impl MergeOp {
    /// Picks the merge for an aggregation kind over a field type. Combinations
    /// with no meaningful merge fall back to [`MergeOp::Keep`].
    pub fn resolve(kind: AggrKind, ty: FieldType) -> Self {
        use FieldType::{Timestamp, F64, U16, U32, U64, U8};

        match (kind, ty) {
            (AggrKind::Min, U8 | U16 | U32 | U64 | F64 | Timestamp) => Self::Min,
            (AggrKind::Max, U8 | U16 | U32 | U64 | F64 | Timestamp) => Self::Max,
            (AggrKind::Sum, U8 | U16 | U32 | U64 | F64) => Self::Sum,
            (AggrKind::Or, U8 | U16 | U32 | U64) => Self::Or,
            _ => Self::Keep,
        }
    }

    /// Merges `new` into `old`. An absent side yields the other side.
    pub fn apply(self, old: Option<Value>, new: Option<Value>) -> Option<Value> {
        match (old, new) {
            (None, new) => new,
            (old, None) => old,
            (Some(a), Some(b)) => Some(self.merge(a, b)),
        }
    }

    fn merge(self, old: Value, new: Value) -> Value {
        match (old, new) {
            (Value::U8(a), Value::U8(b)) => Value::U8(int_merge!(self, a, b)),
            (Value::U16(a), Value::U16(b)) => Value::U16(int_merge!(self, a, b)),
            (Value::U32(a), Value::U32(b)) => Value::U32(int_merge!(self, a, b)),
            (Value::U64(a), Value::U64(b)) => Value::U64(int_merge!(self, a, b)),
            (Value::F64(a), Value::F64(b)) => Value::F64(match self {
                Self::Min => a.min(b),
                Self::Max => a.max(b),
                Self::Sum => a + b,
                Self::Or | Self::Keep => a,
            }),
            (Value::Timestamp(a), Value::Timestamp(b)) => Value::Timestamp(match self {
                Self::Min => a.min(b),
                Self::Max => a.max(b),
                Self::Sum | Self::Or | Self::Keep => a,
            }),
            // Mismatched variants cannot come from a type-checked record.
            (old, _) => old,
        }
    }
}
