//! In-memory GROUP-BY aggregation over network flow records.
//!
//! Records are folded into groups keyed by a configurable set of fields,
//! value fields are merged per group, and the result is walked in sorted
//! order through [`heap::MemHeap`].

pub mod config;
pub mod field;
pub mod heap;
pub mod ingest;
pub mod output;
pub mod record;

pub use field::{FieldId, FieldType, MacAddr, Value};
pub use heap::{AddressOrdering, AggrKind, Cursor, HeapError, MemHeap, SortOrder};
pub use record::{BasicRecord, FlowRecord, Record, RecordError};
