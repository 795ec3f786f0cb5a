//! In-memory GROUP-BY engine over flow records.
//!
//! [`MemHeap`] groups incoming records by a composite key built from the key
//! template, merges the value-template fields of records that share a key,
//! and exposes the groups in a deterministic order through a [`Cursor`].
//!
//! Writers share the engine through `&self`; configuration and `clear` need
//! `&mut self`, so they can never race a write.

pub mod defaults;
pub mod error;
pub mod key;
pub mod merge;
pub mod shard;
pub mod sort;
pub mod stats;
pub mod template;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::field::{FieldId, Value};
use crate::record::{FlowRecord, RecordError};

use self::key::Side;
use self::shard::{GroupTable, Upsert};

pub use self::error::HeapError;
pub use self::merge::MergeOp;
pub use self::sort::AddressOrdering;
pub use self::stats::{HeapStats, HeapStatsSnapshot};
pub use self::template::{AggrKind, FieldSpec, SortOrder, SortSpec, Templates, Tuple};

/// Ordinal position in the sorted result sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(usize);

impl Cursor {
    /// Zero-based position of this cursor.
    pub fn position(self) -> usize {
        self.0
    }
}

/// Sorted canonical keys, valid for one write generation.
struct SortedKeys {
    generation: u64,
    keys: Arc<[String]>,
}

/// Sharded aggregation engine.
pub struct MemHeap {
    templates: Templates,
    table: GroupTable,
    nfdump_compat: bool,
    address_ordering: AddressOrdering,
    /// Bumped by every mutation; the sort cache is valid only for the
    /// generation it was built at.
    generation: AtomicU64,
    sorted: Mutex<Option<SortedKeys>>,
    stats: HeapStats,
}

impl MemHeap {
    /// Creates an empty engine with `shards` lock shards (at least one).
    pub fn new(shards: usize) -> Self {
        Self {
            templates: Templates::default(),
            table: GroupTable::new(shards),
            nfdump_compat: false,
            address_ordering: AddressOrdering::default(),
            generation: AtomicU64::new(0),
            sorted: Mutex::new(None),
            stats: HeapStats::new(),
        }
    }

    /// Registers how `field` participates in aggregation.
    ///
    /// Missing prerequisites of derived fields are registered with their
    /// defaults. On error the templates are left exactly as they were.
    /// Existing groups are dropped when the key or value tuple layout
    /// changes; a sort-only change keeps them.
    pub fn configure(
        &mut self,
        field: FieldId,
        aggr: AggrKind,
        sort: SortOrder,
        v4_prefix: u8,
        v6_prefix: u8,
    ) -> Result<(), HeapError> {
        self.invalidate();

        let mut next = self.templates.clone();
        if let Err(err) = next.configure(field, aggr, sort, v4_prefix, v6_prefix) {
            debug!(field = %field, error = %err, "rejected field configuration");
            return Err(err);
        }

        if !self.table.is_empty() && !same_layout(&self.templates, &next) {
            warn!(
                field = %field,
                groups = self.table.len(),
                "tuple layout changed, dropping existing groups"
            );
            self.table.clear();
        }

        self.templates = next;
        debug!(
            field = %field,
            aggr = ?aggr,
            sort = ?sort,
            key_fields = self.templates.key().len(),
            value_fields = self.templates.value().len(),
            stats_mode = self.templates.stats_mode(),
            "configured field"
        );
        Ok(())
    }

    /// When on, a pair-field write whose source and destination keys are
    /// equal updates its group once instead of twice.
    pub fn set_nfdump_compat(&mut self, on: bool) {
        self.nfdump_compat = on;
        self.invalidate();
    }

    /// Selects how address values compare when sorting.
    pub fn set_address_ordering(&mut self, ordering: AddressOrdering) {
        self.address_ordering = ordering;
        self.invalidate();
    }

    /// Folds one record into its group (two groups in stats mode).
    ///
    /// Both keys and the value tuple are built before any shared state is
    /// touched, so a failed write changes nothing.
    pub fn write_record<R: FlowRecord + ?Sized>(&self, rec: &R) -> Result<(), HeapError> {
        match self.write_inner(rec) {
            Ok(()) => {
                self.stats.record_written();
                Ok(())
            }
            Err(err) => {
                self.stats.write_error();
                Err(err)
            }
        }
    }

    fn write_inner<R: FlowRecord + ?Sized>(&self, rec: &R) -> Result<(), HeapError> {
        if !rec.is_allocated() {
            return Err(HeapError::RecordNotAllocated);
        }

        let stats_mode = self.templates.stats_mode();
        let side = if stats_mode { Side::Source } else { Side::Plain };
        let (src_key, src_values) = key::build_key(rec, self.templates.key(), side)?;
        let values = key::build_values(rec, self.templates.value())?;
        let destination = if stats_mode {
            Some(key::build_key(rec, self.templates.key(), Side::Destination)?)
        } else {
            None
        };

        match destination {
            Some((dst_key, dst_values)) => {
                let skip = self.nfdump_compat && dst_key == src_key;
                self.insert(src_key, src_values, values.clone());
                if skip {
                    self.stats.pair_skipped();
                } else {
                    self.insert(dst_key, dst_values, values);
                }
            }
            None => self.insert(src_key, src_values, values),
        }

        // Bumped only once the groups are visible, so a sort rebuilt while
        // this write was in flight is stamped with a stale generation.
        self.invalidate();
        Ok(())
    }

    fn insert(&self, key: String, keys: Vec<Value>, values: Vec<Option<Value>>) {
        match self.table.upsert(key, keys, values, self.templates.value()) {
            Upsert::Created => self.stats.group_created(),
            Upsert::Merged => self.stats.group_merged(),
        }
    }

    /// Returns the first result position.
    pub fn first_position(&self) -> Result<Cursor, HeapError> {
        if self.table.is_empty() {
            return Err(HeapError::Empty);
        }
        Ok(Cursor(0))
    }

    /// Advances `cursor`. Fails with [`HeapError::End`] once it would step
    /// past the last group.
    pub fn next_position(&self, cursor: Cursor) -> Result<Cursor, HeapError> {
        let groups = self.table.len();
        if groups == 0 {
            return Err(HeapError::Empty);
        }
        let next = cursor.0.saturating_add(1);
        if next >= groups {
            return Err(HeapError::End);
        }
        Ok(Cursor(next))
    }

    /// Copies the group at `cursor` into `out`: every key value and every
    /// accumulated value that is present.
    pub fn materialize_record<R: FlowRecord + ?Sized>(
        &self,
        cursor: Cursor,
        out: &mut R,
    ) -> Result<(), HeapError> {
        if !out.is_allocated() {
            return Err(HeapError::RecordNotAllocated);
        }
        if self.table.is_empty() {
            return Err(HeapError::Empty);
        }

        let keys = self.sorted_keys();
        let key = keys.get(cursor.0).ok_or(HeapError::End)?;
        let group = self
            .table
            .with_group(key, Clone::clone)
            .ok_or(HeapError::End)?;

        out.clear();
        for (spec, value) in self.templates.key().iter().zip(group.keys) {
            out.set_field(spec.field, value)
                .map_err(|e| set_error(e, spec.field))?;
        }
        for (spec, value) in self.templates.value().iter().zip(group.values) {
            if let Some(value) = value {
                out.set_field(spec.field, value)
                    .map_err(|e| set_error(e, spec.field))?;
            }
        }
        Ok(())
    }

    /// Returns the cached result order, rebuilding it if any mutation
    /// happened since it was computed.
    fn sorted_keys(&self) -> Arc<[String]> {
        let generation = self.generation.load(Ordering::Acquire);
        let mut cache = self.sorted.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.generation == generation {
                return Arc::clone(&cached.keys);
            }
        }

        let started = Instant::now();
        let keys: Arc<[String]> =
            sort::rebuild(&self.table, &self.templates, self.address_ordering).into();
        self.stats.sort_rebuilt();
        debug!(
            groups = keys.len(),
            elapsed = ?started.elapsed(),
            "rebuilt sorted key sequence"
        );

        *cache = Some(SortedKeys {
            generation,
            keys: Arc::clone(&keys),
        });
        keys
    }

    /// Returns the engine to its freshly constructed state, keeping the shard
    /// count.
    pub fn clear(&mut self) {
        self.table.clear();
        self.templates = Templates::default();
        self.nfdump_compat = false;
        self.address_ordering = AddressOrdering::default();
        *self.sorted.get_mut() = None;
        self.stats.reset();
        self.invalidate();
        debug!(shards = self.table.shard_count(), "cleared heap");
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn group_count(&self) -> usize {
        self.table.len()
    }

    pub fn shard_count(&self) -> usize {
        self.table.shard_count()
    }

    pub fn stats(&self) -> HeapStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn key_template(&self) -> &[FieldSpec] {
        self.templates.key()
    }

    pub fn value_template(&self) -> &[FieldSpec] {
        self.templates.value()
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.templates.sort()
    }

    pub fn is_stats_mode(&self) -> bool {
        self.templates.stats_mode()
    }

    pub fn nfdump_compat(&self) -> bool {
        self.nfdump_compat
    }

    pub fn address_ordering(&self) -> AddressOrdering {
        self.address_ordering
    }

    /// Fields a materialized record may carry, key fields first.
    pub fn output_fields(&self) -> Vec<FieldId> {
        self.templates
            .key()
            .iter()
            .chain(self.templates.value())
            .map(|s| s.field)
            .collect()
    }
}

impl Default for MemHeap {
    fn default() -> Self {
        Self::new(1)
    }
}

/// True when both templates build identical key and value tuples.
fn same_layout(a: &Templates, b: &Templates) -> bool {
    fn slots(specs: &[FieldSpec]) -> impl Iterator<Item = (FieldId, AggrKind, u8, u8)> + '_ {
        specs
            .iter()
            .map(|s| (s.field, s.kind, s.v4_prefix, s.v6_prefix))
    }
    slots(a.key()).eq(slots(b.key())) && slots(a.value()).eq(slots(b.value()))
}

fn set_error(err: RecordError, field: FieldId) -> HeapError {
    match err {
        RecordError::NotAllocated => HeapError::RecordNotAllocated,
        _ => HeapError::UnknownField(field),
    }
}
