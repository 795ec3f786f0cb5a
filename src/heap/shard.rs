use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

use crate::field::Value;

use super::template::FieldSpec;

/// Accumulated state of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupState {
    /// One masked value per key-template entry.
    pub keys: Vec<Value>,
    /// One value per value-template entry; `None` until a record sets it.
    pub values: Vec<Option<Value>>,
}

/// Outcome of writing into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Merged,
}

type Shard = Mutex<FxHashMap<String, GroupState>>;

/// Canonical key -> group map split across independently locked shards.
///
/// A key always lands in the same shard, so merges for one group serialize
/// on that shard's lock while unrelated groups proceed in parallel.
pub struct GroupTable {
    shards: Box<[Shard]>,
}

impl GroupTable {
    /// Creates a table with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        let n = shards.max(1);
        Self {
            shards: (0..n).map(|_| Mutex::new(FxHashMap::default())).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the shard owning `key`.
    pub fn shard_index(&self, key: &str) -> usize {
        let n = self.shards.len();
        if n == 1 {
            return 0;
        }
        (xxh3_64(key.as_bytes()) % n as u64) as usize
    }

    fn shard(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Inserts a new group or merges `values` into the existing one using
    /// each template entry's merge op.
    pub fn upsert(
        &self,
        key: String,
        keys: Vec<Value>,
        values: Vec<Option<Value>>,
        template: &[FieldSpec],
    ) -> Upsert {
        let mut shard = self.shard(&key).lock();
        match shard.get_mut(&key) {
            Some(group) => {
                for ((slot, new), spec) in group.values.iter_mut().zip(values).zip(template) {
                    *slot = spec.merge.apply(slot.take(), new);
                }
                trace!(key = %key, "merged into group");
                Upsert::Merged
            }
            None => {
                trace!(key = %key, "created group");
                shard.insert(key, GroupState { keys, values });
                Upsert::Created
            }
        }
    }

    /// Total number of groups across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// Runs `f` on every group, holding one shard lock at a time.
    pub fn for_each_mut(&self, mut f: impl FnMut(&str, &mut GroupState)) {
        for shard in self.shards.iter() {
            let mut guard = shard.lock();
            for (key, group) in guard.iter_mut() {
                f(key, group);
            }
        }
    }

    /// Runs `f` on the group stored under `key`.
    pub fn with_group<T>(&self, key: &str, f: impl FnOnce(&GroupState) -> T) -> Option<T> {
        self.shard(key).lock().get(key).map(f)
    }

    /// Drops every group, keeping the shard count.
    pub fn clear(&mut self) {
        for shard in self.shards.iter_mut() {
            shard.get_mut().clear();
        }
    }
}
