use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free engine counters.
#[derive(Debug, Default)]
pub struct HeapStats {
    records_written: AtomicU64,
    write_errors: AtomicU64,
    groups_created: AtomicU64,
    groups_merged: AtomicU64,
    pairs_skipped: AtomicU64,
    sort_rebuilds: AtomicU64,
}

/// Point-in-time copy of [`HeapStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStatsSnapshot {
    pub records_written: u64,
    pub write_errors: u64,
    pub groups_created: u64,
    pub groups_merged: u64,
    /// Destination-side insertions skipped because both sides built the
    /// same key in nfdump compatibility mode.
    pub pairs_skipped: u64,
    pub sort_rebuilds: u64,
}

impl HeapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn group_created(&self) {
        self.groups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn group_merged(&self) {
        self.groups_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pair_skipped(&self) {
        self.pairs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sort_rebuilt(&self) {
        self.sort_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters without resetting them.
    pub fn snapshot(&self) -> HeapStatsSnapshot {
        HeapStatsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            groups_merged: self.groups_merged.load(Ordering::Relaxed),
            pairs_skipped: self.pairs_skipped.load(Ordering::Relaxed),
            sort_rebuilds: self.sort_rebuilds.load(Ordering::Relaxed),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.records_written,
            &self.write_errors,
            &self.groups_created,
            &self.groups_merged,
            &self.pairs_skipped,
            &self.sort_rebuilds,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = HeapStats::new();
        stats.record_written();
        stats.record_written();
        stats.group_created();
        stats.group_merged();
        stats.pair_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.records_written, 2);
        assert_eq!(snap.groups_created, 1);
        assert_eq!(snap.groups_merged, 1);
        assert_eq!(snap.pairs_skipped, 1);
        assert_eq!(snap.write_errors, 0);

        // Snapshots do not consume the counters.
        assert_eq!(stats.snapshot(), snap);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = HeapStats::new();
        stats.write_error();
        stats.sort_rebuilt();
        stats.reset();
        assert_eq!(stats.snapshot(), HeapStatsSnapshot::default());
    }
}
