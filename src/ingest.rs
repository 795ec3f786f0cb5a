//! Line-delimited JSON ingestion into a [`MemHeap`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::heap::MemHeap;
use crate::record::json::parse_line;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: u64,
    /// Non-blank input lines seen.
    pub lines: u64,
    /// Lines folded into the heap.
    pub records: u64,
    /// Lines that failed to parse or write.
    pub skipped: u64,
}

impl AddAssign for IngestSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.files += rhs.files;
        self.lines += rhs.lines;
        self.records += rhs.records;
        self.skipped += rhs.skipped;
    }
}

/// Feeds every line of `reader` into `heap`. Bad lines are logged and
/// counted, never fatal.
pub fn ingest_reader<R: BufRead>(heap: &MemHeap, reader: R, source: &str) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {source}"))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let record = match parse_line(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(source, line = idx + 1, error = %e, "skipping unparsable record");
                summary.skipped += 1;
                continue;
            }
        };

        match heap.write_record(&record) {
            Ok(()) => summary.records += 1,
            Err(e) => {
                warn!(source, line = idx + 1, error = %e, "skipping record");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Opens and ingests a single file.
pub fn ingest_file(heap: &MemHeap, path: &Path) -> Result<IngestSummary> {
    let file = File::open(path).with_context(|| format!("opening input {}", path.display()))?;
    let mut summary = ingest_reader(heap, BufReader::new(file), &path.display().to_string())?;
    summary.files = 1;
    debug!(
        path = %path.display(),
        records = summary.records,
        skipped = summary.skipped,
        "ingested file"
    );
    Ok(summary)
}

/// Ingests `paths` on up to `workers` threads sharing one heap.
///
/// Each worker claims the next unread file until none remain. The first
/// I/O error stops that worker and is returned once all workers finish.
pub fn ingest_files(heap: &MemHeap, paths: &[PathBuf], workers: usize) -> Result<IngestSummary> {
    let workers = workers.clamp(1, paths.len().max(1));
    let next = AtomicUsize::new(0);

    let results: Vec<Result<IngestSummary>> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(|| -> Result<IngestSummary> {
                    let mut local = IngestSummary::default();
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(path) = paths.get(idx) else {
                            return Ok(local);
                        };
                        local += ingest_file(heap, path)?;
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!("ingest worker panicked")),
            })
            .collect()
    });

    let mut total = IngestSummary::default();
    for result in results {
        total += result?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;
    use crate::field::{FieldId, Value};
    use crate::heap::{AggrKind, SortOrder};
    use crate::record::{FlowRecord, Record};

    fn heap() -> MemHeap {
        let mut heap = MemHeap::new(4);
        heap.configure(FieldId::SRCPORT, AggrKind::Key, SortOrder::Asc, 0, 0)
            .expect("configure srcport");
        heap.configure(FieldId::DOCTETS, AggrKind::Sum, SortOrder::None, 0, 0)
            .expect("configure bytes");
        heap
    }

    fn total_bytes(heap: &MemHeap) -> u64 {
        let mut total = 0;
        let mut rec = Record::new();
        let mut cursor = heap.first_position().expect("first");
        loop {
            heap.materialize_record(cursor, &mut rec).expect("materialize");
            total += rec
                .get_field(FieldId::DOCTETS)
                .ok()
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            match heap.next_position(cursor) {
                Ok(c) => cursor = c,
                Err(_) => break,
            }
        }
        total
    }

    #[test]
    fn test_ingest_reader_counts_and_skips() {
        let heap = heap();
        let input = concat!(
            "{\"srcport\": 80, \"bytes\": 10}\n",
            "\n",
            "not json\n",
            "{\"srcport\": 80, \"bytes\": 30}\n",
            "{\"nosuchfield\": 1}\n",
            "{\"srcport\": 53, \"bytes\": 5}\n",
        );

        let summary = ingest_reader(&heap, Cursor::new(input), "test").expect("ingest");
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(heap.group_count(), 2);
        assert_eq!(total_bytes(&heap), 45);
    }

    #[test]
    fn test_ingest_files_spreads_over_workers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut paths = Vec::new();
        for i in 0..6u16 {
            let path = dir.path().join(format!("flows-{i}.jsonl"));
            let mut file = File::create(&path).expect("create input");
            for j in 0..10u16 {
                writeln!(file, "{{\"srcport\": {}, \"bytes\": 2}}", j % 3 + i).expect("write line");
            }
            paths.push(path);
        }

        let heap = heap();
        let summary = ingest_files(&heap, &paths, 3).expect("ingest");
        assert_eq!(summary.files, 6);
        assert_eq!(summary.records, 60);
        assert_eq!(summary.skipped, 0);
        assert_eq!(total_bytes(&heap), 120);
        assert_eq!(heap.stats().records_written, 60);

        let mut rec = Record::new();
        heap.materialize_record(heap.first_position().expect("first"), &mut rec)
            .expect("materialize");
        assert_eq!(rec.get_field(FieldId::SRCPORT), Ok(Value::U16(0)));
    }

    #[test]
    fn test_ingest_missing_file_fails() {
        let heap = heap();
        let err = ingest_files(&heap, &[PathBuf::from("/nonexistent/flows.jsonl")], 2).unwrap_err();
        assert!(err.to_string().contains("opening input"));
    }
}
