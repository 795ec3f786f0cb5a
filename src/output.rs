//! Rendering of aggregated groups.

use std::io::Write;

use anyhow::{Context, Result};

use crate::config::OutputFormat;
use crate::field::FieldId;
use crate::heap::{HeapError, MemHeap};
use crate::record::json::encode_fields;
use crate::record::{FlowRecord, Record, RecordError};

/// Walks the heap in result order, materializing at most `limit` groups
/// (0 means all) and handing each to `f`.
pub fn for_each_group(
    heap: &MemHeap,
    limit: usize,
    mut f: impl FnMut(&Record) -> Result<()>,
) -> Result<usize> {
    let mut cursor = match heap.first_position() {
        Ok(c) => c,
        Err(HeapError::Empty) => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut rec = Record::new();
    let mut emitted = 0;
    loop {
        heap.materialize_record(cursor, &mut rec)
            .with_context(|| format!("materializing group {}", cursor.position()))?;
        f(&rec)?;
        emitted += 1;
        if limit != 0 && emitted >= limit {
            break;
        }
        cursor = match heap.next_position(cursor) {
            Ok(c) => c,
            Err(e) if e.is_iteration_end() => break,
            Err(e) => return Err(e.into()),
        };
    }
    Ok(emitted)
}

/// Writes the heap's groups to `out` and returns how many were written.
pub fn write_results<W: Write>(
    heap: &MemHeap,
    format: OutputFormat,
    limit: usize,
    out: &mut W,
) -> Result<usize> {
    let fields = heap.output_fields();
    match format {
        OutputFormat::Json => for_each_group(heap, limit, |rec| {
            let obj = encode_fields(rec, &fields)?;
            serde_json::to_writer(&mut *out, &obj).context("encoding group")?;
            out.write_all(b"\n").context("writing group")?;
            Ok(())
        }),
        OutputFormat::Table => {
            let mut rows = Vec::new();
            let count = for_each_group(heap, limit, |rec| {
                rows.push(table_row(rec, &fields)?);
                Ok(())
            })?;
            write_table(out, &fields, &rows)?;
            Ok(count)
        }
    }
}

fn table_row(rec: &Record, fields: &[FieldId]) -> Result<Vec<String>, RecordError> {
    fields
        .iter()
        .map(|&field| match rec.get_field(field) {
            Ok(v) => Ok(v.to_string()),
            Err(RecordError::NotSet(_)) => Ok("-".to_string()),
            Err(e) => Err(e),
        })
        .collect()
}

fn write_table<W: Write>(out: &mut W, fields: &[FieldId], rows: &[Vec<String>]) -> Result<()> {
    let mut widths: Vec<usize> = fields.iter().map(|f| f.name().len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let header: Vec<String> = fields.iter().map(|f| f.name().to_string()).collect();
    for row in std::iter::once(&header).chain(rows) {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:>w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "{line}").context("writing table")?;
    }
    Ok(())
}
