//! Streaming ingestion of one source file into one partition table.
//!
//! The contract favors resumability: rows are committed in batches of
//! `commit_every` elements, ids are assigned in strict array order from 0,
//! and only whole prefixes ever become durable. After any interruption the
//! current row count of the table is exactly the index of the next unseen
//! element, so a rerun skips what is already stored and continues.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::{IndexError, Result};
use crate::models::{Dataset, RowFields, TableSchema};
use crate::store::{dt_to_ns, Store};
use crate::stream::{JsonArrayStream, StreamError};

/// Shared byte-offset progress for one ingestion run. Callers keep the `Arc`
/// and poll from another thread while `ingest` runs.
#[derive(Debug, Default)]
pub struct IngestProgress {
    bytes_read: Arc<AtomicU64>,
    total_bytes: AtomicU64,
}

impl IngestProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bytes consumed from the source file so far. Monotonic within a run.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Size of the source file, set when ingestion opens it.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn fraction(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        (self.bytes_read() as f64 / total as f64).min(1.0)
    }

    fn counter(&self) -> Arc<AtomicU64> {
        self.bytes_read.clone()
    }

    fn set_total(&self, n: u64) {
        self.total_bytes.store(n, Ordering::Relaxed);
    }
}

/// Outcome of one successful (or skipped) ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table: String,
    /// Row count found at the start of the run; 0 for a fresh table.
    pub resumed_from: i64,
    /// Rows written by this run. 0 when the table was already complete.
    pub inserted: i64,
}

/// Ingest `source` into `table`. Idempotent: an already-complete table is a
/// registry check and nothing else. Errors leave the table in its
/// partially-indexed, resumable state; they are logged here and propagated so
/// the caller can tell a failed run from an empty one.
pub fn ingest(
    store: &Store,
    dataset: &Dataset,
    source: &Path,
    table: &str,
    commit_every: usize,
    progress: Option<&IngestProgress>,
) -> Result<IngestReport> {
    if store.is_complete(table)? {
        debug!(table, "partition already complete, skipping ingestion");
        return Ok(IngestReport {
            table: table.to_string(),
            resumed_from: 0,
            inserted: 0,
        });
    }
    match run(store, dataset, source, table, commit_every.max(1), progress) {
        Ok(report) => {
            info!(
                table,
                resumed_from = report.resumed_from,
                inserted = report.inserted,
                "partition ingestion complete"
            );
            Ok(report)
        }
        Err(e) => {
            error!(
                table,
                source = %source.display(),
                error = %e,
                "ingestion interrupted; partition remains resumable"
            );
            Err(e)
        }
    }
}

fn run(
    store: &Store,
    dataset: &Dataset,
    source: &Path,
    table: &str,
    commit_every: usize,
    progress: Option<&IngestProgress>,
) -> Result<IngestReport> {
    store.create_partition_table(table, dataset.schema)?;
    let resumed_from = store.row_count(table)?;

    let unreadable = |e: std::io::Error| IndexError::SourceUnreadable {
        path: source.to_path_buf(),
        source: e,
    };
    let file = File::open(source).map_err(unreadable)?;
    if let Some(p) = progress {
        p.set_total(file.metadata().map_err(unreadable)?.len());
    }

    let mut stream = JsonArrayStream::new(file);
    if let Some(p) = progress {
        stream = stream.with_progress(p.counter());
    }
    let map_stream = |e: StreamError| match e {
        StreamError::Io(io) => IndexError::SourceUnreadable {
            path: source.to_path_buf(),
            source: io,
        },
        StreamError::Syntax(detail) => IndexError::Parse {
            path: source.to_path_buf(),
            detail,
        },
    };
    stream.seek_to_array(dataset.array_path).map_err(map_stream)?;

    let conn = store.conn();
    let insert_sql = match dataset.schema {
        TableSchema::Point => {
            format!(r#"INSERT INTO "{table}" (id, ts_ns, payload) VALUES (?, ?, ?)"#)
        }
        TableSchema::Span => format!(
            r#"INSERT INTO "{table}" (id, start_ts_ns, end_ts_ns, payload) VALUES (?, ?, ?, ?)"#
        ),
    };
    let mut stmt = conn.prepare(&insert_sql)?;

    let commit_every = commit_every as i64;
    let mut tx = conn.unchecked_transaction()?;
    let mut j: i64 = 0;
    let mut inserted: i64 = 0;
    while let Some(element) = stream.next_element().map_err(map_stream)? {
        if j >= resumed_from {
            let fields = (dataset.extract)(&element)
                .map_err(|detail| IndexError::Extract { index: j, detail })?;
            let payload = serde_json::to_string(&element).map_err(|e| IndexError::Parse {
                path: source.to_path_buf(),
                detail: e.to_string(),
            })?;
            match (dataset.schema, fields) {
                (TableSchema::Point, RowFields::Point { ts }) => {
                    stmt.execute(duckdb::params![j, ts_ns(j, ts)?, payload])?;
                }
                (TableSchema::Span, RowFields::Span { start, end }) => {
                    stmt.execute(duckdb::params![
                        j,
                        ts_ns(j, start)?,
                        ts_ns(j, end)?,
                        payload
                    ])?;
                }
                (schema, fields) => {
                    return Err(IndexError::Extract {
                        index: j,
                        detail: format!(
                            "extractor produced {} fields for a {} table",
                            fields.kind(),
                            schema.as_str()
                        ),
                    })
                }
            }
            inserted += 1;
        }
        if j % commit_every == 0 {
            tx.commit()?;
            tx = conn.unchecked_transaction()?;
        }
        j += 1;
    }
    tx.commit()?;
    store.mark_complete(table)?;

    Ok(IngestReport {
        table: table.to_string(),
        resumed_from,
        inserted,
    })
}

/// An extracted timestamp outside the storable i64-ns range is an extraction
/// failure on that element, not a store fault.
fn ts_ns(index: i64, ts: DateTime<Utc>) -> Result<i64> {
    dt_to_ns(ts).map_err(|_| IndexError::Extract {
        index,
        detail: format!("timestamp {ts} is outside the storable range"),
    })
}
