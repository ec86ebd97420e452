//! Takeout Index
//!
//! This crate turns huge append-only Takeout location history exports into a
//! queryable embedded database:
//! - Streaming ingestion of multi-gigabyte top-level JSON arrays, one element
//!   at a time, with batched commits that make interruption resumable.
//! - A DuckDB store holding one partition table per source file, named from a
//!   hash of the file's stat metadata so changed files index into fresh
//!   tables instead of reusing stale rows.
//! - A completion registry recording which partitions are fully populated.
//! - Point-date and date-range queries across monthly partitions, returning
//!   rows in timestamp order for rehydration into caller-validated types.
//!
//! Key modules:
//! - `paths`: Authoritative export layout and month file naming.
//! - `identity`: Content-bound partition table naming.
//! - `stream`: Incremental JSON array reader with byte-offset progress.
//! - `ingest`: Resume-aware streaming ingestion into one partition.
//! - `store`: DuckDB wrapper plus the completion registry.
//! - `registry`: Discovery of monthly semantic history partitions.
//! - `query`: Point and interval-overlap lookups with cross-partition unions.
//! - `extract`: Field extractors for the shipped record/history datasets.
//!
//! To get started, build an [`IndexConfig`] and open a [`TakeoutIndex`]; the
//! `*_by_date` / `*_by_range` methods ensure the touched partitions are
//! ingested before reading them.

pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod paths;
pub mod query;
pub mod registry;
pub mod store;
pub mod stream;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use ingest::{ingest, IngestProgress, IngestReport};
pub use models::{Dataset, Extractor, RowFields, TableSchema};
pub use registry::{HistoryRegistry, Partition};
pub use store::Store;

/// Names one indexable dataset for [`TakeoutIndex::is_indexed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetId {
    Records,
    HistoryMonth { year: i32, month: u32 },
    /// Every discovered history month. Vacuously indexed when the export has
    /// no semantic history at all.
    History,
}

/// Engine facade: one store, one records partition, one registry of monthly
/// history partitions. Single ingestion writer per table is assumed; reads of
/// completed tables are freely concurrent.
pub struct TakeoutIndex {
    config: IndexConfig,
    store: Store,
    records_source: PathBuf,
    records_table: Option<String>,
    history: HistoryRegistry,
}

impl TakeoutIndex {
    /// Open the store and resolve partition identities. Source files are
    /// stat'ed but not read; ingestion happens lazily on first query.
    pub fn open(config: IndexConfig) -> Result<Self> {
        let store = Store::open(config.db_file.as_deref())?;
        let records_source = paths::records_path(&config.takeout_root);
        let records_table = if records_source.is_file() {
            Some(identity::table_name(extract::RECORDS.name, &records_source)?)
        } else {
            None
        };
        let history = HistoryRegistry::discover(&config.takeout_root)?;
        Ok(Self {
            config,
            store,
            records_source,
            records_table,
            history,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Discovered `(year, month)` history partitions, ascending.
    pub fn history_months(&self) -> Vec<(i32, u32)> {
        self.history.months()
    }

    pub fn is_indexed(&self, dataset: DatasetId) -> Result<bool> {
        match dataset {
            DatasetId::Records => match &self.records_table {
                Some(table) => self.store.is_complete(table),
                None => Ok(false),
            },
            DatasetId::HistoryMonth { year, month } => match self.history.get(year, month) {
                Some(p) => self.store.is_complete(&p.table),
                None => Ok(false),
            },
            DatasetId::History => {
                for p in self.history.iter() {
                    if !self.store.is_complete(&p.table)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn records(&self) -> Result<(&Path, &str)> {
        match &self.records_table {
            Some(table) => Ok((self.records_source.as_path(), table.as_str())),
            None => Err(IndexError::SourceUnreadable {
                path: self.records_source.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }

    /// Ingest (or resume ingesting) the records file. No-op once complete.
    pub fn ensure_records(&self, progress: Option<&IngestProgress>) -> Result<IngestReport> {
        let (source, table) = self.records()?;
        ingest::ingest(
            &self.store,
            &extract::RECORDS,
            source,
            table,
            self.config.commit_every,
            progress,
        )
    }

    /// Ingest (or resume ingesting) one history month. Errors when the export
    /// has no file for that month.
    pub fn ensure_history_month(
        &self,
        year: i32,
        month: u32,
        progress: Option<&IngestProgress>,
    ) -> Result<IngestReport> {
        let partition = self.history.get(year, month).ok_or_else(|| {
            match paths::history_path(&self.config.takeout_root, year, month) {
                Some(path) => IndexError::SourceUnreadable {
                    path,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                },
                None => IndexError::SourceUnreadable {
                    path: paths::history_dir(&self.config.takeout_root),
                    source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
                },
            }
        })?;
        self.ensure_partition(partition, progress)
    }

    fn ensure_partition(
        &self,
        partition: &Partition,
        progress: Option<&IngestProgress>,
    ) -> Result<IngestReport> {
        ingest::ingest(
            &self.store,
            &extract::HISTORY,
            &partition.path,
            &partition.table,
            self.config.commit_every,
            progress,
        )
    }

    /// All records whose timestamp falls on `date` (UTC), ascending.
    pub fn records_by_date<T, F>(&self, date: NaiveDate, parse: F) -> Result<Vec<T>>
    where
        F: Fn(i64, &str) -> serde_json::Result<T>,
    {
        let (start, end) = query::day_window(date);
        self.records_by_range(start, end, parse)
    }

    /// All records with timestamp in `[start, end)`, ascending.
    pub fn records_by_range<T, F>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        parse: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(i64, &str) -> serde_json::Result<T>,
    {
        self.ensure_records(None)?;
        let (_, table) = self.records()?;
        let tables = vec![table.to_string()];
        query::by_range(&self.store, &tables, TableSchema::Point, start, end, parse)
    }

    /// All timeline objects overlapping `date` (UTC), ordered by start time.
    pub fn history_by_date<T, F>(&self, date: NaiveDate, parse: F) -> Result<Vec<T>>
    where
        F: Fn(i64, &str) -> serde_json::Result<T>,
    {
        let (start, end) = query::day_window(date);
        self.history_by_range(start, end, parse)
    }

    /// All timeline objects overlapping `[start, end)`, ordered by start
    /// time, interleaved across month partitions. Touched partitions are
    /// ingested first; months without a backing file are skipped.
    pub fn history_by_range<T, F>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        parse: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(i64, &str) -> serde_json::Result<T>,
    {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let partitions = self.history.partitions_for(start, end, true);
        for partition in &partitions {
            self.ensure_partition(partition, None)?;
        }
        let tables: Vec<String> = partitions.iter().map(|p| p.table.clone()).collect();
        query::by_range(&self.store, &tables, TableSchema::Span, start, end, parse)
    }

    /// First and last indexed record timestamp, or `None` for an empty file.
    pub fn records_extent(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        self.ensure_records(None)?;
        let (_, table) = self.records()?;
        self.store.table_extent(table, "ts_ns")
    }
}
