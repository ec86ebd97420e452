//! Core descriptors shared by ingestion and querying.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Column layout of a partition table. Every partition of one dataset shares
/// the same schema; that is what makes cross-partition `UNION ALL` reads valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSchema {
    /// Rows carry a single timestamp: `(id, ts_ns, payload)`.
    Point,
    /// Rows carry an interval: `(id, start_ts_ns, end_ts_ns, payload)`.
    Span,
}

impl TableSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            TableSchema::Point => "point",
            TableSchema::Span => "span",
        }
    }
}

/// Indexed columns extracted from one raw array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFields {
    Point {
        ts: DateTime<Utc>,
    },
    Span {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl RowFields {
    pub fn kind(&self) -> &'static str {
        match self {
            RowFields::Point { .. } => "point",
            RowFields::Span { .. } => "span",
        }
    }
}

/// Caller-supplied pure function deriving the indexed columns from a raw
/// decoded element. Failures carry a human-readable detail string; the
/// ingestion engine attaches the element index.
pub type Extractor = fn(&Value) -> std::result::Result<RowFields, String>;

/// Static description of one ingestible dataset: where its top-level array
/// lives inside the document and how rows derive their timestamp column(s).
#[derive(Debug, Clone, Copy)]
pub struct Dataset {
    pub name: &'static str,
    /// Chain of object keys leading to the array; empty means the document
    /// root is the array itself.
    pub array_path: &'static [&'static str],
    pub schema: TableSchema,
    pub extract: Extractor,
}
