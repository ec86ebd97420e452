//! Library error type.
//!
//! Every failure a caller can observe is a variant here, so "no rows in range"
//! (an empty `Vec`) stays distinguishable from "the query failed" (an `Err`).
//! A partially ingested partition is deliberately *not* an error state: the
//! next ingestion run resumes from the last committed row.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The source export file is missing or unreadable.
    #[error("cannot read source {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source file is not valid JSON, or the configured array path does
    /// not lead to an array.
    #[error("malformed JSON in {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    /// The field extractor rejected element `index` of the source array.
    #[error("field extraction failed on element {index}: {detail}")]
    Extract { index: i64, detail: String },

    /// A stored payload no longer parses into its domain type. The index
    /// itself is untrustworthy, so this aborts the whole query call.
    #[error("payload for row {id} in table {table} failed to parse: {source}")]
    PayloadCorruption {
        table: String,
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("store: {0}")]
    Store(#[from] duckdb::Error),

    /// A table was marked complete twice. Completion rows are insert-once.
    #[error("table {table} was already marked complete")]
    Completion { table: String },
}

pub type Result<T> = std::result::Result<T, IndexError>;
