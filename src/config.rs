//! Engine configuration.
//!
//! All knobs live on an explicit struct handed to [`crate::TakeoutIndex::open`];
//! there is no process-wide state, environment parsing, or memoized path
//! lookup inside the engine.

use std::path::PathBuf;

/// Default number of array elements between durable commits during ingestion.
pub const DEFAULT_COMMIT_EVERY: usize = 1000;

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory containing the extracted export (the parent of `Takeout/`).
    pub takeout_root: PathBuf,
    /// Database file for the embedded store. `None` keeps the store in
    /// memory, which is only useful for tests and throwaway sessions.
    pub db_file: Option<PathBuf>,
    /// Elements per ingestion commit. Bounds both the work lost on
    /// interruption and the resume scan cost.
    pub commit_every: usize,
}

impl IndexConfig {
    pub fn new(takeout_root: impl Into<PathBuf>) -> Self {
        Self {
            takeout_root: takeout_root.into(),
            db_file: None,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }

    pub fn db_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_file = Some(path.into());
        self
    }

    pub fn commit_every(mut self, n: usize) -> Self {
        self.commit_every = n.max(1);
        self
    }
}
