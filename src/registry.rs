//! Discovery of monthly semantic history partitions.
//!
//! One export holds one file per calendar month. The registry scans the
//! directory tree once at startup, resolves each file to its partition table
//! through the identity hash, and answers which partitions a time window
//! touches. One uniform schema plus a `(year, month) -> partition` map; no
//! per-month types.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::warn;

use crate::error::{IndexError, Result};
use crate::{identity, paths};

#[derive(Debug, Clone)]
pub struct Partition {
    pub year: i32,
    pub month: u32,
    pub path: PathBuf,
    pub table: String,
}

#[derive(Debug, Default)]
pub struct HistoryRegistry {
    partitions: BTreeMap<(i32, u32), Partition>,
}

impl HistoryRegistry {
    /// Scan `root/Takeout/Location History/Semantic Location History`. A
    /// missing directory is an empty registry, not an error. Files that do
    /// not follow the `YYYY_MONTHNAME.json` convention are skipped with a
    /// warning.
    pub fn discover(takeout_root: &Path) -> Result<Self> {
        let dir = paths::history_dir(takeout_root);
        let mut partitions = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Self { partitions });
        }
        let unreadable = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| IndexError::SourceUnreadable { path, source: e }
        };
        for year_entry in fs::read_dir(&dir).map_err(unreadable(&dir))? {
            let year_path = year_entry.map_err(unreadable(&dir))?.path();
            if !year_path.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&year_path).map_err(unreadable(&year_path))? {
                let path = entry.map_err(unreadable(&year_path))?.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some((year, month)) = paths::parse_history_file_name(name) else {
                    warn!(file = name, "unrecognized file in semantic history directory");
                    continue;
                };
                let table = identity::table_name("history", &path)?;
                partitions.insert((year, month), Partition { year, month, path, table });
            }
        }
        Ok(Self { partitions })
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn months(&self) -> Vec<(i32, u32)> {
        self.partitions.keys().copied().collect()
    }

    pub fn get(&self, year: i32, month: u32) -> Option<&Partition> {
        self.partitions.get(&(year, month))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Partitions whose month overlaps `[start, end)`, oldest first. With
    /// `widen_start`, the month before `start` is included too, so spans that
    /// begin in the previous month's file and reach into the window are still
    /// visible. Months without a backing file are skipped.
    pub fn partitions_for(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        widen_start: bool,
    ) -> Vec<&Partition> {
        let mut keys = months_in_range(start, end);
        if widen_start {
            if let Some(&first) = keys.first() {
                keys.insert(0, prev_month(first));
            }
        }
        keys.iter()
            .filter_map(|&(y, m)| self.partitions.get(&(y, m)))
            .collect()
    }
}

/// First instant of a calendar month, UTC.
pub fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// `(year, month)` keys whose month overlaps the half-open window
/// `[start, end)`, in ascending order. Partial months at both ends count.
pub fn months_in_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(i32, u32)> {
    let mut out = Vec::new();
    if end <= start {
        return out;
    }
    let (mut year, mut month) = (start.year(), start.month());
    while month_start(year, month).map_or(false, |first| first < end) {
        out.push((year, month));
        (year, month) = next_month((year, month));
    }
    out
}

pub fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn prev_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}
