//! Authoritative layout of an extracted Takeout export.
//!
//! Layout:
//! `root/Takeout/Location History/Records.json`
//! `root/Takeout/Location History/Semantic Location History/YYYY/YYYY_MONTHNAME.json`

use std::path::{Path, PathBuf};

/// Upper-case month names as they appear in semantic history file names.
pub const MONTHS: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

fn location_history_dir(takeout_root: &Path) -> PathBuf {
    takeout_root.join("Takeout").join("Location History")
}

pub fn records_path(takeout_root: &Path) -> PathBuf {
    location_history_dir(takeout_root).join("Records.json")
}

pub fn history_dir(takeout_root: &Path) -> PathBuf {
    location_history_dir(takeout_root).join("Semantic Location History")
}

/// Path of one month's semantic history file. `month` is 1-based; `None` for
/// a month outside 1..=12.
pub fn history_path(takeout_root: &Path, year: i32, month: u32) -> Option<PathBuf> {
    let name = MONTHS.get(month.checked_sub(1)? as usize)?;
    Some(
        history_dir(takeout_root)
            .join(year.to_string())
            .join(format!("{year}_{name}.json")),
    )
}

/// Parse `YYYY_MONTHNAME.json` into `(year, month)`. Returns `None` for file
/// names that do not follow the semantic history convention.
pub fn parse_history_file_name(name: &str) -> Option<(i32, u32)> {
    let stem = name.strip_suffix(".json")?;
    let (year, month_name) = stem.split_once('_')?;
    let year: i32 = year.parse().ok()?;
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))? as u32
        + 1;
    Some((year, month))
}
