//! Field extractors for the two shipped datasets.
//!
//! Records rows index a single `timestamp`; semantic history rows index the
//! `duration` interval of whichever of `activitySegment` / `placeVisit` the
//! timeline object carries.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{Dataset, RowFields, TableSchema};

/// `Records.json`: one giant `locations` array of timestamped fixes.
pub const RECORDS: Dataset = Dataset {
    name: "records",
    array_path: &["locations"],
    schema: TableSchema::Point,
    extract: record_fields,
};

/// One semantic history month: a `timelineObjects` array of duration-bearing
/// visits and activity segments.
pub const HISTORY: Dataset = Dataset {
    name: "history",
    array_path: &["timelineObjects"],
    schema: TableSchema::Span,
    extract: timeline_fields,
};

fn parse_ts(v: &Value, what: &str) -> Result<DateTime<Utc>, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{what} is not a string"))?;
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("{what} {s:?}: {e}"))
}

fn record_fields(element: &Value) -> Result<RowFields, String> {
    let ts = element
        .get("timestamp")
        .ok_or_else(|| "missing timestamp".to_string())?;
    Ok(RowFields::Point {
        ts: parse_ts(ts, "timestamp")?,
    })
}

fn timeline_fields(element: &Value) -> Result<RowFields, String> {
    let segment = element
        .get("activitySegment")
        .or_else(|| element.get("placeVisit"))
        .ok_or_else(|| "neither activitySegment nor placeVisit present".to_string())?;
    let duration = segment
        .get("duration")
        .ok_or_else(|| "missing duration".to_string())?;
    let start = parse_ts(
        duration
            .get("startTimestamp")
            .ok_or_else(|| "missing duration.startTimestamp".to_string())?,
        "startTimestamp",
    )?;
    let end = parse_ts(
        duration
            .get("endTimestamp")
            .ok_or_else(|| "missing duration.endTimestamp".to_string())?,
        "endTimestamp",
    )?;
    Ok(RowFields::Span { start, end })
}
