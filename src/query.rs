//! Point-date and date-range lookups.
//!
//! Reads are plain SQL over the partition tables: a filtered select per
//! partition, `UNION ALL` across partitions of the same schema, ordered by
//! the start/primary timestamp so rows interleave by time rather than by
//! partition. Payloads rehydrate through the caller's validating parser; a
//! parse failure means the index itself is untrustworthy and aborts the call.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::{IndexError, Result};
use crate::models::TableSchema;
use crate::store::{dt_to_ns_saturating, Store};

/// Half-open UTC window `[midnight, midnight + 1 day)` for a calendar date.
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// All rows for one calendar date. Overlap policy follows the schema: point
/// tables match `ts ∈ [start, end)`, span tables match any interval touching
/// the window, even one that starts before it or ends after it.
pub fn by_date<T, F>(
    store: &Store,
    tables: &[String],
    schema: TableSchema,
    date: NaiveDate,
    parse: F,
) -> Result<Vec<T>>
where
    F: Fn(i64, &str) -> serde_json::Result<T>,
{
    let (start, end) = day_window(date);
    by_range(store, tables, schema, start, end, parse)
}

/// All rows in `[start, end)` across any number of same-schema partitions,
/// ordered by start/primary timestamp ascending (id breaks ties).
pub fn by_range<T, F>(
    store: &Store,
    tables: &[String],
    schema: TableSchema,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parse: F,
) -> Result<Vec<T>>
where
    F: Fn(i64, &str) -> serde_json::Result<T>,
{
    let (start, end) = if end < start { (end, start) } else { (start, end) };
    if tables.is_empty() || start == end {
        return Ok(Vec::new());
    }
    // Window edges clamp to the storable ns range; stored rows always fit,
    // so a clamped edge keeps the same meaning.
    let start_ns = dt_to_ns_saturating(start);
    let end_ns = dt_to_ns_saturating(end);

    // Table names come from the identity resolver and are plain [a-z0-9_];
    // the window bounds are integers. Safe to inline.
    let selects: Vec<String> = tables
        .iter()
        .map(|t| match schema {
            TableSchema::Point => format!(
                r#"SELECT id, '{t}' AS tbl, ts_ns AS ord_ns, payload FROM "{t}" WHERE ts_ns >= {start_ns} AND ts_ns < {end_ns}"#
            ),
            TableSchema::Span => format!(
                r#"SELECT id, '{t}' AS tbl, start_ts_ns AS ord_ns, payload FROM "{t}" WHERE start_ts_ns < {end_ns} AND end_ts_ns >= {start_ns}"#
            ),
        })
        .collect();
    let sql = format!(
        "{} ORDER BY ord_ns ASC, id ASC",
        selects.join(" UNION ALL ")
    );

    let conn = store.conn();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let table: String = row.get(1)?;
        let payload: String = row.get(3)?;
        let value = parse(id, &payload).map_err(|e| IndexError::PayloadCorruption {
            table,
            id,
            source: e,
        })?;
        out.push(value);
    }
    Ok(out)
}
