use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use takeout_index::{identity, paths, DatasetId, IndexConfig, IndexError, TakeoutIndex};

fn write_records(root: &Path, items: &[Value]) {
    let dir = root.join("Takeout").join("Location History");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("Records.json"),
        serde_json::to_string(&json!({ "locations": items })).unwrap(),
    )
    .unwrap();
}

fn write_history_month(root: &Path, year: i32, month_name: &str, objects: &[Value]) {
    let dir = root
        .join("Takeout")
        .join("Location History")
        .join("Semantic Location History")
        .join(year.to_string());
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{year}_{month_name}.json")),
        serde_json::to_string(&json!({ "timelineObjects": objects })).unwrap(),
    )
    .unwrap();
}

fn record(ts: &str) -> Value {
    json!({"timestamp": ts, "latitudeE7": 520000000, "longitudeE7": 43000000})
}

fn visit(start: &str, end: &str) -> Value {
    json!({"placeVisit": {
        "duration": {"startTimestamp": start, "endTimestamp": end},
        "location": {"name": "somewhere"}
    }})
}

fn segment(start: &str, end: &str) -> Value {
    json!({"activitySegment": {
        "duration": {"startTimestamp": start, "endTimestamp": end},
        "activityType": "WALKING"
    }})
}

#[derive(Debug, Deserialize)]
struct Loc {
    #[serde(default)]
    id: i64,
    timestamp: String,
}

fn parse_loc(id: i64, payload: &str) -> serde_json::Result<Loc> {
    let mut loc: Loc = serde_json::from_str(payload)?;
    loc.id = id;
    Ok(loc)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineObject {
    #[serde(default)]
    id: i64,
    place_visit: Option<Segment>,
    activity_segment: Option<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    duration: SegmentDuration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentDuration {
    start_timestamp: String,
    end_timestamp: String,
}

impl TimelineObject {
    fn start(&self) -> &str {
        self.place_visit
            .as_ref()
            .or(self.activity_segment.as_ref())
            .map(|s| s.duration.start_timestamp.as_str())
            .expect("timeline object carries a duration")
    }
}

fn parse_obj(id: i64, payload: &str) -> serde_json::Result<TimelineObject> {
    let mut obj: TimelineObject = serde_json::from_str(payload)?;
    obj.id = id;
    Ok(obj)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn point_date_query_splits_on_the_day_boundary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(
        dir.path(),
        &[
            record("2023-01-01T23:59:00Z"),
            record("2023-01-02T00:01:00Z"),
        ],
    );
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;

    let day1 = index.records_by_date(date(2023, 1, 1), parse_loc)?;
    assert_eq!(day1.len(), 1);
    assert_eq!(day1[0].timestamp, "2023-01-01T23:59:00Z");
    assert_eq!(day1[0].id, 0);

    let day2 = index.records_by_date(date(2023, 1, 2), parse_loc)?;
    assert_eq!(day2.len(), 1);
    assert_eq!(day2[0].timestamp, "2023-01-02T00:01:00Z");
    assert_eq!(day2[0].id, 1);
    Ok(())
}

#[test]
fn interval_overlap_is_visible_from_both_sides_of_a_month_boundary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_history_month(
        dir.path(),
        2023,
        "MARCH",
        &[
            visit("2023-03-30T09:00:00Z", "2023-03-30T10:00:00Z"),
            segment("2023-03-31T23:00:00Z", "2023-04-01T01:00:00Z"),
        ],
    );
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;

    let last_of_march = index.history_by_date(date(2023, 3, 31), parse_obj)?;
    assert_eq!(last_of_march.len(), 1);
    assert_eq!(last_of_march[0].start(), "2023-03-31T23:00:00Z");

    // The segment lives in the March file but still answers an April query,
    // even though no April partition exists.
    let first_of_april = index.history_by_date(date(2023, 4, 1), parse_obj)?;
    assert_eq!(first_of_april.len(), 1);
    assert_eq!(first_of_april[0].start(), "2023-03-31T23:00:00Z");

    assert!(index.history_by_date(date(2023, 4, 2), parse_obj)?.is_empty());
    Ok(())
}

#[test]
fn range_query_interleaves_partitions_by_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let january: Vec<Value> = (20..25)
        .map(|d| {
            visit(
                &format!("2023-01-{d}T10:00:00Z"),
                &format!("2023-01-{d}T11:00:00Z"),
            )
        })
        .collect();
    let february: Vec<Value> = (5..10)
        .map(|d| {
            visit(
                &format!("2023-02-{d:02}T10:00:00Z"),
                &format!("2023-02-{d:02}T11:00:00Z"),
            )
        })
        .collect();
    write_history_month(dir.path(), 2023, "JANUARY", &january);
    write_history_month(dir.path(), 2023, "FEBRUARY", &february);

    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let start = Utc.with_ymd_and_hms(2023, 1, 20, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2023, 2, 10, 0, 0, 0).unwrap();
    let got = index.history_by_range(start, end, parse_obj)?;

    assert_eq!(got.len(), 10);
    let starts: Vec<&str> = got.iter().map(|o| o.start()).collect();
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted, "rows must interleave by time, not partition");
    assert_eq!(starts.first(), Some(&"2023-01-20T10:00:00Z"));
    assert_eq!(starts.last(), Some(&"2023-02-09T10:00:00Z"));
    // ids restart per partition, so both 0..5 ranges appear once each
    let mut ids: Vec<i64> = got.iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
    Ok(())
}

#[test]
fn corrupted_payload_is_a_hard_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(dir.path(), &[record("2023-01-01T10:00:00Z")]);
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;

    // Index the file, then vandalize the stored payload directly.
    index.ensure_records(None)?;
    let table = identity::table_name("records", &paths::records_path(dir.path()))?;
    index.store().conn().execute(
        &format!(r#"UPDATE "{table}" SET payload = 'not json' WHERE id = 0"#),
        [],
    )?;

    let err = index
        .records_by_date(date(2023, 1, 1), parse_loc)
        .unwrap_err();
    assert!(matches!(err, IndexError::PayloadCorruption { id: 0, .. }));
    Ok(())
}

#[test]
fn is_indexed_tracks_completion_per_dataset() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(dir.path(), &[record("2023-01-05T10:00:00Z")]);
    write_history_month(
        dir.path(),
        2023,
        "JANUARY",
        &[visit("2023-01-05T10:00:00Z", "2023-01-05T11:00:00Z")],
    );
    write_history_month(
        dir.path(),
        2023,
        "FEBRUARY",
        &[visit("2023-02-05T10:00:00Z", "2023-02-05T11:00:00Z")],
    );

    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    assert!(!index.is_indexed(DatasetId::Records)?);
    assert!(!index.is_indexed(DatasetId::History)?);

    index.ensure_records(None)?;
    assert!(index.is_indexed(DatasetId::Records)?);

    index.ensure_history_month(2023, 1, None)?;
    assert!(index.is_indexed(DatasetId::HistoryMonth { year: 2023, month: 1 })?);
    assert!(!index.is_indexed(DatasetId::History)?);
    // A month with no backing file is never indexed.
    assert!(!index.is_indexed(DatasetId::HistoryMonth { year: 2023, month: 12 })?);

    index.ensure_history_month(2023, 2, None)?;
    assert!(index.is_indexed(DatasetId::History)?);
    Ok(())
}

#[test]
fn records_extent_spans_first_to_last() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(
        dir.path(),
        &[
            record("2022-11-03T08:00:00Z"),
            record("2023-01-01T12:00:00Z"),
            record("2023-06-30T23:59:59Z"),
        ],
    );
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let (first, last) = index.records_extent()?.expect("records are not empty");
    assert_eq!(first, Utc.with_ymd_and_hms(2022, 11, 3, 8, 0, 0).unwrap());
    assert_eq!(last, Utc.with_ymd_and_hms(2023, 6, 30, 23, 59, 59).unwrap());
    Ok(())
}

#[test]
fn missing_records_file_errors_instead_of_answering_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let err = index
        .records_by_date(date(2023, 1, 1), parse_loc)
        .unwrap_err();
    assert!(matches!(err, IndexError::SourceUnreadable { .. }));
    Ok(())
}

#[test]
fn extreme_range_bounds_clamp_instead_of_failing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(
        dir.path(),
        &[
            record("2023-01-01T10:00:00Z"),
            record("2023-01-02T10:00:00Z"),
        ],
    );
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let all = index.records_by_range(
        chrono::DateTime::<Utc>::MIN_UTC,
        chrono::DateTime::<Utc>::MAX_UTC,
        parse_loc,
    )?;
    assert_eq!(all.len(), 2);
    Ok(())
}

#[test]
fn out_of_calendar_month_is_an_error_not_a_panic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let err = index.ensure_history_month(2023, 13, None).unwrap_err();
    assert!(matches!(err, IndexError::SourceUnreadable { .. }));
    Ok(())
}

#[test]
fn reversed_range_bounds_are_normalized() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_records(
        dir.path(),
        &[
            record("2023-01-01T10:00:00Z"),
            record("2023-01-02T10:00:00Z"),
        ],
    );
    let index = TakeoutIndex::open(IndexConfig::new(dir.path()))?;
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
    let forward = index.records_by_range(start, end, parse_loc)?;
    let reversed = index.records_by_range(end, start, parse_loc)?;
    assert_eq!(forward.len(), 2);
    assert_eq!(
        forward.iter().map(|l| l.id).collect::<Vec<_>>(),
        reversed.iter().map(|l| l.id).collect::<Vec<_>>()
    );
    Ok(())
}
