//! Embedded store wrapper and the completion registry.
//!
//! One DuckDB connection owns everything: the `completed_tables` registry and
//! every partition table. Timestamps live as BIGINT nanoseconds since the
//! Unix epoch (UTC); conversion happens at the edges via [`dt_to_ns`] /
//! [`ns_to_dt`].

use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::models::TableSchema;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a file-backed store, or an in-memory one when `db_file` is
    /// `None`. The completion registry table is created here, so
    /// [`Store::is_complete`] can never observe a missing registry.
    pub fn open(db_file: Option<&Path>) -> Result<Self> {
        let conn = match db_file {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS completed_tables (
                table_name      TEXT   NOT NULL PRIMARY KEY,
                completed_on_ns BIGINT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Expose the raw connection for callers that need ad-hoc statements
    /// (tests, maintenance).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Sole authority for "this table is fully and correctly populated".
    pub fn is_complete(&self, table: &str) -> Result<bool> {
        let hits: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM completed_tables WHERE table_name = ?",
            params![table],
            |r| r.get(0),
        )?;
        Ok(hits > 0)
    }

    /// Record completion. Insert-once: a second call for the same name is a
    /// caller bug and comes back as [`IndexError::Completion`].
    pub fn mark_complete(&self, table: &str) -> Result<()> {
        if self.is_complete(table)? {
            return Err(IndexError::Completion {
                table: table.to_string(),
            });
        }
        self.conn.execute(
            "INSERT INTO completed_tables (table_name, completed_on_ns) VALUES (?, ?)",
            params![table, dt_to_ns(Utc::now())?],
        )?;
        debug!(table, "marked complete");
        Ok(())
    }

    /// Create a partition table (and its timestamp index) if absent.
    pub fn create_partition_table(&self, table: &str, schema: TableSchema) -> Result<()> {
        let ddl = match schema {
            TableSchema::Point => format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{table}" (
                    id      BIGINT NOT NULL PRIMARY KEY,
                    ts_ns   BIGINT NOT NULL,
                    payload TEXT   NOT NULL
                );
                CREATE INDEX IF NOT EXISTS "idx_{table}_ts" ON "{table}"(ts_ns);
                "#
            ),
            TableSchema::Span => format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{table}" (
                    id          BIGINT NOT NULL PRIMARY KEY,
                    start_ts_ns BIGINT NOT NULL,
                    end_ts_ns   BIGINT NOT NULL,
                    payload     TEXT   NOT NULL
                );
                CREATE INDEX IF NOT EXISTS "idx_{table}_span" ON "{table}"(start_ts_ns, end_ts_ns);
                "#
            ),
        };
        self.conn.execute_batch(&ddl)?;
        Ok(())
    }

    /// Row count doubles as the resume cursor: ids are assigned in strict
    /// array order from 0 and only whole prefixes are ever committed, so the
    /// count is exactly the index of the next unseen element.
    pub fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!(r#"SELECT COUNT(*) FROM "{table}""#);
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Min/max of a timestamp column, or `None` for an empty table.
    pub fn table_extent(
        &self,
        table: &str,
        ts_col: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let sql = format!(r#"SELECT MIN({ts_col}), MAX({ts_col}) FROM "{table}""#);
        let bounds: (Option<i64>, Option<i64>) =
            self.conn
                .query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
        match bounds {
            (Some(lo), Some(hi)) => Ok(Some((ns_to_dt(lo)?, ns_to_dt(hi)?))),
            _ => Ok(None),
        }
    }
}

// i64 nanoseconds cover roughly 1677..=2262; anything outside is unstorable.
#[inline]
pub fn dt_to_ns(dt: DateTime<Utc>) -> Result<i64> {
    dt.timestamp_nanos_opt().ok_or_else(|| {
        IndexError::Store(duckdb::Error::FromSqlConversionFailure(
            0,
            duckdb::types::Type::BigInt,
            Box::new(std::io::Error::other(format!(
                "timestamp {dt} out of range"
            ))),
        ))
    })
}

/// Like [`dt_to_ns`] but saturating at the representable bounds. Suitable for
/// window edges, where clamping keeps the window's meaning.
#[inline]
pub fn dt_to_ns_saturating(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or_else(|| {
        if dt.timestamp() >= 0 {
            i64::MAX
        } else {
            i64::MIN
        }
    })
}

// Convert ns -> DateTime only at the edges; keep BIGINT ns in the DB.
#[inline]
pub fn ns_to_dt(ns: i64) -> Result<DateTime<Utc>> {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = (ns.rem_euclid(1_000_000_000)) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(|| {
        IndexError::Store(duckdb::Error::FromSqlConversionFailure(
            0,
            duckdb::types::Type::BigInt,
            Box::new(std::io::Error::other("timestamp out of range")),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ns_round_trip() {
        let dt = Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap();
        assert_eq!(ns_to_dt(dt_to_ns(dt).unwrap()).unwrap(), dt);
    }

    #[test]
    fn out_of_range_timestamps_error_instead_of_panicking() {
        let far_future = Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap();
        let far_past = Utc.with_ymd_and_hms(1000, 1, 1, 0, 0, 0).unwrap();
        assert!(dt_to_ns(far_future).is_err());
        assert!(dt_to_ns(far_past).is_err());
        assert_eq!(dt_to_ns_saturating(far_future), i64::MAX);
        assert_eq!(dt_to_ns_saturating(far_past), i64::MIN);
        assert_eq!(
            dt_to_ns_saturating(Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap()),
            dt_to_ns(Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap()).unwrap()
        );
    }

    #[test]
    fn completion_registry_round_trip() {
        let store = Store::open(None).unwrap();
        assert!(!store.is_complete("never_seen").unwrap());
        store.mark_complete("t1").unwrap();
        assert!(store.is_complete("t1").unwrap());
        assert!(matches!(
            store.mark_complete("t1"),
            Err(IndexError::Completion { .. })
        ));
    }

    #[test]
    fn partition_ddl_is_idempotent() {
        let store = Store::open(None).unwrap();
        store.create_partition_table("p", TableSchema::Point).unwrap();
        store.create_partition_table("p", TableSchema::Point).unwrap();
        store.create_partition_table("s", TableSchema::Span).unwrap();
        assert_eq!(store.row_count("p").unwrap(), 0);
        assert_eq!(store.table_extent("p", "ts_ns").unwrap(), None);
    }
}
