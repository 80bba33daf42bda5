use crate::{FeedbackRow, LearningRow};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// A sqlite-backed implementation of the Memory Store contract (spec.md
/// §4.C). `rusqlite::Connection` is `!Sync`, so access is serialized behind a
/// [`Mutex`] — the store is single-process, single-writer by design (the
/// Hierarchy Runtime's pool and cache are the only genuinely concurrent
/// in-memory structures in this system).
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Open (creating if needed) the sqlite file at `path` and ensure schema.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn set(&self, key: &str, value: &serde_json::Value) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    pub(crate) fn get(&self, key: &str) -> rusqlite::Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn increment_counter(&self, name: &str, delta: i64) -> rusqlite::Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO counters (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
            params![name, delta],
        )?;
        let value: i64 = conn.query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    pub(crate) fn counter(&self, name: &str) -> rusqlite::Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .or(Ok(0))
    }

    pub(crate) fn insert_feedback(&self, row: &FeedbackRow) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO human_in_loop_feedback
                (detection_id, was_correct, actual_need, comment, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.detection_id,
                row.was_correct,
                row.actual_need,
                row.comment,
                row.timestamp
            ],
        )?;
        Ok(())
    }

    pub(crate) fn list_feedback(&self) -> rusqlite::Result<Vec<FeedbackRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT detection_id, was_correct, actual_need, comment, timestamp
             FROM human_in_loop_feedback ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FeedbackRow {
                detection_id: row.get(0)?,
                was_correct: row.get(1)?,
                actual_need: row.get(2)?,
                comment: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    pub(crate) fn upsert_learning(&self, row: &LearningRow) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO human_in_loop_learning (pattern_name, tp, fp, fn_count, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(pattern_name) DO UPDATE SET
                tp = excluded.tp,
                fp = excluded.fp,
                fn_count = excluded.fn_count,
                last_updated = excluded.last_updated",
            params![row.pattern_name, row.tp, row.fp, row.fn_, row.last_updated],
        )?;
        Ok(())
    }

    pub(crate) fn get_learning(&self, pattern_name: &str) -> rusqlite::Result<Option<LearningRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT pattern_name, tp, fp, fn_count, last_updated
             FROM human_in_loop_learning WHERE pattern_name = ?1",
        )?;
        let mut rows = stmt.query(params![pattern_name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(LearningRow {
                pattern_name: row.get(0)?,
                tp: row.get(1)?,
                fp: row.get(2)?,
                fn_: row.get(3)?,
                last_updated: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn list_learning(&self) -> rusqlite::Result<Vec<LearningRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT pattern_name, tp, fp, fn_count, last_updated FROM human_in_loop_learning",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LearningRow {
                pattern_name: row.get(0)?,
                tp: row.get(1)?,
                fp: row.get(2)?,
                fn_: row.get(3)?,
                last_updated: row.get(4)?,
            })
        })?;
        rows.collect()
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS human_in_loop_feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            detection_id TEXT NOT NULL,
            was_correct INTEGER NOT NULL,
            actual_need TEXT NOT NULL,
            comment TEXT,
            timestamp INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS human_in_loop_learning (
            pattern_name TEXT PRIMARY KEY,
            tp INTEGER NOT NULL DEFAULT 0,
            fp INTEGER NOT NULL DEFAULT 0,
            fn_count INTEGER NOT NULL DEFAULT 0,
            last_updated INTEGER NOT NULL
         );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.sqlite3");
        let store1 = SqliteMemoryStore::open(&path).unwrap();
        drop(store1);
        // Reopening must not fail even though tables already exist.
        let store2 = SqliteMemoryStore::open(&path).unwrap();
        assert_eq!(store2.counter("x").unwrap(), 0);
    }
}
