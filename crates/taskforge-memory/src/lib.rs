//! Embedded key/value store with counter and row APIs, used by the guardrail
//! detector to persist learning across process restarts (spec.md §4.C).
//!
//! The store degrades gracefully: if the sqlite-backed [`SqliteMemoryStore`]
//! cannot be opened, [`MemoryStore`] falls back to an in-memory-only mode
//! rather than raising — every caller keeps working, just without durability.
//!
//! # Main types
//!
//! - [`MemoryStore`] — the façade every caller talks to.
//! - [`FeedbackRow`] / [`LearningRow`] — the two logical tables from spec.md §4.C.

mod sqlite;

pub use sqlite::SqliteMemoryStore;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use taskforge_core::TaskforgeResult;

/// One row of the `human_in_loop_feedback` logical table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRow {
    /// The detection this feedback responds to.
    pub detection_id: String,
    /// Whether the detector's original call was judged correct.
    pub was_correct: bool,
    /// What the human said was actually needed (`"yes"` or `"no"`).
    pub actual_need: String,
    /// Optional freeform comment.
    pub comment: Option<String>,
    /// Unix timestamp (seconds) the feedback was recorded.
    pub timestamp: i64,
}

/// One row of the `human_in_loop_learning` logical table: per-pattern
/// accuracy counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LearningRow {
    /// Pattern family name (built-in or `learned_<n>`).
    pub pattern_name: String,
    /// True positives.
    pub tp: i64,
    /// False positives.
    pub fp: i64,
    /// False negatives.
    pub fn_: i64,
    /// Unix timestamp (seconds) of the last update.
    pub last_updated: i64,
}

/// In-memory fallback used when no sqlite file is configured, or when the
/// sqlite backend failed to open.
#[derive(Default)]
struct InMemoryState {
    kv: HashMap<String, serde_json::Value>,
    counters: HashMap<String, i64>,
    feedback: Vec<FeedbackRow>,
    learning: HashMap<String, LearningRow>,
}

/// The durable key/value + counter + row store backing the guardrail
/// detector.
///
/// Construct with [`MemoryStore::open`] to try a sqlite-backed file, or
/// [`MemoryStore::in_memory`] to skip persistence entirely (tests, or a
/// deliberate memory-only run). Either way, every method here is infallible
/// from the caller's point of view in the degraded case: a broken backend
/// never surfaces as an error, only as reduced durability.
pub struct MemoryStore {
    backend: Option<SqliteMemoryStore>,
    fallback: RwLock<InMemoryState>,
}

impl MemoryStore {
    /// Open (creating if needed) a sqlite-backed store at `path`. If the
    /// sqlite file cannot be opened, logs a warning and degrades to
    /// memory-only mode rather than returning an error — matching spec.md
    /// §4.C's "graceful degradation" contract and §7's `BackendUnavailable`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        match SqliteMemoryStore::open(path.as_ref()) {
            Ok(backend) => Self {
                backend: Some(backend),
                fallback: RwLock::new(InMemoryState::default()),
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.as_ref().display(), "memory store backend unavailable, degrading to memory-only mode");
                Self::in_memory()
            }
        }
    }

    /// Construct a memory-only store with no persistence at all.
    pub fn in_memory() -> Self {
        Self {
            backend: None,
            fallback: RwLock::new(InMemoryState::default()),
        }
    }

    /// Whether this store is currently backed by durable storage.
    pub fn is_durable(&self) -> bool {
        self.backend.is_some()
    }

    /// Set a key to an arbitrary JSON value.
    pub fn set(&self, key: &str, value: serde_json::Value) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.set(key, &value) {
                tracing::warn!(error = %e, key, "memory store set failed, falling back to in-memory");
                self.fallback.write().kv.insert(key.to_string(), value);
            }
            return;
        }
        self.fallback.write().kv.insert(key.to_string(), value);
    }

    /// Get a key's value, if present.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(backend) = &self.backend {
            match backend.get(key) {
                Ok(v) => return v,
                Err(e) => {
                    tracing::warn!(error = %e, key, "memory store get failed, falling back to in-memory");
                }
            }
        }
        self.fallback.read().kv.get(key).cloned()
    }

    /// Increment a named counter by `delta`, returning the new value.
    pub fn increment_counter(&self, name: &str, delta: i64) -> i64 {
        if let Some(backend) = &self.backend {
            match backend.increment_counter(name, delta) {
                Ok(v) => return v,
                Err(e) => {
                    tracing::warn!(error = %e, name, "counter increment failed, falling back to in-memory");
                }
            }
        }
        let mut state = self.fallback.write();
        let counter = state.counters.entry(name.to_string()).or_insert(0);
        *counter += delta;
        *counter
    }

    /// Read a counter's current value (0 if never incremented).
    pub fn counter(&self, name: &str) -> i64 {
        if let Some(backend) = &self.backend {
            match backend.counter(name) {
                Ok(v) => return v,
                Err(e) => {
                    tracing::warn!(error = %e, name, "counter read failed, falling back to in-memory");
                }
            }
        }
        *self.fallback.read().counters.get(name).unwrap_or(&0)
    }

    /// Append a feedback row.
    pub fn record_feedback(&self, row: FeedbackRow) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.insert_feedback(&row) {
                tracing::warn!(error = %e, "feedback insert failed, falling back to in-memory");
                self.fallback.write().feedback.push(row);
            }
            return;
        }
        self.fallback.write().feedback.push(row);
    }

    /// All recorded feedback rows, oldest first.
    pub fn feedback_rows(&self) -> Vec<FeedbackRow> {
        if let Some(backend) = &self.backend {
            match backend.list_feedback() {
                Ok(rows) => return rows,
                Err(e) => {
                    tracing::warn!(error = %e, "feedback read failed, falling back to in-memory");
                }
            }
        }
        self.fallback.read().feedback.clone()
    }

    /// Upsert a learning row (replacing any row with the same `pattern_name`).
    pub fn upsert_learning(&self, row: LearningRow) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.upsert_learning(&row) {
                tracing::warn!(error = %e, "learning upsert failed, falling back to in-memory");
                self.fallback
                    .write()
                    .learning
                    .insert(row.pattern_name.clone(), row);
            }
            return;
        }
        self.fallback
            .write()
            .learning
            .insert(row.pattern_name.clone(), row);
    }

    /// Fetch a pattern's learning row, if any.
    pub fn learning(&self, pattern_name: &str) -> Option<LearningRow> {
        if let Some(backend) = &self.backend {
            match backend.get_learning(pattern_name) {
                Ok(v) => return v,
                Err(e) => {
                    tracing::warn!(error = %e, pattern_name, "learning read failed, falling back to in-memory");
                }
            }
        }
        self.fallback.read().learning.get(pattern_name).cloned()
    }

    /// All learning rows.
    pub fn all_learning(&self) -> Vec<LearningRow> {
        if let Some(backend) = &self.backend {
            match backend.list_learning() {
                Ok(rows) => return rows,
                Err(e) => {
                    tracing::warn!(error = %e, "learning list failed, falling back to in-memory");
                }
            }
        }
        self.fallback.read().learning.values().cloned().collect()
    }
}

/// Build a [`MemoryStore`] from a config path the way other taskforge
/// components build their persistence layer — `None` means memory-only.
pub fn open_or_in_memory(path: Option<&Path>) -> TaskforgeResult<MemoryStore> {
    Ok(match path {
        Some(p) => MemoryStore::open(p),
        None => MemoryStore::in_memory(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_kv_roundtrips() {
        let store = MemoryStore::in_memory();
        store.set("foo", serde_json::json!({"a": 1}));
        assert_eq!(store.get("foo"), Some(serde_json::json!({"a": 1})));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn in_memory_counters_accumulate() {
        let store = MemoryStore::in_memory();
        assert_eq!(store.increment_counter("hits", 1), 1);
        assert_eq!(store.increment_counter("hits", 4), 5);
        assert_eq!(store.counter("hits"), 5);
        assert_eq!(store.counter("never-touched"), 0);
    }

    #[test]
    fn sqlite_backed_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.sqlite3");

        {
            let store = MemoryStore::open(&path);
            assert!(store.is_durable());
            store.set("k", serde_json::json!("v"));
            store.increment_counter("c", 3);
        }

        let reopened = MemoryStore::open(&path);
        assert!(reopened.is_durable());
        assert_eq!(reopened.get("k"), Some(serde_json::json!("v")));
        assert_eq!(reopened.counter("c"), 3);
    }

    #[test]
    fn feedback_and_learning_round_trip() {
        let store = MemoryStore::in_memory();
        store.record_feedback(FeedbackRow {
            detection_id: "d1".into(),
            was_correct: false,
            actual_need: "yes".into(),
            comment: Some("missed it".into()),
            timestamp: 1000,
        });
        assert_eq!(store.feedback_rows().len(), 1);

        store.upsert_learning(LearningRow {
            pattern_name: "highRisk".into(),
            tp: 5,
            fp: 1,
            fn_: 2,
            last_updated: 1000,
        });
        let row = store.learning("highRisk").unwrap();
        assert_eq!(row.tp, 5);

        store.upsert_learning(LearningRow {
            pattern_name: "highRisk".into(),
            tp: 6,
            fp: 1,
            fn_: 2,
            last_updated: 2000,
        });
        assert_eq!(store.learning("highRisk").unwrap().tp, 6);
        assert_eq!(store.all_learning().len(), 1);
    }

    #[test]
    fn open_or_in_memory_none_path_is_memory_only() {
        let store = open_or_in_memory(None).unwrap();
        assert!(!store.is_durable());
    }
}
