use parking_lot::RwLock;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

const DEFAULT_RING_SIZE: usize = 100;
const DEFAULT_MAX_DIVERGENCES: usize = 100;
/// Default ceiling, in milliseconds, above which p99 save latency costs
/// health points.
const DEFAULT_LATENCY_CEILING_MS: u64 = 250;

/// A recorded mismatch between the JSON and sqlite content hashes after a
/// save (spec.md §4.D "Divergence").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub json_hash: String,
    pub sqlite_hash: String,
    pub version: u64,
    pub details: String,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Error-origin buckets tracked by shadow mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    Sqlite,
    Json,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowCounters {
    pub saves: u64,
    pub loads: u64,
    pub conflicts: u64,
    pub merges: u64,
    pub lock_acquired: u64,
    pub lock_failed: u64,
    pub validation_passed: u64,
    pub validation_failed: u64,
    pub errors_by_origin: HashMap<String, u64>,
}

/// Health status bands (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

/// A point-in-time health report over the shadow mode's own operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: i64,
    pub status: HealthStatus,
    pub ready_for_migration: bool,
}

/// Canonical SHA-256 content hash: serialize to JSON, reparse into a
/// `serde_json::Value` (whose default map type is key-sorted), and hash the
/// sorted-key bytes.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_string(value)?;
    let canonical: serde_json::Value = serde_json::from_str(&raw)?;
    let canonical_bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical_bytes);
    Ok(hex::encode(hasher.finalize()))
}

struct Inner {
    counters: ShadowCounters,
    save_latencies_ms: VecDeque<u64>,
    load_latencies_ms: VecDeque<u64>,
    divergences: VecDeque<Divergence>,
}

/// Tracks a secondary (relational) backend that mirrors every task-store
/// save/load, verifying content-hash equality and recording divergences.
pub struct ShadowTracker {
    conn: parking_lot::Mutex<Connection>,
    inner: RwLock<Inner>,
    max_divergences: usize,
    latency_ceiling_ms: u64,
}

impl ShadowTracker {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks_snapshot (
                version INTEGER PRIMARY KEY,
                json TEXT NOT NULL,
                hash TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: parking_lot::Mutex::new(conn),
            inner: RwLock::new(Inner {
                counters: ShadowCounters::default(),
                save_latencies_ms: VecDeque::with_capacity(DEFAULT_RING_SIZE),
                load_latencies_ms: VecDeque::with_capacity(DEFAULT_RING_SIZE),
                divergences: VecDeque::with_capacity(DEFAULT_MAX_DIVERGENCES),
            }),
            max_divergences: DEFAULT_MAX_DIVERGENCES,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
        })
    }

    /// Mirror a save into the secondary backend and compare content hashes.
    /// `json_hash` is the hash already computed by the primary store.
    pub fn record_save<T: Serialize>(
        &self,
        version: u64,
        value: &T,
        json_hash: &str,
        elapsed_ms: u64,
    ) {
        let sqlite_hash = match content_hash(value) {
            Ok(h) => h,
            Err(e) => {
                self.record_error(ErrorOrigin::Other, &e.to_string());
                return;
            }
        };

        let json_blob = serde_json::to_string(value).unwrap_or_default();
        {
            let conn = self.conn.lock();
            if let Err(e) = conn.execute(
                "INSERT INTO tasks_snapshot (version, json, hash) VALUES (?1, ?2, ?3)
                 ON CONFLICT(version) DO UPDATE SET json = excluded.json, hash = excluded.hash",
                params![version as i64, json_blob, sqlite_hash],
            ) {
                self.record_error(ErrorOrigin::Sqlite, &e.to_string());
            }
        }

        let mut inner = self.inner.write();
        inner.counters.saves += 1;
        push_ring(&mut inner.save_latencies_ms, elapsed_ms, DEFAULT_RING_SIZE);

        if sqlite_hash != json_hash {
            let divergence = Divergence {
                id: format!("divergence-{}", uuid::Uuid::new_v4()),
                kind: "content-hash-mismatch".to_string(),
                severity: "critical".to_string(),
                json_hash: json_hash.to_string(),
                sqlite_hash,
                version,
                details: "json and sqlite backends disagree after save".to_string(),
                resolved: false,
                resolution: None,
                resolved_at: None,
            };
            if inner.divergences.len() >= self.max_divergences {
                inner.divergences.pop_front();
            }
            inner.divergences.push_back(divergence);
        }
    }

    pub fn record_load(&self, elapsed_ms: u64) {
        let mut inner = self.inner.write();
        inner.counters.loads += 1;
        push_ring(&mut inner.load_latencies_ms, elapsed_ms, DEFAULT_RING_SIZE);
    }

    pub fn record_conflict(&self) {
        self.inner.write().counters.conflicts += 1;
    }

    pub fn record_merge(&self) {
        self.inner.write().counters.merges += 1;
    }

    pub fn record_lock_acquired(&self) {
        self.inner.write().counters.lock_acquired += 1;
    }

    pub fn record_lock_failed(&self) {
        self.inner.write().counters.lock_failed += 1;
    }

    pub fn record_validation(&self, passed: bool) {
        let mut inner = self.inner.write();
        if passed {
            inner.counters.validation_passed += 1;
        } else {
            inner.counters.validation_failed += 1;
        }
    }

    pub fn record_error(&self, origin: ErrorOrigin, detail: &str) {
        tracing::warn!(?origin, detail, "shadow mode backend error");
        let key = match origin {
            ErrorOrigin::Sqlite => "sqlite",
            ErrorOrigin::Json => "json",
            ErrorOrigin::Other => "other",
        };
        *self
            .inner
            .write()
            .counters
            .errors_by_origin
            .entry(key.to_string())
            .or_insert(0) += 1;
    }

    pub fn counters(&self) -> ShadowCounters {
        self.inner.read().counters.clone()
    }

    pub fn divergences(&self) -> Vec<Divergence> {
        self.inner.read().divergences.iter().cloned().collect()
    }

    fn p99_save_latency_ms(&self) -> Option<u64> {
        percentile(&self.inner.read().save_latencies_ms, 0.99)
    }

    /// Compute a health report per spec.md §4.D's scoring rules.
    pub fn health(&self) -> HealthReport {
        let inner = self.inner.read();
        let divergence_count = inner.divergences.len() as i64;
        let error_count: i64 = inner.counters.errors_by_origin.values().map(|&v| v as i64).sum();
        drop(inner);

        let mut score: i64 = 100;
        score -= (divergence_count * 5).min(50);
        score -= (error_count * 3).min(30);
        if let Some(p99) = self.p99_save_latency_ms() {
            if p99 > self.latency_ceiling_ms {
                score -= 20;
            }
        }
        score = score.max(0);

        let status = if score >= 90 {
            HealthStatus::Healthy
        } else if score >= 70 {
            HealthStatus::Warning
        } else if score >= 50 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        };

        let saves = self.inner.read().counters.saves;
        let ready_for_migration =
            saves >= 100 && divergence_count == 0 && status == HealthStatus::Healthy;

        HealthReport {
            score,
            status,
            ready_for_migration,
        }
    }
}

fn push_ring(ring: &mut VecDeque<u64>, value: u64, capacity: usize) {
    if ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(value);
}

fn percentile(ring: &VecDeque<u64>, p: f64) -> Option<u64> {
    if ring.is_empty() {
        return None;
    }
    let mut sorted: Vec<u64> = ring.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        b: i32,
        a: i32,
    }

    #[test]
    fn content_hash_is_stable_regardless_of_field_order() {
        #[derive(Serialize)]
        struct Reordered {
            a: i32,
            b: i32,
        }
        let h1 = content_hash(&Sample { b: 2, a: 1 }).unwrap();
        let h2 = content_hash(&Reordered { a: 1, b: 2 }).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn matching_hashes_create_no_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ShadowTracker::open(&dir.path().join("shadow.sqlite3")).unwrap();
        let value = Sample { a: 1, b: 2 };
        let hash = content_hash(&value).unwrap();
        tracker.record_save(1, &value, &hash, 5);
        assert!(tracker.divergences().is_empty());
        assert_eq!(tracker.counters().saves, 1);
    }

    #[test]
    fn mismatched_hash_creates_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ShadowTracker::open(&dir.path().join("shadow.sqlite3")).unwrap();
        let value = Sample { a: 1, b: 2 };
        tracker.record_save(1, &value, "deliberately-wrong-hash", 5);
        assert_eq!(tracker.divergences().len(), 1);
    }

    #[test]
    fn health_degrades_with_divergences() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ShadowTracker::open(&dir.path().join("shadow.sqlite3")).unwrap();
        for v in 0..5 {
            let value = Sample { a: v, b: v };
            tracker.record_save(v as u64, &value, "wrong", 1);
        }
        let report = tracker.health();
        assert!(report.score <= 75);
        assert!(!report.ready_for_migration);
    }

    #[test]
    fn ready_for_migration_requires_100_clean_saves() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ShadowTracker::open(&dir.path().join("shadow.sqlite3")).unwrap();
        for v in 0..100u64 {
            let value = Sample { a: v as i32, b: v as i32 };
            let hash = content_hash(&value).unwrap();
            tracker.record_save(v, &value, &hash, 1);
        }
        let report = tracker.health();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.ready_for_migration);
    }
}
