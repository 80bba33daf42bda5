use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: usize = 1_000;
const DEFAULT_MAX_MEMORY_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_TTL_MS: u64 = 5 * 60 * 1_000;

/// Options accepted by [`ContextCache::set`].
#[derive(Debug, Clone)]
pub struct SetOptions {
    pub context_type: String,
    pub agent_id: String,
    pub priority: u32,
    pub ttl_ms: Option<u64>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            context_type: "generic".to_string(),
            agent_id: "unknown".to_string(),
            priority: 1,
            ttl_ms: None,
        }
    }
}

/// Filter accepted by [`ContextCache::invalidate`].
#[derive(Debug, Clone, Default)]
pub struct InvalidateFilter {
    pub context_type: Option<String>,
    pub agent_id: Option<String>,
}

struct Entry {
    value: Value,
    size_bytes: u64,
    context_type: String,
    agent_id: String,
    priority: u32,
    shareable: bool,
    access_count: u64,
    created_at: Instant,
    expires_at: Instant,
    last_access: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn eviction_score(&self) -> u64 {
        self.priority as u64 * 10 + self.access_count
    }
}

struct State {
    entries: HashMap<String, Entry>,
    memory_bytes: u64,
    hits: u64,
    misses: u64,
}

/// Cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_bytes: u64,
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub memory_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Context cache shared across pooled agents: bounded by entry count and
/// estimated memory footprint, TTL-expiring, with owner-scoped sharing and
/// priority-weighted eviction (spec.md §4.G, "Context cache").
pub struct ContextCache {
    config: CacheConfig,
    state: Mutex<State>,
}

impl ContextCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                entries: HashMap::new(),
                memory_bytes: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn set(&self, key: &str, value: Value, opts: SetOptions) {
        let size_bytes = value.to_string().len() as u64;
        let ttl = Duration::from_millis(opts.ttl_ms.unwrap_or(self.config.default_ttl_ms));
        let now = Instant::now();

        let entry = Entry {
            value,
            size_bytes,
            context_type: opts.context_type,
            agent_id: opts.agent_id,
            priority: opts.priority,
            shareable: false,
            access_count: 0,
            created_at: now,
            expires_at: now + ttl,
            last_access: now,
        };

        let mut state = self.state.lock();
        if let Some(old) = state.entries.remove(key) {
            state.memory_bytes = state.memory_bytes.saturating_sub(old.size_bytes);
        }
        state.memory_bytes += entry.size_bytes;
        state.entries.insert(key.to_string(), entry);
        self.evict_if_needed(&mut state);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let now = Instant::now();

        let expired = state.entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false);
        if expired {
            if let Some(entry) = state.entries.remove(key) {
                state.memory_bytes = state.memory_bytes.saturating_sub(entry.size_bytes);
            }
        }

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_access = now;
                state.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let state = self.state.lock();
        let now = Instant::now();
        state
            .entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(key) {
            state.memory_bytes = state.memory_bytes.saturating_sub(entry.size_bytes);
            true
        } else {
            false
        }
    }

    pub fn mark_shareable(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.shareable = true;
                true
            }
            None => false,
        }
    }

    /// Entries marked shareable whose owner differs from `requesting_agent_id`.
    pub fn get_shareable(&self, requesting_agent_id: &str) -> Vec<(String, Value)> {
        let state = self.state.lock();
        let now = Instant::now();
        state
            .entries
            .iter()
            .filter(|(_, e)| e.shareable && e.agent_id != requesting_agent_id && !e.is_expired(now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Remove entries matching the filter; returns the number removed.
    pub fn invalidate(&self, filter: InvalidateFilter) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| {
                filter
                    .context_type
                    .as_ref()
                    .map(|t| &e.context_type == t)
                    .unwrap_or(true)
                    && filter.agent_id.as_ref().map(|a| &e.agent_id == a).unwrap_or(true)
            })
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            if let Some(entry) = state.entries.remove(key) {
                state.memory_bytes = state.memory_bytes.saturating_sub(entry.size_bytes);
            }
        }
        keys.len()
    }

    /// Return the cached value for `key`, or call `fetch` to produce and
    /// store one. `fetch` is only invoked on a miss (spec.md §5,
    /// `getOrSetContext`).
    pub async fn get_or_set<F, Fut>(&self, key: &str, opts: SetOptions, fetch: F) -> Value
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Value>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = fetch().await;
        self.set(key, value.clone(), opts);
        value
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total > 0 {
            state.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            entries: state.entries.len(),
            memory_bytes: state.memory_bytes,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
        }
    }

    /// Evict lowest-scoring entries (ties broken by oldest last-access) until
    /// both the entry-count and memory-byte budgets are satisfied.
    fn evict_if_needed(&self, state: &mut State) {
        while state.entries.len() > self.config.max_entries
            || state.memory_bytes > self.config.max_memory_bytes
        {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.eviction_score(), e.last_access))
                .map(|(k, _)| k.clone());

            match victim {
                Some(key) => {
                    if let Some(entry) = state.entries.remove(&key) {
                        state.memory_bytes = state.memory_bytes.saturating_sub(entry.size_bytes);
                    }
                }
                None => break,
            }
        }
    }
}

/// Wall-clock timestamp an entry was created, for callers that need an
/// externally-comparable time rather than a monotonic [`Instant`].
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    fn opts(agent: &str) -> SetOptions {
        SetOptions {
            agent_id: agent.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = ContextCache::new(CacheConfig::default());
        cache.set("k1", json!({"a": 1}), opts("agent-a"));
        assert_eq!(cache.get("k1"), Some(json!({"a": 1})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn missing_key_counts_as_a_miss() {
        let cache = ContextCache::new(CacheConfig::default());
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entry_is_treated_as_absent() {
        let cache = ContextCache::new(CacheConfig::default());
        cache.set(
            "k1",
            json!(1),
            SetOptions {
                ttl_ms: Some(1),
                ..opts("agent-a")
            },
        );
        sleep(Duration::from_millis(20));
        assert!(!cache.has("k1"));
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn shareable_entries_are_visible_to_other_agents_only() {
        let cache = ContextCache::new(CacheConfig::default());
        cache.set("k1", json!(1), opts("agent-a"));
        cache.mark_shareable("k1");

        let visible_to_b = cache.get_shareable("agent-b");
        assert_eq!(visible_to_b.len(), 1);

        let visible_to_a = cache.get_shareable("agent-a");
        assert!(visible_to_a.is_empty());
    }

    #[test]
    fn invalidate_removes_matching_entries_and_counts_them() {
        let cache = ContextCache::new(CacheConfig::default());
        cache.set("k1", json!(1), opts("agent-a"));
        cache.set("k2", json!(2), opts("agent-b"));
        let removed = cache.invalidate(InvalidateFilter {
            agent_id: Some("agent-a".to_string()),
            ..Default::default()
        });
        assert_eq!(removed, 1);
        assert!(!cache.has("k1"));
        assert!(cache.has("k2"));
    }

    #[test]
    fn eviction_prefers_lowest_priority_and_access_count() {
        let cache = ContextCache::new(CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        cache.set(
            "low",
            json!(1),
            SetOptions {
                priority: 0,
                ..opts("agent-a")
            },
        );
        cache.set(
            "high",
            json!(1),
            SetOptions {
                priority: 5,
                ..opts("agent-a")
            },
        );
        cache.set(
            "newest",
            json!(1),
            SetOptions {
                priority: 5,
                ..opts("agent-a")
            },
        );
        assert!(!cache.has("low"));
        assert!(cache.has("high"));
        assert!(cache.has("newest"));
    }

    #[tokio::test]
    async fn get_or_set_only_calls_fetch_on_miss() {
        let cache = ContextCache::new(CacheConfig::default());
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let value = cache
            .get_or_set("k1", opts("agent-a"), || async move {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                json!("computed")
            })
            .await;
        assert_eq!(value, json!("computed"));

        let calls_clone = calls.clone();
        let value = cache
            .get_or_set("k1", opts("agent-a"), || async move {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                json!("computed-again")
            })
            .await;
        assert_eq!(value, json!("computed"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn hit_rate_reflects_hits_over_total_lookups() {
        let cache = ContextCache::new(CacheConfig::default());
        cache.set("k1", json!(1), opts("agent-a"));
        cache.get("k1");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 50.0);
    }
}
