use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use taskforge_core::{TaskforgeError, TaskforgeResult};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Produces fresh agent handles for the pool to manage.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    type Agent: Send + 'static;

    async fn create(&self) -> TaskforgeResult<Self::Agent>;
}

/// Pool configuration (spec.md §4.G, "Agent pool").
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub checkout_timeout_ms: u64,
    pub recycle_after_uses: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 8,
            checkout_timeout_ms: 30_000,
            recycle_after_uses: 50,
        }
    }
}

struct Entry<A> {
    id: Uuid,
    agent: A,
    use_count: u32,
}

struct State<A> {
    idle: VecDeque<Entry<A>>,
    total: usize,
    shutdown: bool,
    checkouts: u64,
    created: u64,
    recycled: u64,
    disposed: u64,
    in_use: usize,
}

/// Pool statistics (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub checkouts: u64,
    pub created: u64,
    pub recycled: u64,
    pub disposed: u64,
    pub hit_rate: f64,
    pub utilization: f64,
}

/// A checked-out agent, returned to the pool via [`AgentPool::checkin`].
pub struct Checkout<A> {
    pub id: Uuid,
    pub agent: A,
    use_count: u32,
}

/// Outcome reported on [`AgentPool::checkin`].
#[derive(Debug, Clone, Copy)]
pub struct CheckinOutcome {
    pub success: bool,
}

/// A pool of reusable agent handles, bounded between `min_size` and
/// `max_size`, with checkout waiting and use-based recycling (spec.md §4.G).
pub struct AgentPool<F: AgentFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<State<F::Agent>>,
    notify: Notify,
}

impl<F: AgentFactory> AgentPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            state: Mutex::new(State {
                idle: VecDeque::new(),
                total: 0,
                shutdown: false,
                checkouts: 0,
                created: 0,
                recycled: 0,
                disposed: 0,
                in_use: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Pre-create `min_size` agents.
    pub async fn initialize(&self) -> TaskforgeResult<()> {
        for _ in 0..self.config.min_size {
            let agent = self.factory.create().await?;
            let mut state = self.state.lock().await;
            state.idle.push_back(Entry {
                id: Uuid::new_v4(),
                agent,
                use_count: 0,
            });
            state.total += 1;
            state.created += 1;
        }
        Ok(())
    }

    /// Check out an idle agent (FIFO), creating a new one if under
    /// `max_size`, or waiting up to `checkout_timeout_ms` otherwise.
    pub async fn checkout(&self) -> TaskforgeResult<Checkout<F::Agent>> {
        let deadline = Duration::from_millis(self.config.checkout_timeout_ms);
        let start = tokio::time::Instant::now();

        loop {
            {
                let mut state = self.state.lock().await;
                if state.shutdown {
                    return Err(TaskforgeError::PoolShutdown);
                }
                if let Some(entry) = state.idle.pop_front() {
                    state.checkouts += 1;
                    state.in_use += 1;
                    return Ok(Checkout {
                        id: entry.id,
                        agent: entry.agent,
                        use_count: entry.use_count,
                    });
                }
                if state.total < self.config.max_size {
                    state.total += 1;
                    state.created += 1;
                    state.checkouts += 1;
                    state.in_use += 1;
                    drop(state);
                    let agent = self.factory.create().await?;
                    return Ok(Checkout {
                        id: Uuid::new_v4(),
                        agent,
                        use_count: 0,
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(TaskforgeError::CheckoutTimeout(deadline));
            }
            let remaining = deadline - elapsed;
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    /// Return a checked-out agent. An agent at or above `recycle_after_uses`
    /// is disposed and replaced with a freshly created one, keeping the
    /// pool's total size stable.
    pub async fn checkin(&self, checkout: Checkout<F::Agent>, outcome: CheckinOutcome) {
        let _ = outcome;
        let mut state = self.state.lock().await;
        state.in_use = state.in_use.saturating_sub(1);

        let entry = Entry {
            id: checkout.id,
            agent: checkout.agent,
            use_count: checkout.use_count + 1,
        };

        let needs_replacement = entry.use_count >= self.config.recycle_after_uses;
        if needs_replacement {
            state.recycled += 1;
            state.disposed += 1;
            state.total = state.total.saturating_sub(1);
        } else {
            state.idle.push_back(entry);
        }
        let shutdown = state.shutdown;
        drop(state);
        self.notify.notify_one();

        if needs_replacement && !shutdown {
            if let Ok(agent) = self.factory.create().await {
                let mut state = self.state.lock().await;
                if !state.shutdown {
                    state.idle.push_back(Entry {
                        id: Uuid::new_v4(),
                        agent,
                        use_count: 0,
                    });
                    state.total += 1;
                    state.created += 1;
                }
                drop(state);
                self.notify.notify_one();
            }
        }
    }

    /// Dispose every agent and reject any further checkouts with `PoolShutdown`.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutdown = true;
        state.disposed += state.idle.len() as u64;
        state.idle.clear();
        state.total = 0;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let hit_rate = if state.checkouts > 0 {
            (state.checkouts.saturating_sub(state.created)) as f64 / state.checkouts as f64 * 100.0
        } else {
            0.0
        };
        let size = state.total;
        let utilization = if size > 0 {
            state.in_use as f64 / size as f64 * 100.0
        } else {
            0.0
        };

        PoolStats {
            size,
            idle: state.idle.len(),
            in_use: state.in_use,
            checkouts: state.checkouts,
            created: state.created,
            recycled: state.recycled,
            disposed: state.disposed,
            hit_rate,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingFactory {
        created: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentFactory for CountingFactory {
        type Agent = usize;

        async fn create(&self) -> TaskforgeResult<usize> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn factory() -> (CountingFactory, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        (
            CountingFactory {
                created: created.clone(),
            },
            created,
        )
    }

    #[tokio::test]
    async fn initialize_creates_min_size_agents() {
        let (f, _) = factory();
        let pool = AgentPool::new(
            f,
            PoolConfig {
                min_size: 2,
                ..Default::default()
            },
        );
        pool.initialize().await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.size, 2);
        assert_eq!(stats.idle, 2);
    }

    #[tokio::test]
    async fn checkout_reuses_idle_agent_before_creating() {
        let (f, created) = factory();
        let pool = AgentPool::new(f, PoolConfig::default());
        pool.initialize().await.unwrap();

        let checkout = pool.checkout().await.unwrap();
        pool.checkin(checkout, CheckinOutcome { success: true }).await;
        let _second = pool.checkout().await.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        let stats = pool.stats().await;
        assert_eq!(stats.checkouts, 2);
        assert_eq!(stats.created, 1);
    }

    #[tokio::test]
    async fn checkout_fails_with_timeout_when_saturated() {
        let (f, _) = factory();
        let pool = AgentPool::new(
            f,
            PoolConfig {
                min_size: 0,
                max_size: 1,
                checkout_timeout_ms: 50,
                recycle_after_uses: 50,
            },
        );
        let _held = pool.checkout().await.unwrap();
        let result = pool.checkout().await;
        assert!(matches!(result, Err(TaskforgeError::CheckoutTimeout(_))));
    }

    #[tokio::test]
    async fn shutdown_rejects_pending_checkouts() {
        let (f, _) = factory();
        let pool = AgentPool::new(f, PoolConfig::default());
        pool.shutdown().await;
        let result = pool.checkout().await;
        assert!(matches!(result, Err(TaskforgeError::PoolShutdown)));
    }

    #[tokio::test]
    async fn recycle_after_uses_disposes_instead_of_returning() {
        let (f, _) = factory();
        let pool = AgentPool::new(
            f,
            PoolConfig {
                min_size: 0,
                max_size: 4,
                checkout_timeout_ms: 1_000,
                recycle_after_uses: 1,
            },
        );
        let checkout = pool.checkout().await.unwrap();
        pool.checkin(checkout, CheckinOutcome { success: true }).await;
        let stats = pool.stats().await;
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.idle, 1, "the recycled agent should be replaced");
        assert_eq!(stats.size, 1, "pool size should not shrink after recycling");
    }
}
