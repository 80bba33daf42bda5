//! Hierarchy Runtime: tiered subprocess timeouts, the agent pool, the
//! context cache, and subprocess supervision (spec.md §4.G). This is the
//! only component built on `tokio` rather than synchronous I/O: every
//! suspension point in spec.md §5 (subprocess spawn/wait, pool checkout
//! under saturation, async context fetchers) is modeled as an `.await`.

pub mod cache;
pub mod pool;
pub mod subprocess;
pub mod timeout;

pub use cache::{CacheConfig, CacheStats, ContextCache, InvalidateFilter, SetOptions};
pub use pool::{AgentFactory, AgentPool, CheckinOutcome, Checkout, PoolConfig, PoolStats};
pub use subprocess::{BatchResult, ExecutionMode, Outcome, Spawn};
pub use timeout::{calculate_timeout, grace_period_ms, Timeout};

/// Binds the agent pool and context cache that a supervisor process keeps
/// for the lifetime of its run, plus the subprocess supervision that
/// executes one delegation plan (spec.md §4.G, §5 "per-supervisor
/// in-memory" resources).
pub struct HierarchyRuntime<F: AgentFactory> {
    pub pool: AgentPool<F>,
    pub cache: ContextCache,
}

impl<F: AgentFactory> HierarchyRuntime<F> {
    pub fn new(factory: F, pool_config: PoolConfig, cache_config: CacheConfig) -> Self {
        Self {
            pool: AgentPool::new(factory, pool_config),
            cache: ContextCache::new(cache_config),
        }
    }

    pub async fn initialize(&self) -> taskforge_core::TaskforgeResult<()> {
        self.pool.initialize().await
    }

    /// Execute one delegation plan's subprocesses under `mode`, at `depth`,
    /// with an optional remaining-budget inherited from the parent task.
    pub async fn execute_plan(
        &self,
        specs: Vec<Spawn>,
        mode: ExecutionMode,
        depth: u32,
        parent_remaining_ms: Option<u64>,
    ) -> BatchResult {
        subprocess::run_batch(specs, mode, depth, parent_remaining_ms).await
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopFactory;

    #[async_trait]
    impl AgentFactory for NoopFactory {
        type Agent = ();

        async fn create(&self) -> taskforge_core::TaskforgeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn runtime_executes_a_parallel_plan() {
        let runtime = HierarchyRuntime::new(NoopFactory, PoolConfig::default(), CacheConfig::default());
        runtime.initialize().await.unwrap();

        let specs = vec![Spawn {
            program: "echo".to_string(),
            args: vec!["hi".to_string()],
            subtask_index: 0,
            subtask_total: 1,
            parent_task_id: "task-1".to_string(),
            parent_session_id: "session-1".to_string(),
        }];

        let batch = runtime.execute_plan(specs, ExecutionMode::Parallel, 1, None).await;
        assert!(batch.all_succeeded);
    }
}
