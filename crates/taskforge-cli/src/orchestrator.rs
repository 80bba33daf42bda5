//! The Orchestrator Loop (spec.md §4.H): picks the next task, validates it,
//! consults the guardrail, delegates and executes, then records the result
//! through the Journal and Task Store.

use crate::config::TaskforgeConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskforge_core::{Phase, SessionId, TaskforgeResult};
use taskforge_delegation::{DelegationEngine, DelegationResult, Pattern};
use taskforge_guardrail::{Context as GuardrailContext, GuardrailDetector};
use taskforge_hierarchy::{
    AgentFactory, CacheConfig, ExecutionMode, HierarchyRuntime, PoolConfig, Spawn,
};
use taskforge_journal::Journal;
use taskforge_memory::MemoryStore;
use taskforge_taskstore::{GetNextOpts, Status, TaskPatch, TaskStore};
use taskforge_validator::{Kind, Validator};
use tracing::{info, warn};

/// Every pooled slot is an opaque handle; the external agent binary itself
/// carries all state (spec.md §3, "Pooled agent").
pub struct ExternalAgentFactory;

#[async_trait]
impl AgentFactory for ExternalAgentFactory {
    type Agent = ();

    async fn create(&self) -> TaskforgeResult<()> {
        Ok(())
    }
}

/// Session metadata recorded on each completed iteration (spec.md §4.H).
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub delegated: bool,
    pub delegation_pattern: Option<String>,
    pub delegation_subtasks: usize,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Complete,
    Partial,
    Unknown,
}

/// The outcome of one loop iteration.
#[derive(Debug)]
pub enum IterationOutcome {
    Idle,
    ValidatorBlock { task_id: String },
    HumanReviewRequired { task_id: String },
    SubprocessTimeout { task_id: String },
    Finished { task_id: String, metadata: SessionMetadata },
}

/// Process exit codes for the CLI (spec.md §6): 0 success, 1 unrecoverable
/// store corruption, 2 validator block, 3 subprocess timeout with no
/// progress. Code 1 is surfaced as an `Err` propagating out of
/// `run_iteration` rather than through this outcome — see [`Orchestrator::run`].
pub fn exit_code(outcome: &IterationOutcome) -> i32 {
    match outcome {
        IterationOutcome::ValidatorBlock { .. } => 2,
        IterationOutcome::SubprocessTimeout { .. } => 3,
        _ => 0,
    }
}

pub struct Orchestrator {
    config: TaskforgeConfig,
    session_id: SessionId,
    current_phase: Phase,
    task_store: TaskStore,
    validator: Validator,
    guardrail: GuardrailDetector,
    delegation: DelegationEngine,
    hierarchy: HierarchyRuntime<ExternalAgentFactory>,
    journal: Journal,
    journal_state: taskforge_journal::model::State,
}

impl Orchestrator {
    pub async fn new(config: TaskforgeConfig) -> TaskforgeResult<Self> {
        std::fs::create_dir_all(&config.project.data_dir)?;

        let session_id = SessionId::generate();
        let events = taskforge_core::EventBus::new();

        let memory = Arc::new(MemoryStore::open(config.memory_path()));

        let mut task_store = TaskStore::open(
            config.tasks_path(),
            &config.project.name,
            session_id.clone(),
            events.clone(),
            Some(memory.clone()),
        )?;
        if config.shadow.enabled {
            task_store.enable_shadow(config.shadow_path())?;
        }

        let mut validator = Validator::with_events(events.clone());
        if !config.validator.enforce {
            validator.set_mode(taskforge_validator::Mode::Audit);
        }

        let mut guardrail = GuardrailDetector::with_memory(Some(memory.clone()));
        if !config.guardrail.adaptive_threshold {
            guardrail.disable_adaptive_threshold();
        }

        let journal = Journal::new(config.journal.state_dir.clone())?;
        let journal_state = journal.load();

        let pool_config = PoolConfig {
            min_size: config.pool.min_size,
            max_size: config.pool.max_size,
            checkout_timeout_ms: config.pool.checkout_timeout_ms,
            recycle_after_uses: config.pool.recycle_after_uses,
        };
        let cache_config = CacheConfig {
            max_entries: config.cache.max_entries,
            max_memory_bytes: config.cache.max_memory_bytes,
            default_ttl_ms: config.cache.default_ttl_ms,
        };
        let hierarchy = HierarchyRuntime::new(ExternalAgentFactory, pool_config, cache_config);
        hierarchy.initialize().await?;

        Ok(Self {
            current_phase: journal_state.current_phase,
            config,
            session_id,
            task_store,
            validator,
            guardrail,
            delegation: DelegationEngine::new(),
            hierarchy,
            journal,
            journal_state,
        })
    }

    /// Run one iteration of the loop (spec.md §4.H, steps 1-6).
    pub async fn run_iteration(&mut self) -> TaskforgeResult<IterationOutcome> {
        let Some(task) = self
            .task_store
            .get_next_task(self.current_phase, GetNextOpts::default())
        else {
            return Ok(IterationOutcome::Idle);
        };

        // Step 2: validate title, description, id (enforce mode).
        let title_result = self.validator.validate(&task.title, Kind::Description);
        let description_result = self.validator.validate(&task.description, Kind::Description);
        let id_result = self.validator.validate(&task.id, Kind::TaskId);

        if !title_result.valid || !description_result.valid || !id_result.valid {
            warn!(task_id = %task.id, "task rejected by validator");
            return Ok(IterationOutcome::ValidatorBlock { task_id: task.id });
        }

        // Step 3: guardrail check.
        let detection = self.guardrail.analyze(GuardrailContext {
            task: format!("{} {}", task.title, task.description),
            phase: task.phase.to_string(),
            kind: "task".to_string(),
        });

        if detection.requires_human && !self.config.guardrail.human_override {
            self.task_store.update_status(&task.id, Status::InProgress)?;
            let mut tags = task.tags.clone();
            tags.insert("human-review".to_string());
            self.task_store.update_task(
                &task.id,
                TaskPatch {
                    tags: Some(tags),
                    ..Default::default()
                },
            )?;
            let message = format!(
                "human-review: task {} (pattern {:?})",
                task.id, detection.pattern_name
            );
            let blocker_id =
                self.journal
                    .add_blocker(&mut self.journal_state, task.phase, &message);
            self.save_with_retry()?;
            info!(task_id = %task.id, blocker_id = %blocker_id, "task held for human review");
            return Ok(IterationOutcome::HumanReviewRequired { task_id: task.id });
        }

        // Step 4: delegation.
        let arg_string = format!("{} {}", task.title, task.description);
        let result = self.delegation.execute_delegation(&arg_string);

        let (pattern, invocations, delegation_id) = match result {
            DelegationResult::Executed {
                pattern,
                task_invocations,
                delegation_id,
                ..
            } => (pattern, task_invocations, delegation_id),
            DelegationResult::NotRecommended { .. } | DelegationResult::Error { .. } => {
                // Not delegated: the orchestrator still runs the task as a single
                // unit of work, recorded without a delegation id.
                self.record_single_task_completion(&task)?;
                let metadata = SessionMetadata {
                    delegated: false,
                    delegation_pattern: None,
                    delegation_subtasks: 0,
                    exit_reason: ExitReason::Complete,
                };
                return Ok(IterationOutcome::Finished {
                    task_id: task.id,
                    metadata,
                });
            }
            DelegationResult::DryRun { .. } => {
                unreachable!("execute_delegation never returns DryRun without --dry-run")
            }
        };

        let mode = match pattern {
            Pattern::Parallel => ExecutionMode::Parallel,
            Pattern::Sequential | Pattern::Debate | Pattern::Review => ExecutionMode::Sequential,
        };

        let specs: Vec<Spawn> = invocations
            .iter()
            .enumerate()
            .map(|(i, inv)| Spawn {
                program: self.config.pool.agent_program.clone(),
                args: vec![inv.parameters.prompt.clone()],
                subtask_index: i,
                subtask_total: invocations.len(),
                parent_task_id: task.id.clone(),
                parent_session_id: self.session_id.as_str().to_string(),
            })
            .collect();
        let subtask_count = specs.len();

        self.task_store.update_status(&task.id, Status::InProgress)?;

        let batch = self.hierarchy.execute_plan(specs, mode, 0, None).await;

        // Step 5: record prompts/artifacts, transition the task.
        for (i, invocation) in invocations.iter().enumerate() {
            self.journal.record_prompt(
                &mut self.journal_state,
                &invocation.parameters.prompt,
                taskforge_journal::RecordPromptOpts::new(
                    self.session_id.as_str(),
                    task.phase,
                    format!("subtask-{i}"),
                ),
            );
        }

        // No subtask even reached a terminal success/failure status: every
        // one of them hit the tiered deadline. Treat this as no progress
        // rather than an ordinary partial failure (spec.md §6, exit code 3).
        let no_progress = !batch.results.is_empty()
            && batch
                .results
                .iter()
                .all(|r| matches!(r, taskforge_hierarchy::Outcome::TimedOut));

        if no_progress {
            let message = format!(
                "subprocess timeout with no progress: task {} delegation {}",
                task.id, delegation_id
            );
            self.journal
                .add_blocker(&mut self.journal_state, task.phase, &message);
            self.save_with_retry()?;
            return Ok(IterationOutcome::SubprocessTimeout { task_id: task.id });
        }

        let exit_reason = if batch.all_succeeded {
            self.task_store.update_status(&task.id, Status::Completed)?;
            ExitReason::Complete
        } else {
            let message = format!(
                "partial failure: task {} delegation {}",
                task.id, delegation_id
            );
            self.journal
                .add_blocker(&mut self.journal_state, task.phase, &message);
            ExitReason::Partial
        };

        self.save_with_retry()?;

        let metadata = SessionMetadata {
            delegated: true,
            delegation_pattern: Some(pattern.as_str().to_string()),
            delegation_subtasks: subtask_count,
            exit_reason,
        };

        Ok(IterationOutcome::Finished { task_id: task.id, metadata })
    }

    fn record_single_task_completion(&mut self, task: &taskforge_taskstore::Task) -> TaskforgeResult<()> {
        self.task_store.update_status(&task.id, Status::Completed)?;
        self.save_with_retry()
    }

    /// Step 6: on save failure, retry once after reload-and-merge.
    fn save_with_retry(&mut self) -> TaskforgeResult<()> {
        if self.task_store.save()? {
            return Ok(());
        }
        self.task_store.reload()?;
        self.task_store.save()?;
        Ok(())
    }

    /// Drive the loop until `max_iterations` (if set) is reached, idling for
    /// `idle_interval_ms` whenever the task store has nothing ready. Per
    /// spec.md §7's propagation policy, only unrecoverable task store
    /// corruption is fatal at this level; it surfaces here as an `Err` from
    /// `run_iteration` (every other error kind is handled locally with a
    /// blocker and a normal `Ok(IterationOutcome)`).
    pub async fn run(&mut self) -> TaskforgeResult<i32> {
        let mut iterations: u64 = 0;
        loop {
            let outcome = match self.run_iteration().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "unrecoverable task store error, stopping the loop");
                    return Ok(1);
                }
            };
            let code = exit_code(&outcome);
            if code != 0 {
                return Ok(code);
            }
            if matches!(outcome, IterationOutcome::Idle) {
                tokio::time::sleep(Duration::from_millis(self.config.loop_config.idle_interval_ms)).await;
            }

            iterations += 1;
            if let Some(max) = self.config.loop_config.max_iterations {
                if iterations >= max {
                    return Ok(0);
                }
            }
        }
    }

    pub fn journal_state_path(&self) -> PathBuf {
        self.config.journal.state_dir.clone()
    }

    pub fn backlog_summary(&self) -> taskforge_taskstore::BacklogSummary {
        self.task_store.backlog_summary()
    }

    pub fn shadow_health(&self) -> Option<taskforge_taskstore::HealthReport> {
        self.task_store.shadow_health()
    }
}
