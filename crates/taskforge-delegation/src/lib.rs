//! Delegation decisioning and decomposition into sub-agent task invocations
//! (spec.md §4.F). Pure and synchronous: this crate never spawns anything
//! itself, it only decides whether to delegate and produces the `Task` tool
//! invocations the Hierarchy Runtime will execute.
//!
//! # Main types
//!
//! - [`DelegationEngine`] — `parseArguments` / `getDelegationDecision` /
//!   `decompose` / `executeDelegation` / `formatExecutionPlan`.
//! - [`model::DelegationResult`] — the tagged result `executeDelegation` returns.

mod decompose;
mod model;
mod oracle;
mod parser;

pub use decompose::classify_agent_type;
pub use model::{
    AgentType, DelegationDecision, DelegationResult, Invocation, InvocationParameters, Options,
    ParsedArguments, Pattern, Subtask, UnknownPattern,
};
pub use parser::parse_arguments;

const MIN_TASK_DESCRIPTION_LEN: usize = 3;

/// The stateless delegation engine. Construction carries no state; every
/// method is a pure function of its arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelegationEngine;

impl DelegationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Consult the policy oracle and overlay `--force`/`--pattern` (spec.md §4.F).
    pub fn get_delegation_decision(&self, task: &str, options: &Options) -> DelegationDecision {
        let mut decision = oracle::should_delegate(task);

        if let Some(pattern) = options.pattern {
            decision.pattern = pattern;
        }

        if options.force && !decision.should_delegate {
            decision.should_delegate = true;
            decision.reasoning = format!("Forced: {}", decision.reasoning);
        }

        decision
    }

    /// Decompose `task` into subtasks under `pattern` (spec.md §4.F).
    pub fn decompose(&self, task: &str, pattern: Pattern, requested_agents: Option<u32>) -> Vec<Subtask> {
        decompose::decompose(task, pattern, requested_agents)
    }

    /// Build the `Task` tool invocation for one subtask.
    pub fn build_invocation(&self, subtask: &Subtask, pattern: Pattern, parent_title: &str) -> Invocation {
        let coordination_note = match pattern {
            Pattern::Parallel => "Work independently with no shared state.",
            Pattern::Sequential => "Assume previous steps may have produced artifacts.",
            Pattern::Debate => "Argue your assigned position independently before synthesis.",
            Pattern::Review => "Review the implementation produced by the previous step.",
        };

        let prompt = format!(
            "Subtask: {}\n{}\n\nParent task: {}\n\nCoordination note: {}",
            subtask.title, subtask.description, parent_title, coordination_note
        );

        Invocation {
            tool: "Task".to_string(),
            parameters: InvocationParameters {
                description: subtask.title.clone(),
                prompt,
                subagent_type: subtask.agent_type.clone(),
                run_in_background: subtask.run_in_background,
            },
        }
    }

    /// Run the full pipeline over a raw argument string (spec.md §4.F).
    pub fn execute_delegation(&self, arg_string: &str) -> DelegationResult {
        let parsed = parse_arguments(arg_string);
        let task = parsed.task_description.trim().to_string();

        if task.len() < MIN_TASK_DESCRIPTION_LEN {
            return DelegationResult::Error {
                success: false,
                error: "No task description".to_string(),
            };
        }

        let decision = self.get_delegation_decision(&task, &parsed.options);

        if !decision.should_delegate {
            return DelegationResult::NotRecommended {
                success: false,
                warning: "Delegation not recommended".to_string(),
                hint: "--force to override".to_string(),
            };
        }

        let subtasks = self.decompose(&task, decision.pattern, parsed.options.agents);

        if parsed.options.dry_run {
            return DelegationResult::DryRun {
                success: true,
                dry_run: true,
                task,
                decision,
                estimated_agents: subtasks.len(),
                subtasks,
            };
        }

        let invocations: Vec<Invocation> = subtasks
            .iter()
            .map(|s| self.build_invocation(s, decision.pattern, &task))
            .collect();

        DelegationResult::Executed {
            success: true,
            task: task.clone(),
            pattern: decision.pattern,
            subtask_count: subtasks.len(),
            task_invocations: invocations,
            registered: true,
            delegation_id: format!("delegation-{}", uuid::Uuid::new_v4()),
            decision,
        }
    }

    /// Render a human-readable summary of an `executeDelegation` result.
    pub fn format_execution_plan(&self, result: &DelegationResult) -> String {
        match result {
            DelegationResult::Error { error, .. } => format!("Error: {error}"),
            DelegationResult::NotRecommended { warning, hint, .. } => {
                format!("Warning: {warning} ({hint})")
            }
            DelegationResult::DryRun {
                task,
                decision,
                subtasks,
                estimated_agents,
                ..
            } => {
                let mut out = format!(
                    "Dry Run\nTask: {task}\nPattern: {} (confidence {:.2})\nEstimated agents: {estimated_agents}\n",
                    decision.pattern.as_str(),
                    decision.confidence
                );
                for subtask in subtasks {
                    out.push_str(&format!("  - [{}] {}\n", subtask.agent_type, subtask.title));
                }
                out
            }
            DelegationResult::Executed {
                task,
                decision,
                pattern,
                subtask_count,
                delegation_id,
                ..
            } => format!(
                "Execution Plan\nTask: {task}\nPattern: {} (confidence {:.2})\nSubtasks dispatched: {subtask_count}\nDelegation id: {delegation_id}\n",
                pattern.as_str(),
                decision.confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_description_is_an_error() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation("--dry-run");
        assert!(matches!(result, DelegationResult::Error { .. }));
    }

    #[test]
    fn short_task_without_force_is_not_recommended() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation("fix typo");
        assert!(matches!(result, DelegationResult::NotRecommended { .. }));
    }

    #[test]
    fn force_overrides_not_recommended() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation("--force fix typo");
        assert!(matches!(result, DelegationResult::Executed { .. } | DelegationResult::DryRun { .. }));
    }

    #[test]
    fn dry_run_returns_plan_without_invocations() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation(
            "--dry-run implement the billing dashboard, add the export endpoint, and write tests",
        );
        match result {
            DelegationResult::DryRun { subtasks, .. } => assert!(subtasks.len() >= 2),
            other => panic!("expected DryRun, got {other:?}"),
        }
    }

    #[test]
    fn explicit_pattern_overrides_oracle_pick() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation(
            "--pattern review implement the billing dashboard, add the export endpoint, and write tests",
        );
        match result {
            DelegationResult::Executed { pattern, .. } => assert_eq!(pattern, Pattern::Review),
            other => panic!("expected Executed, got {other:?}"),
        }
    }

    #[test]
    fn full_execution_registers_with_a_delegation_id() {
        let engine = DelegationEngine::new();
        let result = engine.execute_delegation(
            "implement the billing dashboard, add the export endpoint, and write tests for both",
        );
        match result {
            DelegationResult::Executed {
                registered,
                delegation_id,
                task_invocations,
                ..
            } => {
                assert!(registered);
                assert!(!delegation_id.is_empty());
                assert!(!task_invocations.is_empty());
                assert!(task_invocations.iter().all(|inv| inv.tool == "Task"));
            }
            other => panic!("expected Executed, got {other:?}"),
        }
    }

    #[test]
    fn format_execution_plan_covers_every_variant() {
        let engine = DelegationEngine::new();
        assert!(engine
            .format_execution_plan(&engine.execute_delegation("--dry-run"))
            .starts_with("Error"));
        assert!(engine
            .format_execution_plan(&engine.execute_delegation("fix typo"))
            .starts_with("Warning"));
    }
}
