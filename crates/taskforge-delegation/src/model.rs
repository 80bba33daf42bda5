use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Delegation coordination pattern (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Parallel,
    Sequential,
    Debate,
    Review,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown delegation pattern: {0}")]
pub struct UnknownPattern(pub String);

impl FromStr for Pattern {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(Pattern::Parallel),
            "sequential" => Ok(Pattern::Sequential),
            "debate" => Ok(Pattern::Debate),
            "review" => Ok(Pattern::Review),
            other => Err(UnknownPattern(other.to_string())),
        }
    }
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Parallel => "parallel",
            Pattern::Sequential => "sequential",
            Pattern::Debate => "debate",
            Pattern::Review => "review",
        }
    }
}

/// Parsed `--flag` options (spec.md §6's command-like argument surface).
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub pattern: Option<Pattern>,
    pub depth: Option<u32>,
    pub agents: Option<u32>,
    pub budget: Option<f64>,
    pub dry_run: bool,
    pub force: bool,
}

/// Result of `parseArguments`: options plus the remaining free-text task description.
#[derive(Debug, Clone)]
pub struct ParsedArguments {
    pub options: Options,
    pub task_description: String,
}

/// What the policy oracle, overlaid by `--force`/`--pattern`, concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationDecision {
    pub should_delegate: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub pattern: Pattern,
}

/// Agent type assigned to a decomposed subtask (spec.md §4.F keyword table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    Explore,
    BackendSpecialist,
    FrontendSpecialist,
    E2eTestEngineer,
    Plan,
    GeneralPurpose,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Explore => "Explore",
            AgentType::BackendSpecialist => "Backend Specialist",
            AgentType::FrontendSpecialist => "Frontend Specialist",
            AgentType::E2eTestEngineer => "E2E Test Engineer",
            AgentType::Plan => "Plan",
            AgentType::GeneralPurpose => "general-purpose",
        }
    }
}

/// One decomposed unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub agent_type: String,
    pub run_in_background: bool,
    pub wait_for_previous: bool,
}

/// A ready-to-dispatch `Task` tool invocation for one subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub tool: String,
    pub parameters: InvocationParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationParameters {
    pub description: String,
    pub prompt: String,
    pub subagent_type: String,
    pub run_in_background: bool,
}

/// Outcome of `executeDelegation` (spec.md §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DelegationResult {
    Error {
        success: bool,
        error: String,
    },
    NotRecommended {
        success: bool,
        warning: String,
        hint: String,
    },
    DryRun {
        success: bool,
        dry_run: bool,
        task: String,
        decision: DelegationDecision,
        subtasks: Vec<Subtask>,
        estimated_agents: usize,
    },
    Executed {
        success: bool,
        task: String,
        decision: DelegationDecision,
        pattern: Pattern,
        subtask_count: usize,
        task_invocations: Vec<Invocation>,
        registered: bool,
        delegation_id: String,
    },
}
