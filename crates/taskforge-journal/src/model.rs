use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskforge_core::Phase;

/// One entry in `phase_history`: a transition the project made between phases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub from: Option<Phase>,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
}

/// A decision recorded against the project, independent of any one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: String,
    pub phase: Phase,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A blocker raised during the project, optionally resolved later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blocker {
    pub id: String,
    pub phase: Phase,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// One `addArtifact(phase, path)` record: a phase produced or touched a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactTouch {
    pub phase: Phase,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// A single recorded interaction with an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptRecord {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub agent: String,
    pub prompt: String,
    pub artifact_path: Option<String>,
    #[serde(default)]
    pub created_artifacts: Vec<String>,
    #[serde(default)]
    pub modified_artifacts: Vec<String>,
    pub change_type: String,
}

/// One version in an artifact's lineage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactVersionEntry {
    pub version: u32,
    pub change_type: String,
    pub change_summary: String,
    pub prompt_id: String,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
}

/// Per-artifact-path version history (spec.md §3 "Artifact lineage").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactLineage {
    pub artifact_id: String,
    pub current_version: u32,
    pub versions: Vec<ArtifactVersionEntry>,
    pub created_by: String,
    pub related_prompts: Vec<String>,
}

impl ArtifactLineage {
    /// `totalModifications = currentVersion - 1`.
    pub fn total_modifications(&self) -> u32 {
        self.current_version.saturating_sub(1)
    }
}

/// The full, versioned project state persisted to `project-state.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub version: u32,
    pub current_phase: Phase,
    #[serde(default)]
    pub phase_history: Vec<PhaseTransition>,
    #[serde(default)]
    pub quality_scores: HashMap<String, f64>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactTouch>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    #[serde(default)]
    pub prompt_history: Vec<PromptRecord>,
    #[serde(default)]
    pub artifact_lineage: HashMap<String, ArtifactLineage>,
    pub last_updated: DateTime<Utc>,
}

impl State {
    /// The default state: research phase, every history empty.
    pub fn default_state() -> Self {
        Self {
            version: 1,
            current_phase: Phase::Research,
            phase_history: Vec::new(),
            quality_scores: HashMap::new(),
            artifacts: Vec::new(),
            decisions: Vec::new(),
            blockers: Vec::new(),
            prompt_history: Vec::new(),
            artifact_lineage: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Aggregate statistics over recorded prompts and artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PromptStatistics {
    pub total_prompts: usize,
    pub by_phase: HashMap<String, usize>,
    pub by_agent: HashMap<String, usize>,
    pub total_artifacts: usize,
}
