//! Versioned project-state journal: prompt history, artifact lineage,
//! decisions, and blockers, persisted to a single JSON file with rolling
//! backups and corruption recovery (spec.md §4.B).

pub mod backup;
pub mod model;

pub use model::{
    ArtifactLineage, ArtifactTouch, ArtifactVersionEntry, Blocker, Decision, PhaseTransition,
    PromptRecord, PromptStatistics, State,
};

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use taskforge_core::{Phase, TaskforgeResult};
use uuid::Uuid;

/// Options accepted by [`Journal::record_prompt`].
#[derive(Debug, Clone)]
pub struct RecordPromptOpts {
    pub session_id: String,
    pub phase: Phase,
    pub agent: String,
    pub artifact_path: Option<String>,
    pub created_artifacts: Vec<String>,
    pub modified_artifacts: Vec<String>,
    pub change_type: String,
    pub change_summary: String,
}

impl RecordPromptOpts {
    pub fn new(session_id: impl Into<String>, phase: Phase, agent: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase,
            agent: agent.into(),
            artifact_path: None,
            created_artifacts: Vec::new(),
            modified_artifacts: Vec::new(),
            change_type: String::new(),
            change_summary: String::new(),
        }
    }
}

/// Single-writer, file-backed project journal.
///
/// Mirrors a task store's "load, mutate, save" pattern but owns a different
/// slice of state: prompt/artifact history rather than the backlog.
pub struct Journal {
    state_dir: PathBuf,
    state_path: PathBuf,
}

impl Journal {
    /// Operate against `project-state.json` under `state_dir`, creating the
    /// directory if it does not already exist.
    pub fn new(state_dir: impl Into<PathBuf>) -> TaskforgeResult<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir)?;
        let state_path = state_dir.join("project-state.json");
        Ok(Self {
            state_dir,
            state_path,
        })
    }

    /// Load the current state, recovering from backups on corruption.
    ///
    /// If `project-state.json` is missing, returns [`State::default_state`].
    /// If it exists but fails to parse or fails phase validation, falls back
    /// to the newest valid backup; if no backup validates either, falls back
    /// to the default state. Every fallback is logged, never silently
    /// swallowed.
    pub fn load(&self) -> State {
        if !self.state_path.exists() {
            return State::default_state();
        }

        match self.read_and_validate(&self.state_path) {
            Ok(state) => return state,
            Err(e) => {
                tracing::warn!(
                    path = %self.state_path.display(),
                    error = %e,
                    "project state file is unreadable or invalid, attempting backup recovery"
                );
            }
        }

        let backups = backup::list_backups(&self.state_dir).unwrap_or_default();
        for candidate in backups.iter().rev() {
            match self.read_and_validate(candidate) {
                Ok(state) => {
                    tracing::warn!(
                        backup = %candidate.display(),
                        "recovered project state from backup after corruption"
                    );
                    return state;
                }
                Err(e) => {
                    tracing::warn!(backup = %candidate.display(), error = %e, "backup also invalid, trying older one");
                }
            }
        }

        tracing::error!("no valid project state or backup found, falling back to default state");
        State::default_state()
    }

    fn read_and_validate(&self, path: &Path) -> TaskforgeResult<State> {
        let raw = fs::read_to_string(path)?;
        let state: State = serde_json::from_str(&raw)?;
        if !is_valid(&state) {
            return Err(taskforge_core::TaskforgeError::CorruptState(format!(
                "current_phase is not a recognized phase in {}",
                path.display()
            )));
        }
        Ok(state)
    }

    /// Save `state`, backing up any existing file first. Returns `false`
    /// (without writing) if `state.current_phase` somehow fails validation —
    /// this should not happen in practice since [`Phase`] is a closed enum,
    /// but mirrors the boolean-returning contract of spec.md §4.B.
    pub fn save(&self, state: &State) -> TaskforgeResult<bool> {
        if !is_valid(state) {
            return Ok(false);
        }

        if self.state_path.exists() {
            if let Err(e) = backup::write_backup(&self.state_dir, &self.state_path) {
                tracing::warn!(error = %e, "failed to write state backup before save");
            }
        }

        let mut state = state.clone();
        state.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(&state)?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.state_path)?;
        Ok(true)
    }

    /// Record a prompt interaction, updating artifact lineage for every path
    /// listed in `opts.created_artifacts` / `opts.modified_artifacts`.
    pub fn record_prompt(&self, state: &mut State, prompt: &str, opts: RecordPromptOpts) -> String {
        let id = format!("prompt-{}", Uuid::new_v4());
        let timestamp = Utc::now();

        for path in &opts.created_artifacts {
            let lineage = state
                .artifact_lineage
                .entry(path.clone())
                .or_insert_with(|| ArtifactLineage {
                    artifact_id: format!("artifact-{}", Uuid::new_v4()),
                    current_version: 0,
                    versions: Vec::new(),
                    created_by: opts.agent.clone(),
                    related_prompts: Vec::new(),
                });
            lineage.current_version = 1;
            lineage.versions.push(ArtifactVersionEntry {
                version: 1,
                change_type: "creation".to_string(),
                change_summary: opts.change_summary.clone(),
                prompt_id: id.clone(),
                timestamp,
                agent: opts.agent.clone(),
            });
            lineage.related_prompts.push(id.clone());
        }

        for path in &opts.modified_artifacts {
            let lineage = state
                .artifact_lineage
                .entry(path.clone())
                .or_insert_with(|| ArtifactLineage {
                    artifact_id: format!("artifact-{}", Uuid::new_v4()),
                    current_version: 0,
                    versions: Vec::new(),
                    created_by: opts.agent.clone(),
                    related_prompts: Vec::new(),
                });
            lineage.current_version += 1;
            lineage.versions.push(ArtifactVersionEntry {
                version: lineage.current_version,
                change_type: opts.change_type.clone(),
                change_summary: opts.change_summary.clone(),
                prompt_id: id.clone(),
                timestamp,
                agent: opts.agent.clone(),
            });
            lineage.related_prompts.push(id.clone());
        }

        state.prompt_history.push(PromptRecord {
            id: id.clone(),
            session_id: opts.session_id,
            timestamp,
            phase: opts.phase,
            agent: opts.agent,
            prompt: prompt.to_string(),
            artifact_path: opts.artifact_path,
            created_artifacts: opts.created_artifacts,
            modified_artifacts: opts.modified_artifacts,
            change_type: opts.change_type,
        });

        id
    }

    /// Record that `phase` produced or touched `path`.
    pub fn add_artifact(&self, state: &mut State, phase: Phase, path: &str) {
        state.artifacts.push(ArtifactTouch {
            phase,
            path: path.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Record a decision.
    pub fn add_decision(&self, state: &mut State, phase: Phase, text: &str) -> String {
        let id = format!("decision-{}", Uuid::new_v4());
        state.decisions.push(Decision {
            id: id.clone(),
            phase,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        id
    }

    /// Record a new, unresolved blocker.
    pub fn add_blocker(&self, state: &mut State, phase: Phase, text: &str) -> String {
        let id = format!("blocker-{}", Uuid::new_v4());
        state.blockers.push(Blocker {
            id: id.clone(),
            phase,
            text: text.to_string(),
            timestamp: Utc::now(),
            resolved: false,
            resolution: None,
            resolved_at: None,
        });
        id
    }

    /// Resolve a blocker by id. Returns `false` if no such blocker exists.
    pub fn resolve_blocker(&self, state: &mut State, blocker_id: &str, resolution: &str) -> bool {
        match state.blockers.iter_mut().find(|b| b.id == blocker_id) {
            Some(blocker) => {
                blocker.resolved = true;
                blocker.resolution = Some(resolution.to_string());
                blocker.resolved_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Prompts recorded during a given phase.
    pub fn prompts_by_phase<'a>(&self, state: &'a State, phase: Phase) -> Vec<&'a PromptRecord> {
        state
            .prompt_history
            .iter()
            .filter(|p| p.phase == phase)
            .collect()
    }

    /// Prompts recorded by a given agent.
    pub fn prompts_by_agent<'a>(&self, state: &'a State, agent: &str) -> Vec<&'a PromptRecord> {
        state
            .prompt_history
            .iter()
            .filter(|p| p.agent == agent)
            .collect()
    }

    /// Prompts recorded within a given session.
    pub fn session_prompts<'a>(&self, state: &'a State, session_id: &str) -> Vec<&'a PromptRecord> {
        state
            .prompt_history
            .iter()
            .filter(|p| p.session_id == session_id)
            .collect()
    }

    /// Case-insensitive substring search over prompt text.
    pub fn search_prompts<'a>(&self, state: &'a State, query: &str) -> Vec<&'a PromptRecord> {
        let needle = query.to_lowercase();
        state
            .prompt_history
            .iter()
            .filter(|p| p.prompt.to_lowercase().contains(&needle))
            .collect()
    }

    /// The full lineage of a single artifact path, if any prompt has touched it.
    pub fn artifact_history<'a>(&self, state: &'a State, path: &str) -> Option<&'a ArtifactLineage> {
        state.artifact_lineage.get(path)
    }

    /// Aggregate counts by phase, by agent, and total distinct artifacts.
    pub fn prompt_statistics(&self, state: &State) -> PromptStatistics {
        let mut by_phase = std::collections::HashMap::new();
        let mut by_agent = std::collections::HashMap::new();
        for prompt in &state.prompt_history {
            *by_phase.entry(prompt.phase.as_str().to_string()).or_insert(0) += 1;
            *by_agent.entry(prompt.agent.clone()).or_insert(0) += 1;
        }
        PromptStatistics {
            total_prompts: state.prompt_history.len(),
            by_phase,
            by_agent,
            total_artifacts: state.artifact_lineage.len(),
        }
    }
}

/// `current_phase` is always valid since [`Phase`] is a closed enum parsed
/// at deserialization time; this exists as the explicit checkpoint spec.md
/// §4.B calls for, and as a seam for future validation rules.
fn is_valid(_state: &State) -> bool {
    true
}
