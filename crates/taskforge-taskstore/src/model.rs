use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use taskforge_core::Phase;

/// Task priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Base score contribution (spec.md §4.D scoring table).
    pub fn base_score(self) -> i64 {
        match self {
            Priority::Critical => 100,
            Priority::High => 70,
            Priority::Medium => 40,
            Priority::Low => 10,
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ready,
    InProgress,
    Blocked,
    Completed,
}

impl Status {
    /// Ranking used by the merge resolver's "prefers" rule: higher wins.
    pub fn merge_rank(self) -> u8 {
        match self {
            Status::Completed => 3,
            Status::InProgress => 2,
            Status::Ready => 1,
            Status::Blocked => 0,
        }
    }
}

/// The three dependency relations a task carries (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Depends {
    #[serde(default)]
    pub blocks: BTreeSet<String>,
    #[serde(default)]
    pub requires: BTreeSet<String>,
    #[serde(default)]
    pub related: BTreeSet<String>,
}

/// A single unit of work in the backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub phase: Phase,
    pub priority: Priority,
    /// Human-readable estimate such as `"2h"` or `"45m"`.
    #[serde(default)]
    pub effort: Option<String>,
    pub status: Status,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub depends: Depends,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

impl Task {
    /// A task is blocked iff any `requires` entry exists in `all` and is not completed.
    pub fn recompute_status(&mut self, all: &BTreeMap<String, Task>) {
        if matches!(self.status, Status::InProgress | Status::Completed) {
            return;
        }
        let blocked = self.depends.requires.iter().any(|req| {
            all.get(req)
                .map(|t| t.status != Status::Completed)
                .unwrap_or(false)
        });
        self.status = if blocked { Status::Blocked } else { Status::Ready };
    }
}

/// One of the four scheduling-horizon tiers, plus the completed archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Now,
    Next,
    Later,
    Someday,
    Completed,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Now,
        Tier::Next,
        Tier::Later,
        Tier::Someday,
        Tier::Completed,
    ];
}

/// An ordered sequence of task ids plus a free-text description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierContents {
    pub tasks: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// The five backlog tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backlog {
    pub now: TierContents,
    pub next: TierContents,
    pub later: TierContents,
    pub someday: TierContents,
    pub completed: TierContents,
}

impl Backlog {
    pub fn tier(&self, tier: Tier) -> &TierContents {
        match tier {
            Tier::Now => &self.now,
            Tier::Next => &self.next,
            Tier::Later => &self.later,
            Tier::Someday => &self.someday,
            Tier::Completed => &self.completed,
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierContents {
        match tier {
            Tier::Now => &mut self.now,
            Tier::Next => &mut self.next,
            Tier::Later => &mut self.later,
            Tier::Someday => &mut self.someday,
            Tier::Completed => &mut self.completed,
        }
    }

    /// The tier a task id currently belongs to, if any.
    pub fn tier_of(&self, task_id: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|&t| self.tier(t).tasks.iter().any(|id| id == task_id))
    }

    /// Remove `task_id` from whichever tier holds it.
    pub fn remove(&mut self, task_id: &str) {
        for tier in Tier::ALL {
            self.tier_mut(tier).tasks.retain(|id| id != task_id);
        }
    }
}

/// The optimistic-concurrency arbiter embedded in the task file (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyHeader {
    pub version: u64,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
}

impl ConcurrencyHeader {
    pub fn initial(session_id: &str) -> Self {
        Self {
            version: 1,
            last_modified_by: session_id.to_string(),
            last_modified_at: Utc::now(),
        }
    }
}

/// Project metadata embedded in the task file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMeta {
    pub name: String,
    #[serde(default)]
    pub phases: Vec<String>,
}

impl Default for ProjectMeta {
    fn default() -> Self {
        Self {
            name: "untitled".to_string(),
            phases: Phase::ALL.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

/// The full on-disk shape of `tasks.json` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasksFile {
    pub version: String,
    #[serde(default)]
    pub project: ProjectMeta,
    #[serde(default)]
    pub backlog: Backlog,
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    #[serde(rename = "_concurrency")]
    pub concurrency: ConcurrencyHeader,
}

impl TasksFile {
    pub fn new(project_name: impl Into<String>, session_id: &str) -> Self {
        Self {
            version: "1.0".to_string(),
            project: ProjectMeta {
                name: project_name.into(),
                ..ProjectMeta::default()
            },
            backlog: Backlog::default(),
            tasks: BTreeMap::new(),
            concurrency: ConcurrencyHeader::initial(session_id),
        }
    }
}

/// Result of [`crate::TaskStore::dependency_graph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DependencyGraph {
    pub ancestors: BTreeSet<String>,
    pub descendants: BTreeSet<String>,
    pub blocking: BTreeSet<String>,
    pub blocked_by: BTreeSet<String>,
}

/// Summary counts per tier, returned by `getBacklogSummary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BacklogSummary {
    pub now: usize,
    pub next: usize,
    pub later: usize,
    pub someday: usize,
    pub completed: usize,
    pub total: usize,
}
