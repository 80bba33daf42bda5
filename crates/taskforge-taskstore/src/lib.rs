//! Versioned task backlog: dependency tracking, priority scoring, optimistic
//! concurrency with three-way merge, and an optional shadow-mode dual-backend
//! consistency monitor (spec.md §4.D).

pub mod merge;
pub mod model;
pub mod scoring;
pub mod shadow;

pub use model::{
    Backlog, BacklogSummary, ConcurrencyHeader, Depends, DependencyGraph, Priority, ProjectMeta,
    Status, Task, Tier, TierContents, TasksFile,
};
pub use shadow::{HealthReport, HealthStatus, ShadowTracker};

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use taskforge_core::{Event, EventBus, Phase, SessionId, TaskforgeError, TaskforgeResult};
use taskforge_memory::MemoryStore;

/// Maximum traversal depth for dependency-graph closures (spec.md §4.D).
const DEFAULT_GRAPH_DEPTH: u32 = 10;

/// Fields accepted by [`TaskStore::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub phase: Phase,
    pub priority: Priority,
    pub effort: Option<String>,
    pub tags: std::collections::BTreeSet<String>,
    pub requires: std::collections::BTreeSet<String>,
    pub related: std::collections::BTreeSet<String>,
    pub acceptance_criteria: Vec<String>,
    /// Backlog tier the new task is filed into. Defaults to `next` if unset
    /// by the caller (new work usually isn't urgent enough for `now` yet).
    pub tier: Tier,
}

impl NewTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, phase: Phase, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            phase,
            priority,
            effort: None,
            tags: Default::default(),
            requires: Default::default(),
            related: Default::default(),
            acceptance_criteria: Vec::new(),
            tier: Tier::Next,
        }
    }
}

/// A partial update applied by [`TaskStore::update_task`]. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub phase: Option<Phase>,
    pub priority: Option<Priority>,
    pub effort: Option<Option<String>>,
    pub tags: Option<std::collections::BTreeSet<String>>,
    pub acceptance_criteria: Option<Vec<String>>,
}

/// Options for [`TaskStore::ready_tasks`].
#[derive(Debug, Clone, Default)]
pub struct ReadyOpts {
    /// `None` scans every tier; `Some(tier)` restricts to one.
    pub tier: Option<Tier>,
    /// Requested phase, used only for scoring's phase-match bonus.
    pub phase: Option<Phase>,
}

/// Options for [`TaskStore::get_next_task`].
#[derive(Debug, Clone)]
pub struct GetNextOpts {
    pub fallback_to_next: bool,
}

impl Default for GetNextOpts {
    fn default() -> Self {
        Self {
            fallback_to_next: true,
        }
    }
}

struct SuccessRates {
    memory: Option<Arc<MemoryStore>>,
}

impl scoring::SuccessRateSource for SuccessRates {
    fn success_rate(&self, phase: Phase) -> Option<f64> {
        let memory = self.memory.as_ref()?;
        let value = memory.get(&format!("success_rate:{}", phase.as_str()))?;
        value.as_f64()
    }
}

/// The versioned task backlog. One instance per supervisor process; multiple
/// processes may point at the same `tasks.json` and reconcile via
/// [`TaskStore::save`]'s three-way merge.
pub struct TaskStore {
    path: PathBuf,
    session_id: SessionId,
    events: EventBus,
    memory: Option<Arc<MemoryStore>>,
    shadow: Option<ShadowTracker>,
    file: RwLock<TasksFile>,
}

impl TaskStore {
    /// Load `tasks.json` at `path`, creating a default file in memory (not
    /// yet persisted) if none exists. A legacy file with no `_concurrency`
    /// header is upgraded to `version = 1` on this first read.
    pub fn open(
        path: impl Into<PathBuf>,
        project_name: &str,
        session_id: SessionId,
        events: EventBus,
        memory: Option<Arc<MemoryStore>>,
    ) -> TaskforgeResult<Self> {
        let path = path.into();
        let file = if path.exists() {
            read_tasks_file(&path, session_id.as_str())?
        } else {
            TasksFile::new(project_name, session_id.as_str())
        };

        Ok(Self {
            path,
            session_id,
            events,
            memory,
            shadow: None,
            file: RwLock::new(file),
        })
    }

    /// Turn on shadow mode: every future `save` also mirrors into a secondary
    /// sqlite-backed store and compares content hashes.
    pub fn enable_shadow(&mut self, shadow_path: impl AsRef<Path>) -> TaskforgeResult<()> {
        let tracker = ShadowTracker::open(shadow_path.as_ref())
            .map_err(|e| TaskforgeError::BackendUnavailable(e.to_string()))?;
        self.shadow = Some(tracker);
        self.events.emit(Event::ShadowEnabled);
        self.events.emit(Event::ShadowInitialized);
        Ok(())
    }

    /// Shadow mode's health report, if enabled.
    pub fn shadow_health(&self) -> Option<HealthReport> {
        self.shadow.as_ref().map(ShadowTracker::health)
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.file.read().tasks.get(id).cloned()
    }

    /// Create and file a new task, reconciling `requires`/`blocks` inverses.
    pub fn create_task(&self, fields: NewTask) -> Task {
        let now = Utc::now();
        let task = Task {
            id: fields.id.clone(),
            title: fields.title,
            description: fields.description,
            phase: fields.phase,
            priority: fields.priority,
            effort: fields.effort,
            status: Status::Ready,
            tags: fields.tags,
            created: now,
            updated: now,
            depends: model::Depends {
                blocks: Default::default(),
                requires: fields.requires,
                related: fields.related,
            },
            acceptance_criteria: fields.acceptance_criteria,
        };

        let mut file = self.file.write();
        file.tasks.insert(task.id.clone(), task.clone());
        reconcile_depends(&mut file.tasks);
        recompute_all_statuses(&mut file.tasks);
        file.backlog.tier_mut(fields.tier).tasks.push(task.id.clone());
        drop(file);

        self.events.emit(Event::TaskCreated {
            task_id: task.id.clone(),
        });
        self.get_task(&task.id).unwrap_or(task)
    }

    /// Apply a partial update. Fails with [`TaskforgeError::NotFound`] if the
    /// task does not exist.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> TaskforgeResult<Task> {
        let mut file = self.file.write();
        let task = file
            .tasks
            .get_mut(id)
            .ok_or_else(|| TaskforgeError::NotFound(id.to_string()))?;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(phase) = patch.phase {
            task.phase = phase;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(effort) = patch.effort {
            task.effort = effort;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if let Some(criteria) = patch.acceptance_criteria {
            task.acceptance_criteria = criteria;
        }
        task.updated = Utc::now();
        drop(file);

        self.events.emit(Event::TaskUpdated {
            task_id: id.to_string(),
        });
        Ok(self.get_task(id).expect("task existed moments ago"))
    }

    /// Transition a task's status, auto-unblocking dependents on completion.
    pub fn update_status(&self, id: &str, status: Status) -> TaskforgeResult<()> {
        {
            let mut file = self.file.write();
            let task = file
                .tasks
                .get_mut(id)
                .ok_or_else(|| TaskforgeError::NotFound(id.to_string()))?;
            task.status = status;
            task.updated = Utc::now();

            if status == Status::Completed {
                file.backlog.remove(id);
                file.backlog.completed.tasks.push(id.to_string());
            }
        }

        if status == Status::Completed {
            self.events.emit(Event::TaskCompleted {
                task_id: id.to_string(),
            });
            self.auto_unblock(id);
        } else {
            self.events.emit(Event::TaskUpdated {
                task_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Re-evaluate every task listing `completed_id` in `requires`, emitting
    /// `task:updated` for each that flips to `ready`.
    fn auto_unblock(&self, completed_id: &str) {
        let mut flipped = Vec::new();
        {
            let mut file = self.file.write();
            let snapshot = file.tasks.clone();
            for (id, task) in file.tasks.iter_mut() {
                if task.status == Status::Blocked && task.depends.requires.contains(completed_id) {
                    let was_blocked = task.status == Status::Blocked;
                    task.recompute_status(&snapshot);
                    if was_blocked && task.status == Status::Ready {
                        flipped.push(id.clone());
                    }
                }
            }
        }
        for id in flipped {
            self.events.emit(Event::TaskUpdated { task_id: id });
        }
    }

    /// Remove a task entirely. Fails with [`TaskforgeError::NotFound`] if it
    /// does not exist.
    pub fn delete_task(&self, id: &str) -> TaskforgeResult<()> {
        {
            let mut file = self.file.write();
            if file.tasks.remove(id).is_none() {
                return Err(TaskforgeError::NotFound(id.to_string()));
            }
            file.backlog.remove(id);
            for task in file.tasks.values_mut() {
                task.depends.requires.remove(id);
                task.depends.blocks.remove(id);
                task.depends.related.remove(id);
            }
        }
        self.events.emit(Event::TaskDeleted {
            task_id: id.to_string(),
        });
        Ok(())
    }

    /// Ready tasks across the requested scope, ranked by `_score` descending.
    pub fn ready_tasks(&self, opts: ReadyOpts) -> Vec<Task> {
        let file = self.file.read();
        let success_rates = SuccessRates {
            memory: self.memory.clone(),
        };

        let ids_in_scope: Vec<String> = match opts.tier {
            Some(tier) => file.backlog.tier(tier).tasks.clone(),
            None => Tier::ALL
                .iter()
                .filter(|t| **t != Tier::Completed)
                .flat_map(|t| file.backlog.tier(*t).tasks.clone())
                .collect(),
        };

        let mut ready: Vec<&Task> = ids_in_scope
            .iter()
            .filter_map(|id| file.tasks.get(id))
            .filter(|t| t.status == Status::Ready)
            .collect();

        scoring::sort_by_score(&mut ready, opts.phase, &file.tasks, &success_rates);
        ready.into_iter().cloned().collect()
    }

    /// Select the next task to work, per spec.md §4.D's `getNextTask` algorithm.
    pub fn get_next_task(&self, phase: Phase, opts: GetNextOpts) -> Option<Task> {
        let success_rates = SuccessRates {
            memory: self.memory.clone(),
        };

        let now_ready: Vec<Task> = {
            let file = self.file.read();
            let mut ready: Vec<&Task> = file
                .backlog
                .now
                .tasks
                .iter()
                .filter_map(|id| file.tasks.get(id))
                .filter(|t| t.status == Status::Ready)
                .collect();
            scoring::sort_by_score(&mut ready, Some(phase), &file.tasks, &success_rates);
            ready.into_iter().cloned().collect()
        };

        if let Some(matching) = now_ready.iter().find(|t| t.phase == phase) {
            return Some(matching.clone());
        }

        if let Some(any_phase) = now_ready.first() {
            self.events.emit(Event::TaskPhaseMismatch {
                task_id: any_phase.id.clone(),
                requested_phase: phase.as_str().to_string(),
            });
            return Some(any_phase.clone());
        }

        if !opts.fallback_to_next {
            return None;
        }

        let best_in_next: Option<Task> = {
            let file = self.file.read();
            let mut ready: Vec<&Task> = file
                .backlog
                .next
                .tasks
                .iter()
                .filter_map(|id| file.tasks.get(id))
                .filter(|t| t.status == Status::Ready)
                .collect();
            scoring::sort_by_score(&mut ready, Some(phase), &file.tasks, &success_rates);
            ready.first().map(|t| (*t).clone())
        };

        let promoted = best_in_next?;
        {
            let mut file = self.file.write();
            file.backlog.next.tasks.retain(|id| id != &promoted.id);
            file.backlog.now.tasks.push(promoted.id.clone());
        }
        self.events.emit(Event::TaskPromoted {
            task_id: promoted.id.clone(),
            from: "next".to_string(),
            to: "now".to_string(),
        });
        Some(promoted)
    }

    /// Direct and transitive dependency relationships for `id`.
    pub fn dependency_graph(&self, id: &str) -> DependencyGraph {
        let file = self.file.read();
        let mut graph = DependencyGraph::default();

        if let Some(task) = file.tasks.get(id) {
            graph.blocked_by = task.depends.requires.clone();
        }
        graph.blocking = file
            .tasks
            .values()
            .filter(|t| t.depends.requires.contains(id))
            .map(|t| t.id.clone())
            .collect();

        graph.ancestors = transitive_closure(id, &file.tasks, DEFAULT_GRAPH_DEPTH, |t| {
            t.depends.requires.iter().cloned().collect()
        });
        graph.descendants = transitive_closure(id, &file.tasks, DEFAULT_GRAPH_DEPTH, |t| {
            file.tasks
                .values()
                .filter(|other| other.depends.requires.contains(&t.id))
                .map(|other| other.id.clone())
                .collect()
        });

        graph
    }

    /// Task counts per tier.
    pub fn backlog_summary(&self) -> BacklogSummary {
        let file = self.file.read();
        BacklogSummary {
            now: file.backlog.now.tasks.len(),
            next: file.backlog.next.tasks.len(),
            later: file.backlog.later.tasks.len(),
            someday: file.backlog.someday.tasks.len(),
            completed: file.backlog.completed.tasks.len(),
            total: file.tasks.len(),
        }
    }

    /// Reload from disk, discarding any unsaved in-memory mutations.
    pub fn reload(&self) -> TaskforgeResult<()> {
        let start = Instant::now();
        let fresh = read_tasks_file(&self.path, self.session_id.as_str())?;
        *self.file.write() = fresh;
        if let Some(shadow) = &self.shadow {
            shadow.record_load(start.elapsed().as_millis() as u64);
        }
        Ok(())
    }

    /// Persist the in-memory file. If the on-disk version has advanced past
    /// what was last loaded, performs a three-way merge, emits
    /// `tasks:version-conflict`, and retries the write once.
    pub fn save(&self) -> TaskforgeResult<bool> {
        let start = Instant::now();
        let mut merged_already = false;

        if self.path.exists() {
            let disk = read_tasks_file(&self.path, self.session_id.as_str())?;
            let memory_version = self.file.read().concurrency.version;
            if disk.concurrency.version > memory_version {
                let memory = self.file.read().clone();
                let (merged, summary) = merge::merge(disk, memory, self.session_id.as_str());
                if let Some(shadow) = &self.shadow {
                    shadow.record_conflict();
                    shadow.record_merge();
                }
                self.events.emit(Event::TasksVersionConflict {
                    disk_version: merged.concurrency.version.saturating_sub(1),
                    memory_version,
                    summary: format!(
                        "added {} from disk, merged {} shared tasks",
                        summary.added_from_disk.len(),
                        summary.merged.len()
                    ),
                });
                *self.file.write() = merged;
                merged_already = true;
            }
        }

        let mut file = self.file.write();
        if !merged_already {
            file.concurrency.version += 1;
        }
        file.concurrency.last_modified_by = self.session_id.as_str().to_string();
        file.concurrency.last_modified_at = Utc::now();
        let snapshot = file.clone();
        drop(file);

        write_atomic(&self.path, &snapshot)?;

        if let Some(shadow) = &self.shadow {
            let json_hash = shadow::content_hash(&snapshot).unwrap_or_default();
            shadow.record_save(
                snapshot.concurrency.version,
                &snapshot,
                &json_hash,
                start.elapsed().as_millis() as u64,
            );
            if shadow.divergences().is_empty() {
                self.events.emit(Event::ShadowSynced);
            } else if let Some(latest) = shadow.divergences().last() {
                self.events.emit(Event::MetricDivergence {
                    divergence_id: latest.id.clone(),
                    severity: latest.severity.clone(),
                });
            }
        }

        Ok(true)
    }
}

fn reconcile_depends(tasks: &mut BTreeMap<String, Task>) {
    let requires_edges: Vec<(String, String)> = tasks
        .values()
        .flat_map(|t| t.depends.requires.iter().map(move |r| (t.id.clone(), r.clone())))
        .collect();
    for (dependent, required) in requires_edges {
        if let Some(required_task) = tasks.get_mut(&required) {
            required_task.depends.blocks.insert(dependent);
        }
    }
}

fn recompute_all_statuses(tasks: &mut BTreeMap<String, Task>) {
    let snapshot = tasks.clone();
    for task in tasks.values_mut() {
        task.recompute_status(&snapshot);
    }
}

fn transitive_closure(
    start: &str,
    tasks: &BTreeMap<String, Task>,
    max_depth: u32,
    neighbors: impl Fn(&Task) -> Vec<String>,
) -> std::collections::BTreeSet<String> {
    let mut visited = std::collections::BTreeSet::new();
    let mut frontier = vec![start.to_string()];
    let mut depth = 0;

    while depth < max_depth && !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for id in frontier {
            let Some(task) = tasks.get(&id) else { continue };
            for neighbor in neighbors(task) {
                if visited.insert(neighbor.clone()) {
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
        depth += 1;
    }
    visited
}

fn read_tasks_file(path: &Path, session_id: &str) -> TaskforgeResult<TasksFile> {
    let raw = std::fs::read_to_string(path)?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)?;

    // Legacy upgrade: a file with no `_concurrency` header gets version 1.
    if value.get("_concurrency").is_none() {
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "_concurrency".to_string(),
                serde_json::json!({
                    "version": 1,
                    "last_modified_by": session_id,
                    "last_modified_at": Utc::now(),
                }),
            );
        }
    }

    let file: TasksFile = serde_json::from_value(value)?;
    Ok(file)
}

fn write_atomic(path: &Path, file: &TasksFile) -> TaskforgeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(file)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> TaskStore {
        TaskStore::open(
            dir.join("tasks.json"),
            "test-project",
            SessionId::generate(),
            EventBus::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn create_task_reconciles_requires_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.create_task(NewTask::new("task-1", "First", Phase::Implementation, Priority::Critical));
        let mut second = NewTask::new("task-2", "Second", Phase::Implementation, Priority::High);
        second.requires.insert("task-1".to_string());
        store.create_task(second);

        let graph = store.dependency_graph("task-1");
        assert!(graph.blocking.contains("task-2"));
        assert_eq!(store.get_task("task-1").unwrap().status, Status::Ready);
        assert_eq!(store.get_task("task-2").unwrap().status, Status::Blocked);
    }

    #[test]
    fn scenario_auto_unblock_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut t1 = NewTask::new("task-1", "First", Phase::Implementation, Priority::Critical);
        t1.tier = Tier::Now;
        store.create_task(t1);

        let mut t2 = NewTask::new("task-2", "Second", Phase::Implementation, Priority::High);
        t2.requires.insert("task-1".to_string());
        t2.tier = Tier::Now;
        store.create_task(t2);

        let ready = store.ready_tasks(ReadyOpts {
            tier: None,
            phase: None,
        });
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "task-1");

        store.update_status("task-1", Status::Completed).unwrap();
        assert_eq!(store.get_task("task-2").unwrap().status, Status::Ready);
    }

    #[test]
    fn get_next_task_promotes_from_next_when_now_is_dry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut t = NewTask::new("task-a", "A task", Phase::Implementation, Priority::Medium);
        t.tier = Tier::Next;
        store.create_task(t);

        let picked = store
            .get_next_task(Phase::Implementation, GetNextOpts::default())
            .unwrap();
        assert_eq!(picked.id, "task-a");
        assert_eq!(store.backlog_summary().now, 1);
        assert_eq!(store.backlog_summary().next, 0);
    }

    #[test]
    fn get_next_task_phase_mismatch_falls_back_to_any_phase() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut t = NewTask::new("task-a", "A task", Phase::Testing, Priority::Medium);
        t.tier = Tier::Now;
        store.create_task(t);

        let picked = store
            .get_next_task(Phase::Implementation, GetNextOpts::default())
            .unwrap();
        assert_eq!(picked.id, "task-a");
    }

    #[test]
    fn save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create_task(NewTask::new("task-1", "First", Phase::Research, Priority::Low));
        store.save().unwrap();

        store.reload().unwrap();
        assert!(store.get_task("task-1").is_some());
    }

    #[test]
    fn concurrent_sessions_merge_without_losing_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let store_a = TaskStore::open(&path, "proj", SessionId::generate(), EventBus::new(), None).unwrap();
        store_a.create_task(NewTask::new("task-a", "A", Phase::Research, Priority::Medium));
        store_a.save().unwrap();

        let store_b = TaskStore::open(&path, "proj", SessionId::generate(), EventBus::new(), None).unwrap();
        store_b.create_task(NewTask::new("task-b", "B", Phase::Research, Priority::Medium));

        // store_a writes again, bumping the disk version past what store_b loaded.
        store_a.update_task(
            "task-a",
            TaskPatch {
                title: Some("A renamed".to_string()),
                ..Default::default()
            },
        ).unwrap();
        store_a.save().unwrap();

        store_b.save().unwrap();

        let final_file = read_tasks_file(&path, "verifier").unwrap();
        assert!(final_file.tasks.contains_key("task-a"));
        assert!(final_file.tasks.contains_key("task-b"));
        assert!(final_file.concurrency.version >= 3);
    }

    #[test]
    fn delete_task_removes_from_backlog_and_other_deps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create_task(NewTask::new("task-1", "First", Phase::Research, Priority::Medium));
        let mut t2 = NewTask::new("task-2", "Second", Phase::Research, Priority::Medium);
        t2.requires.insert("task-1".to_string());
        store.create_task(t2);

        store.delete_task("task-1").unwrap();
        assert!(store.get_task("task-1").is_none());
        assert!(!store.get_task("task-2").unwrap().depends.requires.contains("task-1"));
        assert!(matches!(store.delete_task("ghost"), Err(TaskforgeError::NotFound(_))));
    }
}
