use crate::model::{Tier, TierContents, Task, TasksFile};
use std::collections::BTreeSet;

/// What happened during a three-way merge, attached to the
/// `tasks:version-conflict` event (spec.md §4.D).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MergeSummary {
    pub added_from_disk: Vec<String>,
    pub merged: Vec<String>,
    pub resulting_version: u64,
}

/// Resolve a concurrent edit between the on-disk file and this session's
/// in-memory copy. Never drops a task id present on either side.
pub fn merge(disk: TasksFile, memory: TasksFile, session_id: &str) -> (TasksFile, MergeSummary) {
    let mut summary = MergeSummary::default();
    let mut tasks = memory.tasks.clone();

    for (id, disk_task) in &disk.tasks {
        match tasks.get(id).cloned() {
            None => {
                tasks.insert(id.clone(), disk_task.clone());
                summary.added_from_disk.push(id.clone());
            }
            Some(memory_task) => {
                let merged = merge_task(&memory_task, disk_task);
                tasks.insert(id.clone(), merged);
                summary.merged.push(id.clone());
            }
        }
    }

    let backlog = merge_backlog(&memory.backlog, &disk.backlog);

    let resulting_version = disk.concurrency.version.max(memory.concurrency.version) + 1;
    summary.resulting_version = resulting_version;

    let merged_file = TasksFile {
        version: memory.version,
        project: memory.project,
        backlog,
        tasks,
        concurrency: crate::model::ConcurrencyHeader {
            version: resulting_version,
            last_modified_by: session_id.to_string(),
            last_modified_at: chrono::Utc::now(),
        },
    };

    (merged_file, summary)
}

fn merge_task(memory_task: &Task, disk_task: &Task) -> Task {
    let mut winner = if disk_task.updated > memory_task.updated {
        disk_task.clone()
    } else {
        memory_task.clone()
    };

    winner.depends.blocks = memory_task
        .depends
        .blocks
        .union(&disk_task.depends.blocks)
        .cloned()
        .collect();
    winner.depends.requires = memory_task
        .depends
        .requires
        .union(&disk_task.depends.requires)
        .cloned()
        .collect();
    winner.depends.related = memory_task
        .depends
        .related
        .union(&disk_task.depends.related)
        .cloned()
        .collect();

    winner.status = if memory_task.status.merge_rank() >= disk_task.status.merge_rank() {
        memory_task.status
    } else {
        disk_task.status
    };

    winner
}

fn merge_backlog(memory: &crate::model::Backlog, disk: &crate::model::Backlog) -> crate::model::Backlog {
    let mut merged = crate::model::Backlog::default();
    let mut placed: BTreeSet<String> = BTreeSet::new();

    for tier in Tier::ALL {
        let memory_tier = memory.tier(tier);
        let disk_tier = disk.tier(tier);

        let mut ids = Vec::new();
        for id in &memory_tier.tasks {
            if placed.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
        for id in &disk_tier.tasks {
            if placed.insert(id.clone()) {
                ids.push(id.clone());
            }
        }

        let description = if !memory_tier.description.is_empty() {
            memory_tier.description.clone()
        } else {
            disk_tier.description.clone()
        };

        *merged.tier_mut(tier) = TierContents {
            tasks: ids,
            description,
        };
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConcurrencyHeader, Depends, Priority, ProjectMeta, Status};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;
    use taskforge_core::Phase;

    fn base_task(id: &str, updated_offset_secs: i64) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            phase: Phase::Implementation,
            priority: Priority::Medium,
            effort: None,
            status: Status::Ready,
            tags: Default::default(),
            created: now,
            updated: now + Duration::seconds(updated_offset_secs),
            depends: Depends::default(),
            acceptance_criteria: Vec::new(),
        }
    }

    fn empty_file(version: u64) -> TasksFile {
        TasksFile {
            version: "1.0".to_string(),
            project: ProjectMeta::default(),
            backlog: crate::model::Backlog::default(),
            tasks: BTreeMap::new(),
            concurrency: ConcurrencyHeader {
                version,
                last_modified_by: "s0".to_string(),
                last_modified_at: Utc::now(),
            },
        }
    }

    #[test]
    fn disk_only_tasks_are_added_without_dropping_memory_tasks() {
        let mut memory = empty_file(2);
        memory.tasks.insert("mem-task".to_string(), base_task("mem-task", 0));

        let mut disk = empty_file(3);
        disk.tasks.insert("disk-task".to_string(), base_task("disk-task", 0));

        let (merged, summary) = merge(disk, memory, "session-x");
        assert!(merged.tasks.contains_key("mem-task"));
        assert!(merged.tasks.contains_key("disk-task"));
        assert_eq!(summary.added_from_disk, vec!["disk-task".to_string()]);
        assert_eq!(merged.concurrency.version, 4);
        assert_eq!(merged.concurrency.last_modified_by, "session-x");
    }

    #[test]
    fn shared_task_takes_later_updated_but_unions_depends() {
        let mut memory_task = base_task("shared", 0);
        memory_task.depends.requires.insert("a".to_string());
        memory_task.title = "memory version".to_string();

        let mut disk_task = base_task("shared", 100); // later updated
        disk_task.depends.requires.insert("b".to_string());
        disk_task.title = "disk version".to_string();

        let mut memory = empty_file(5);
        memory.tasks.insert("shared".to_string(), memory_task);
        let mut disk = empty_file(5);
        disk.tasks.insert("shared".to_string(), disk_task);

        let (merged, _) = merge(disk, memory, "s1");
        let result = &merged.tasks["shared"];
        assert_eq!(result.title, "disk version");
        assert!(result.depends.requires.contains("a"));
        assert!(result.depends.requires.contains("b"));
    }

    #[test]
    fn status_merge_prefers_completed_over_in_progress() {
        let mut memory_task = base_task("t", 0);
        memory_task.status = Status::InProgress;
        let mut disk_task = base_task("t", 0);
        disk_task.status = Status::Completed;

        let mut memory = empty_file(1);
        memory.tasks.insert("t".to_string(), memory_task);
        let mut disk = empty_file(1);
        disk.tasks.insert("t".to_string(), disk_task);

        let (merged, _) = merge(disk, memory, "s1");
        assert_eq!(merged.tasks["t"].status, Status::Completed);
    }
}
