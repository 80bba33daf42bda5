use crate::model::{Status, Task};
use std::collections::BTreeMap;
use taskforge_core::Phase;

/// Maximum depth walked into the `requires` ancestry when penalizing a task
/// for unresolved blockers (spec.md §4.D).
const BLOCKER_ANCESTRY_DEPTH: u32 = 3;

/// An 8-hour estimate is the "quick win" ceiling: anything faster earns a bonus.
const QUICK_WIN_CEILING_HOURS: f64 = 8.0;

/// Parse a human estimate like `"2h"` or `"45m"` into fractional hours.
pub fn parse_effort_hours(effort: &str) -> Option<f64> {
    let effort = effort.trim();
    if let Some(n) = effort.strip_suffix('h') {
        n.trim().parse::<f64>().ok()
    } else if let Some(n) = effort.strip_suffix('m') {
        n.trim().parse::<f64>().ok().map(|m| m / 60.0)
    } else {
        None
    }
}

/// Count unresolved (non-completed) tasks in `task`'s `requires` ancestry, up
/// to [`BLOCKER_ANCESTRY_DEPTH`] levels deep. A visited set guards cycles.
fn unresolved_blocker_count(task: &Task, all: &BTreeMap<String, Task>) -> u32 {
    let mut count = 0;
    let mut visited = std::collections::BTreeSet::new();
    let mut frontier: Vec<String> = task.depends.requires.iter().cloned().collect();
    let mut depth = 0;

    while depth < BLOCKER_ANCESTRY_DEPTH && !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for id in frontier {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(dep) = all.get(&id) {
                if dep.status != Status::Completed {
                    count += 1;
                }
                next_frontier.extend(dep.depends.requires.iter().cloned());
            }
        }
        frontier = next_frontier;
        depth += 1;
    }
    count
}

/// Historical success-rate lookup, injected so scoring stays decoupled from
/// any particular Memory Store instance.
pub trait SuccessRateSource {
    /// Returns the historical success rate (0.0..=1.0) for a phase, if known.
    fn success_rate(&self, phase: Phase) -> Option<f64>;
}

impl SuccessRateSource for () {
    fn success_rate(&self, _phase: Phase) -> Option<f64> {
        None
    }
}

/// Compute `_score` for a single ready task (spec.md §4.D), higher is better.
pub fn score(
    task: &Task,
    requested_phase: Option<Phase>,
    all: &BTreeMap<String, Task>,
    success_rates: &dyn SuccessRateSource,
) -> f64 {
    let mut total = task.priority.base_score() as f64;

    if let Some(phase) = requested_phase {
        if task.phase == phase {
            total += 20.0;
        }
    }

    if let Some(effort) = &task.effort {
        if let Some(hours) = parse_effort_hours(effort) {
            let saved = (QUICK_WIN_CEILING_HOURS - hours).max(0.0);
            total += saved * 10.0;
        }
    }

    if let Some(rate) = success_rates.success_rate(task.phase) {
        total += rate.clamp(0.0, 1.0) * 15.0;
    }

    let blockers = unresolved_blocker_count(task, all);
    total -= (blockers as f64) * 5.0;

    total
}

/// Sort a set of tasks descending by score, breaking ties by creation time
/// (older first) then lexicographic id.
pub fn sort_by_score<'a>(
    tasks: &mut Vec<&'a Task>,
    requested_phase: Option<Phase>,
    all: &BTreeMap<String, Task>,
    success_rates: &dyn SuccessRateSource,
) {
    tasks.sort_by(|a, b| {
        let score_a = score(a, requested_phase, all, success_rates);
        let score_b = score(b, requested_phase, all, success_rates);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.created.cmp(&b.created))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Depends, Priority};
    use chrono::Utc;

    fn task(id: &str, priority: Priority, phase: Phase, status: Status) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            phase,
            priority,
            effort: None,
            status,
            tags: Default::default(),
            created: Utc::now(),
            updated: Utc::now(),
            depends: Depends::default(),
            acceptance_criteria: Vec::new(),
        }
    }

    #[test]
    fn effort_parsing_handles_hours_and_minutes() {
        assert_eq!(parse_effort_hours("2h"), Some(2.0));
        assert_eq!(parse_effort_hours("45m"), Some(0.75));
        assert_eq!(parse_effort_hours("bogus"), None);
    }

    #[test]
    fn priority_dominates_base_score() {
        let all = BTreeMap::new();
        let critical = task("t-critical", Priority::Critical, Phase::Research, Status::Ready);
        let low = task("t-low", Priority::Low, Phase::Research, Status::Ready);
        assert!(score(&critical, None, &all, &()) > score(&low, None, &all, &()));
    }

    #[test]
    fn matching_phase_adds_bonus() {
        let all = BTreeMap::new();
        let t = task("t-1", Priority::Medium, Phase::Implementation, Status::Ready);
        let with_match = score(&t, Some(Phase::Implementation), &all, &());
        let without_match = score(&t, Some(Phase::Testing), &all, &());
        assert_eq!(with_match - without_match, 20.0);
    }

    #[test]
    fn quick_win_bonus_favors_short_estimates() {
        let all = BTreeMap::new();
        let mut quick = task("t-quick", Priority::Medium, Phase::Research, Status::Ready);
        quick.effort = Some("1h".to_string());
        let mut slow = task("t-slow", Priority::Medium, Phase::Research, Status::Ready);
        slow.effort = Some("8h".to_string());
        assert!(score(&quick, None, &all, &()) > score(&slow, None, &all, &()));
    }

    #[test]
    fn unresolved_blocker_ancestry_penalizes_score() {
        let mut all = BTreeMap::new();
        let blocker = task("t-blocker", Priority::Medium, Phase::Research, Status::Blocked);
        all.insert("t-blocker".to_string(), blocker);

        let mut dependent = task("t-dependent", Priority::Medium, Phase::Research, Status::Blocked);
        dependent.depends.requires.insert("t-blocker".to_string());

        let clean = task("t-clean", Priority::Medium, Phase::Research, Status::Ready);

        assert!(score(&clean, None, &all, &()) > score(&dependent, None, &all, &()));
    }

    #[test]
    fn sort_breaks_ties_by_creation_then_id() {
        let all = BTreeMap::new();
        let mut a = task("b-task", Priority::Medium, Phase::Research, Status::Ready);
        let mut b = task("a-task", Priority::Medium, Phase::Research, Status::Ready);
        a.created = Utc::now();
        b.created = a.created;
        let mut tasks = vec![&a, &b];
        sort_by_score(&mut tasks, None, &all, &());
        assert_eq!(tasks[0].id, "a-task");
    }
}
