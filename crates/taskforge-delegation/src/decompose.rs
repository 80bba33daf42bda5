use crate::model::{AgentType, Pattern, Subtask};

const DEFAULT_AGENTS: u32 = 3;
const MIN_SUBTASKS: usize = 2;
const MAX_SUBTASKS: usize = 8;

/// Classify a subtask's agent type from its title + description, following
/// the fixed keyword precedence table in spec.md §4.F (first match wins).
pub fn classify_agent_type(title: &str, description: &str) -> AgentType {
    let lower = format!("{title} {description}").to_lowercase();

    if ["research", "investigate", "analyze", "explore"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return AgentType::Explore;
    }
    if ["api", "endpoint", "server", "backend"].iter().any(|k| lower.contains(k)) {
        return AgentType::BackendSpecialist;
    }
    let mentions_backend = lower.contains("backend");
    if !mentions_backend
        && ["ui", "frontend", "form", "component"].iter().any(|k| lower.contains(k))
    {
        return AgentType::FrontendSpecialist;
    }
    if ["test", "validate", "verify"].iter().any(|k| lower.contains(k)) {
        return AgentType::E2eTestEngineer;
    }
    if ["design", "plan", "architecture"].iter().any(|k| lower.contains(k)) {
        return AgentType::Plan;
    }
    AgentType::GeneralPurpose
}

/// Split a task description into `count` rough parts, preferring natural
/// conjunction boundaries (`,`, ` and `) and padding/merging to fit exactly.
fn split_into_parts(task: &str, count: usize) -> Vec<String> {
    let raw: Vec<String> = task
        .split([',', ';'])
        .flat_map(|segment| segment.split(" and "))
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();

    let mut parts = if raw.len() >= count {
        let mut merged: Vec<String> = raw[..count - 1].to_vec();
        merged.push(raw[count - 1..].join(", "));
        merged
    } else {
        raw
    };

    while parts.len() < count {
        let index = parts.len() + 1;
        parts.push(format!("Part {index} of: {task}"));
    }
    parts
}

fn subtask_count(pattern: Pattern, requested_agents: Option<u32>) -> usize {
    match pattern {
        Pattern::Debate => 3,
        Pattern::Review => 2,
        Pattern::Parallel | Pattern::Sequential => {
            let requested = requested_agents.unwrap_or(DEFAULT_AGENTS) as usize;
            requested.clamp(MIN_SUBTASKS, MAX_SUBTASKS)
        }
    }
}

/// Decompose `task` into 2..=min(agents,8) subtasks under `pattern`, applying
/// the pattern-specific prefix and coordination flags (spec.md §4.F).
pub fn decompose(task: &str, pattern: Pattern, requested_agents: Option<u32>) -> Vec<Subtask> {
    let n = subtask_count(pattern, requested_agents);

    match pattern {
        Pattern::Debate => {
            let titles = ["Supporting case", "Opposing case", "Synthesis"];
            let prefixes = ["[PRO]", "[CON]", "[SYNTH]"];
            titles
                .iter()
                .zip(prefixes.iter())
                .enumerate()
                .map(|(i, (title, prefix))| build_subtask(i, title, task, prefix, false, false))
                .collect()
        }
        Pattern::Review => {
            let titles = ["Implementation", "Review"];
            let prefixes = ["[IMPL]", "[REVIEW]"];
            titles
                .iter()
                .zip(prefixes.iter())
                .enumerate()
                .map(|(i, (title, prefix))| build_subtask(i, title, task, prefix, false, i > 0))
                .collect()
        }
        Pattern::Parallel => {
            let parts = split_into_parts(task, n);
            parts
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    let prefix = format!("[PARALLEL {}/{}]", i + 1, n);
                    build_subtask(i, part, part, &prefix, true, false)
                })
                .collect()
        }
        Pattern::Sequential => {
            let parts = split_into_parts(task, n);
            parts
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    let prefix = format!("[SEQ {}/{}]", i + 1, n);
                    build_subtask(i, part, part, &prefix, false, i > 0)
                })
                .collect()
        }
    }
}

fn build_subtask(
    index: usize,
    title: &str,
    description: &str,
    prefix: &str,
    run_in_background: bool,
    wait_for_previous: bool,
) -> Subtask {
    let title = title.to_string();
    let description = format!("{prefix} {description}");
    let agent_type = classify_agent_type(&title, &description).as_str().to_string();
    Subtask {
        id: format!("subtask-{index}"),
        title,
        description,
        agent_type,
        run_in_background,
        wait_for_previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_precedence_order() {
        assert_eq!(classify_agent_type("Research options", ""), AgentType::Explore);
        assert_eq!(classify_agent_type("Build the API endpoint", ""), AgentType::BackendSpecialist);
        assert_eq!(classify_agent_type("Build the UI form", ""), AgentType::FrontendSpecialist);
        assert_eq!(classify_agent_type("Write and test the logic", ""), AgentType::E2eTestEngineer);
        assert_eq!(classify_agent_type("Design the architecture", ""), AgentType::Plan);
        assert_eq!(classify_agent_type("Tidy up the changelog", ""), AgentType::GeneralPurpose);
    }

    #[test]
    fn backend_mention_suppresses_frontend_match() {
        // Contains "form" (frontend keyword) and "backend" (backend keyword):
        // backend wins per table order, and the frontend branch explicitly
        // excludes backend-mentioning text.
        assert_eq!(
            classify_agent_type("Wire the backend form validation", ""),
            AgentType::BackendSpecialist
        );
    }

    #[test]
    fn debate_always_produces_three_fixed_subtasks() {
        let subtasks = decompose("pick a database", Pattern::Debate, Some(8));
        assert_eq!(subtasks.len(), 3);
        assert!(subtasks[0].description.starts_with("[PRO]"));
        assert!(subtasks[1].description.starts_with("[CON]"));
        assert!(subtasks[2].description.starts_with("[SYNTH]"));
    }

    #[test]
    fn review_always_produces_two_fixed_subtasks() {
        let subtasks = decompose("ship the feature", Pattern::Review, None);
        assert_eq!(subtasks.len(), 2);
        assert!(!subtasks[1].run_in_background);
        assert!(subtasks[1].wait_for_previous);
    }

    #[test]
    fn parallel_subtasks_run_in_background_with_no_waiting() {
        let subtasks = decompose("add endpoint, add form, add tests", Pattern::Parallel, Some(3));
        assert_eq!(subtasks.len(), 3);
        assert!(subtasks.iter().all(|s| s.run_in_background));
        assert!(subtasks.iter().all(|s| !s.wait_for_previous));
    }

    #[test]
    fn sequential_subtasks_wait_for_previous_after_first() {
        let subtasks = decompose("design schema, implement migration, backfill data", Pattern::Sequential, Some(3));
        assert_eq!(subtasks.len(), 3);
        assert!(!subtasks[0].wait_for_previous);
        assert!(subtasks[1].wait_for_previous);
        assert!(subtasks[2].wait_for_previous);
        assert!(subtasks.iter().all(|s| !s.run_in_background));
    }

    #[test]
    fn subtask_count_is_clamped_between_two_and_eight() {
        let subtasks = decompose("one task", Pattern::Parallel, Some(20));
        assert_eq!(subtasks.len(), 8);
        let subtasks = decompose("one task", Pattern::Parallel, Some(1));
        assert_eq!(subtasks.len(), 2);
    }
}
