use crate::model::{DelegationDecision, Pattern};

const MIN_WORDS_FOR_DELEGATION: usize = 10;
const DELEGATE_CONFIDENCE_BASE: f64 = 0.50;
const SIGNAL_STEP: f64 = 0.10;
const CONFIDENCE_CAP: f64 = 0.95;

/// Conjunction markers that suggest a task is really several independent parts.
const MULTI_PART_MARKERS: &[&str] = &[" and ", ", ", " then "];
const SEQUENTIAL_MARKERS: &[&str] = &["then", "after", "first", "next", "followed by"];
const DEBATE_MARKERS: &[&str] = &["debate", "tradeoff", "compare", "pros and cons", "decide between"];
const REVIEW_MARKERS: &[&str] = &["review", "audit", "critique"];

/// Heuristic policy oracle: estimates whether a task description is worth
/// delegating to sub-agents and which coordination pattern fits best.
///
/// Longer, multi-part descriptions favor delegation; explicit debate/review
/// language picks those patterns; sequencing language ("then", "after")
/// favors sequential; everything else defaults to parallel.
pub fn should_delegate(task: &str) -> DelegationDecision {
    let lower = task.to_lowercase();
    let word_count = task.split_whitespace().count();

    let multi_part_signals = MULTI_PART_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    let long_enough = word_count >= MIN_WORDS_FOR_DELEGATION;

    let should_delegate = long_enough || multi_part_signals > 0;
    let signals = multi_part_signals + usize::from(long_enough);
    let confidence = (DELEGATE_CONFIDENCE_BASE + SIGNAL_STEP * signals as f64).min(CONFIDENCE_CAP);

    let pattern = if DEBATE_MARKERS.iter().any(|m| lower.contains(m)) {
        Pattern::Debate
    } else if REVIEW_MARKERS.iter().any(|m| lower.contains(m)) {
        Pattern::Review
    } else if SEQUENTIAL_MARKERS.iter().any(|m| lower.contains(m)) {
        Pattern::Sequential
    } else {
        Pattern::Parallel
    };

    let reasoning = if should_delegate {
        format!(
            "task has {word_count} words and {multi_part_signals} multi-part marker(s); recommending {} coordination",
            pattern.as_str()
        )
    } else {
        format!("task is short ({word_count} words) with no multi-part signal; handling inline is simpler")
    };

    DelegationDecision {
        should_delegate,
        confidence: if should_delegate { confidence } else { 1.0 - confidence },
        reasoning,
        pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_task_is_not_delegated() {
        let decision = should_delegate("fix typo");
        assert!(!decision.should_delegate);
    }

    #[test]
    fn long_multi_part_task_is_delegated_parallel_by_default() {
        let decision = should_delegate(
            "implement the new billing dashboard, add the export endpoint, and write tests for both",
        );
        assert!(decision.should_delegate);
        assert_eq!(decision.pattern, Pattern::Parallel);
    }

    #[test]
    fn sequential_language_picks_sequential_pattern() {
        let decision = should_delegate("first design the schema, then implement the migration, then backfill data");
        assert!(decision.should_delegate);
        assert_eq!(decision.pattern, Pattern::Sequential);
    }

    #[test]
    fn debate_language_picks_debate_pattern() {
        let decision = should_delegate("debate the tradeoffs between postgres and sqlite for this workload");
        assert_eq!(decision.pattern, Pattern::Debate);
    }

    #[test]
    fn review_language_picks_review_pattern() {
        let decision = should_delegate("review and audit the new authentication middleware for security issues");
        assert_eq!(decision.pattern, Pattern::Review);
    }
}
