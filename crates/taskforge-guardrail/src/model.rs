use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input to [`crate::GuardrailDetector::analyze`] (spec.md §4.E). `phase` is
/// a free-form label, not the Task Store's closed project-lifecycle
/// `Phase` — the guardrail can classify inputs (e.g. "deployment") that
/// never appear as a task's own phase.
#[derive(Debug, Clone)]
pub struct Context {
    pub task: String,
    pub phase: String,
    pub kind: String,
}

/// A single classification outcome, cached for later feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub task_excerpt: String,
    pub phase: String,
    pub kind: String,
    pub pattern_name: Option<String>,
    pub confidence: f64,
    pub requires_human: bool,
    pub timestamp: DateTime<Utc>,
}

/// Feedback input accepted by `recordFeedback` (spec.md §4.E).
#[derive(Debug, Clone)]
pub struct FeedbackInput {
    pub was_correct: bool,
    /// Whether a human reviewer was actually needed (`"yes"` or `"no"`).
    pub actual_need: String,
    pub comment: Option<String>,
}

impl FeedbackInput {
    pub fn actual_need_is_yes(&self) -> bool {
        self.actual_need.eq_ignore_ascii_case("yes")
    }
}

/// Aggregate accuracy counters for statistics reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub true_positives: i64,
    pub false_positives: i64,
    pub false_negatives: i64,
    pub true_negatives: i64,
    pub total_detections: i64,
    pub learned_pattern_count: usize,
}

impl Stats {
    pub fn precision(&self) -> Option<f64> {
        let denom = self.true_positives + self.false_positives;
        (denom > 0).then(|| self.true_positives as f64 / denom as f64)
    }

    pub fn recall(&self) -> Option<f64> {
        let denom = self.true_positives + self.false_negatives;
        (denom > 0).then(|| self.true_positives as f64 / denom as f64)
    }
}
