//! Human-in-the-loop guardrail detector (spec.md §4.E): classifies whether a
//! task needs human sign-off by matching lower-cased keyword patterns, then
//! learns new patterns from corrected feedback.
//!
//! # Main types
//!
//! - [`GuardrailDetector`] — the stateful classifier.
//! - [`Context`] / [`Detection`] — one classification's input and output.
//! - [`FeedbackInput`] — what a human reports back about a detection.

mod model;
mod patterns;

pub use model::{Context, Detection, FeedbackInput, Stats};
pub use patterns::PatternFamily;

use patterns::{builtin_families, STOPWORDS};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use taskforge_memory::{FeedbackRow, LearningRow, MemoryStore};
use unicode_normalization::UnicodeNormalization;

const DETECTION_CACHE_CAP: usize = 500;
const DEFAULT_THRESHOLD: f64 = 0.65;
const THRESHOLD_CAP: f64 = 0.95;
const THRESHOLD_FLOOR: f64 = 0.40;
const MIN_DETECTIONS_FOR_ADAPT: i64 = 10;
const LEARNED_BASE_CONFIDENCE: f64 = 0.60;
const LEARNED_REINFORCEMENT_STEP: f64 = 0.05;
const LEARNED_CONFIDENCE_CAP: f64 = 0.85;
const MIN_LEARNED_CANDIDATES: usize = 2;

/// The stateful guardrail classifier.
///
/// Holds the built-in and learned pattern families, a bounded LRU cache of
/// recent detections (keyed by id, for later feedback), and per-pattern /
/// global accuracy counters. Persists learned patterns and feedback via a
/// [`MemoryStore`] when one is attached; runs entirely in memory otherwise.
pub struct GuardrailDetector {
    families: Vec<PatternFamily>,
    threshold: f64,
    adapt_enabled: bool,
    detections: HashMap<String, Detection>,
    detection_order: VecDeque<String>,
    pattern_stats: HashMap<String, Stats>,
    global: Stats,
    memory: Option<Arc<MemoryStore>>,
}

impl GuardrailDetector {
    /// Create a detector backed by an in-memory-only store.
    pub fn new() -> Self {
        Self::with_memory(None)
    }

    /// Create a detector that persists learned patterns and feedback via `memory`.
    pub fn with_memory(memory: Option<Arc<MemoryStore>>) -> Self {
        let mut detector = Self {
            families: builtin_families(),
            threshold: DEFAULT_THRESHOLD,
            adapt_enabled: true,
            detections: HashMap::new(),
            detection_order: VecDeque::new(),
            pattern_stats: HashMap::new(),
            global: Stats::default(),
            memory: memory.clone(),
        };
        if let Some(store) = &memory {
            detector.restore_learned_patterns(store);
        }
        detector
    }

    fn restore_learned_patterns(&mut self, store: &MemoryStore) {
        for row in store.all_learning() {
            if let Some(keywords) = store.get(&format!("guardrail:keywords:{}", row.pattern_name)) {
                if let Some(words) = keywords.as_array() {
                    let keywords: Vec<String> = words
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                    let confidence = learned_confidence(reinforcements_from_row(&row));
                    self.families.push(PatternFamily {
                        name: row.pattern_name.clone(),
                        keywords,
                        base_confidence: confidence,
                    });
                }
            }
            self.pattern_stats.insert(
                row.pattern_name.clone(),
                Stats {
                    true_positives: row.tp,
                    false_positives: row.fp,
                    false_negatives: row.fn_,
                    true_negatives: 0,
                    total_detections: row.tp + row.fp + row.fn_,
                    learned_pattern_count: 0,
                },
            );
        }
        if let Some(t) = store.get("guardrail:threshold").and_then(|v| v.as_f64()) {
            self.threshold = t;
        }
    }

    /// Disable adaptive threshold adjustment (on by default).
    pub fn disable_adaptive_threshold(&mut self) {
        self.adapt_enabled = false;
    }

    /// Current decision threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify a task, caching the result for later [`Self::record_feedback`].
    pub fn analyze(&mut self, ctx: Context) -> Detection {
        let normalized: String = ctx.task.nfc().collect::<String>().to_lowercase();
        let trimmed = normalized.trim();

        let id = format!("detection-{}", uuid::Uuid::new_v4());
        let timestamp = chrono::Utc::now();

        if trimmed.is_empty() {
            let detection = Detection {
                id,
                task_excerpt: excerpt(&ctx.task),
                phase: ctx.phase,
                kind: ctx.kind,
                pattern_name: None,
                confidence: 0.0,
                requires_human: false,
                timestamp,
            };
            self.cache_detection(detection.clone());
            return detection;
        }

        let mut best: Option<(&PatternFamily, f64)> = None;
        for family in &self.families {
            let matches = family.match_count(trimmed);
            if matches == 0 {
                continue;
            }
            let confidence = (family.base_confidence + 0.10 * (matches as f64 - 1.0)).min(1.0);
            if best.map(|(_, c)| confidence > c).unwrap_or(true) {
                best = Some((family, confidence));
            }
        }

        let (pattern_name, confidence) = match best {
            Some((family, confidence)) => (Some(family.name.clone()), confidence),
            None => (None, 0.0),
        };
        let requires_human = confidence >= self.threshold;

        let detection = Detection {
            id,
            task_excerpt: excerpt(&ctx.task),
            phase: ctx.phase,
            kind: ctx.kind,
            pattern_name,
            confidence,
            requires_human,
            timestamp,
        };
        self.cache_detection(detection.clone());
        detection
    }

    fn cache_detection(&mut self, detection: Detection) {
        if self.detection_order.len() >= DETECTION_CACHE_CAP {
            if let Some(oldest) = self.detection_order.pop_front() {
                self.detections.remove(&oldest);
            }
        }
        self.detection_order.push_back(detection.id.clone());
        self.detections.insert(detection.id.clone(), detection);
    }

    /// Record a human's verdict on a prior detection. Feedback for an unknown
    /// id is still accepted and stored, never raises.
    pub fn record_feedback(&mut self, detection_id: &str, feedback: FeedbackInput) {
        let detection = self.detections.get(detection_id).cloned();

        self.global.total_detections += 1;
        let actual_yes = feedback.actual_need_is_yes();
        let requires_human = detection.as_ref().map(|d| d.requires_human).unwrap_or(false);

        match (requires_human, actual_yes) {
            (true, true) => self.global.true_positives += 1,
            (true, false) => self.global.false_positives += 1,
            (false, true) => self.global.false_negatives += 1,
            (false, false) => self.global.true_negatives += 1,
        }

        if let Some(d) = &detection {
            if let Some(pattern_name) = &d.pattern_name {
                let stats = self.pattern_stats.entry(pattern_name.clone()).or_default();
                match (requires_human, actual_yes) {
                    (true, true) => stats.true_positives += 1,
                    (true, false) => stats.false_positives += 1,
                    (false, true) => stats.false_negatives += 1,
                    (false, false) => stats.true_negatives += 1,
                }
                self.persist_pattern_stats(pattern_name);
            }
        }

        if actual_yes && !requires_human {
            if let Some(d) = &detection {
                self.learn_from_false_negative(&d.task_excerpt);
            }
        }

        if let Some(store) = &self.memory {
            store.record_feedback(FeedbackRow {
                detection_id: detection_id.to_string(),
                was_correct: feedback.was_correct,
                actual_need: feedback.actual_need.clone(),
                comment: feedback.comment.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            });
        }

        self.maybe_adapt_threshold();
    }

    fn persist_pattern_stats(&self, pattern_name: &str) {
        let Some(store) = &self.memory else { return };
        let Some(stats) = self.pattern_stats.get(pattern_name) else {
            return;
        };
        store.upsert_learning(LearningRow {
            pattern_name: pattern_name.to_string(),
            tp: stats.true_positives,
            fp: stats.false_positives,
            fn_: stats.false_negatives,
            last_updated: chrono::Utc::now().timestamp(),
        });
    }

    /// Extract ≥2 candidate keywords from `task_excerpt` not already covered
    /// by a built-in pattern, and if found, create a learned pattern.
    fn learn_from_false_negative(&mut self, task_excerpt: &str) {
        let lower = task_excerpt.to_lowercase();
        let candidates: Vec<String> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() >= 3)
            .filter(|token| !STOPWORDS.contains(token))
            .map(str::to_string)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        if candidates.len() < MIN_LEARNED_CANDIDATES {
            return;
        }

        let already_covered = self
            .families
            .iter()
            .any(|f| candidates.iter().all(|c| f.keywords.contains(c)));
        if already_covered {
            return;
        }

        let reinforcements = self
            .families
            .iter()
            .filter(|f| f.name.starts_with("learned_"))
            .count();
        let name = format!("learned_{}", reinforcements + 1);
        let confidence = learned_confidence(0);

        self.families.push(PatternFamily {
            name: name.clone(),
            keywords: candidates.clone(),
            base_confidence: confidence,
        });

        if let Some(store) = &self.memory {
            store.set(
                &format!("guardrail:keywords:{name}"),
                serde_json::json!(candidates),
            );
            store.upsert_learning(LearningRow {
                pattern_name: name,
                tp: 0,
                fp: 0,
                fn_: 1,
                last_updated: chrono::Utc::now().timestamp(),
            });
        }
    }

    fn maybe_adapt_threshold(&mut self) {
        if !self.adapt_enabled || self.global.total_detections < MIN_DETECTIONS_FOR_ADAPT {
            return;
        }
        let total = self.global.total_detections as f64;
        let fp_rate = self.global.false_positives as f64 / total;
        let fn_rate = self.global.false_negatives as f64 / total;

        if fp_rate > 0.30 {
            self.threshold = (self.threshold + 0.05).min(THRESHOLD_CAP);
        }
        if fn_rate > 0.30 {
            self.threshold = (self.threshold - 0.05).max(THRESHOLD_FLOOR);
        }

        if let Some(store) = &self.memory {
            store.set("guardrail:threshold", serde_json::json!(self.threshold));
        }
    }

    /// Statistics across all patterns: precision, recall, learned count.
    pub fn stats(&self) -> Stats {
        let mut global = self.global.clone();
        global.learned_pattern_count = self.families.iter().filter(|f| f.name.starts_with("learned_")).count();
        global
    }

    /// Per-pattern accuracy counters.
    pub fn pattern_stats(&self) -> &HashMap<String, Stats> {
        &self.pattern_stats
    }

    /// Look up a cached detection by id.
    pub fn detection(&self, id: &str) -> Option<&Detection> {
        self.detections.get(id)
    }
}

impl Default for GuardrailDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn reinforcements_from_row(row: &LearningRow) -> u32 {
    (row.tp + row.fp + row.fn_).max(0) as u32
}

fn learned_confidence(reinforcements: u32) -> f64 {
    (LEARNED_BASE_CONFIDENCE + LEARNED_REINFORCEMENT_STEP * reinforcements as f64)
        .min(LEARNED_CONFIDENCE_CAP)
}

fn excerpt(task: &str) -> String {
    const MAX_LEN: usize = 500;
    if task.chars().count() <= MAX_LEN {
        task.to_string()
    } else {
        task.chars().take(MAX_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(task: &str) -> Context {
        Context {
            task: task.to_string(),
            phase: "implementation".to_string(),
            kind: "default".to_string(),
        }
    }

    #[test]
    fn empty_task_never_requires_human() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(ctx("   "));
        assert!(!detection.requires_human);
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn high_risk_keyword_requires_human() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(ctx("Please drop table users in production"));
        assert!(detection.requires_human);
        assert_eq!(detection.pattern_name.as_deref(), Some("highRisk"));
    }

    #[test]
    fn deployment_phase_is_not_a_task_lifecycle_phase() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(Context {
            task: "Deploy to production".to_string(),
            phase: "deployment".to_string(),
            kind: "task".to_string(),
        });
        assert_eq!(detection.phase, "deployment");
        assert!(detection.requires_human);
    }

    #[test]
    fn clean_task_does_not_require_human() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(ctx("Add a unit test for the parser"));
        assert!(!detection.requires_human);
    }

    #[test]
    fn multiple_keyword_matches_raise_confidence() {
        let mut d = GuardrailDetector::new();
        let one = d.analyze(ctx("revoke access"));
        let two = d.analyze(ctx("revoke access to credentials"));
        assert!(two.confidence > one.confidence);
    }

    #[test]
    fn feedback_updates_global_counters() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(ctx("drop table production data"));
        assert!(detection.requires_human);
        d.record_feedback(
            &detection.id,
            FeedbackInput {
                was_correct: true,
                actual_need: "yes".to_string(),
                comment: None,
            },
        );
        assert_eq!(d.stats().true_positives, 1);
    }

    #[test]
    fn feedback_for_unknown_detection_does_not_panic() {
        let mut d = GuardrailDetector::new();
        d.record_feedback(
            "ghost-detection",
            FeedbackInput {
                was_correct: false,
                actual_need: "yes".to_string(),
                comment: None,
            },
        );
        assert_eq!(d.stats().total_detections, 1);
    }

    #[test]
    fn false_negative_creates_learned_pattern() {
        let mut d = GuardrailDetector::new();
        let detection = d.analyze(ctx("rotate encryption keypair material now"));
        assert!(!detection.requires_human);
        d.record_feedback(
            &detection.id,
            FeedbackInput {
                was_correct: false,
                actual_need: "yes".to_string(),
                comment: Some("this needed sign-off".to_string()),
            },
        );
        assert_eq!(d.stats().learned_pattern_count, 1);

        let follow_up = d.analyze(ctx("rotate encryption keypair material again"));
        assert!(follow_up.requires_human);
    }

    #[test]
    fn precision_and_recall_are_computed() {
        let mut d = GuardrailDetector::new();
        for _ in 0..3 {
            let detection = d.analyze(ctx("drop table production"));
            d.record_feedback(
                &detection.id,
                FeedbackInput {
                    was_correct: true,
                    actual_need: "yes".to_string(),
                    comment: None,
                },
            );
        }
        let stats = d.stats();
        assert_eq!(stats.precision(), Some(1.0));
        assert_eq!(stats.recall(), Some(1.0));
    }

    #[test]
    fn learned_patterns_persist_via_memory_store() {
        let memory = Arc::new(MemoryStore::in_memory());
        let mut d = GuardrailDetector::with_memory(Some(memory.clone()));
        let detection = d.analyze(ctx("rotate encryption keypair material now"));
        d.record_feedback(
            &detection.id,
            FeedbackInput {
                was_correct: false,
                actual_need: "yes".to_string(),
                comment: None,
            },
        );

        let reloaded = GuardrailDetector::with_memory(Some(memory));
        let follow_up_stats = reloaded.stats();
        assert_eq!(follow_up_stats.learned_pattern_count, 1);
    }
}
