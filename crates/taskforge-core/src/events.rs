use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every event any component may emit.
///
/// Delivery is synchronous on the emitting fiber: the supervisor is
/// single-threaded and cooperative, so there are no cross-thread ordering
/// concerns to design around (see Design Notes, "Event emitters").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A task was created.
    TaskCreated {
        /// The created task's id.
        task_id: String,
    },
    /// A task's fields or status changed.
    TaskUpdated {
        /// The updated task's id.
        task_id: String,
    },
    /// A task reached `completed`.
    TaskCompleted {
        /// The completed task's id.
        task_id: String,
    },
    /// A task was removed from the store.
    TaskDeleted {
        /// The deleted task's id.
        task_id: String,
    },
    /// A task was promoted from one backlog tier to another.
    TaskPromoted {
        /// The promoted task's id.
        task_id: String,
        /// Tier it was promoted from.
        from: String,
        /// Tier it was promoted to.
        to: String,
    },
    /// `getNextTask` fell back to an any-phase task.
    TaskPhaseMismatch {
        /// The task returned despite not matching the requested phase.
        task_id: String,
        /// The phase that was requested.
        requested_phase: String,
    },
    /// A version conflict was detected and resolved via three-way merge.
    TasksVersionConflict {
        /// Disk-side concurrency version at detection time.
        disk_version: u64,
        /// In-memory concurrency version at detection time.
        memory_version: u64,
        /// Human-readable merge summary.
        summary: String,
    },
    /// The input validator flagged a threat.
    SecurityThreat {
        /// Threat category, e.g. `promptInjection`.
        category: String,
    },
    /// The input validator blocked a request in enforce mode.
    SecurityBlocked {
        /// Threat category that triggered the block.
        category: String,
    },
    /// Shadow mode was turned on for the task store.
    ShadowEnabled,
    /// Shadow mode's operating mode changed (e.g. authoritative backend).
    ShadowModeChanged {
        /// New mode description.
        mode: String,
    },
    /// The shadow secondary backend finished initialization.
    ShadowInitialized,
    /// A shadow-mode save/load completed without divergence.
    ShadowSynced,
    /// A shadow-mode divergence was recorded.
    MetricDivergence {
        /// The divergence record id.
        divergence_id: String,
        /// Severity band, e.g. "warning" or "critical".
        severity: String,
    },
    /// A named counter was incremented (used by Memory Store clients).
    CounterIncremented {
        /// Counter name.
        name: String,
        /// New value after increment.
        value: i64,
    },
}

impl Event {
    /// The dotted/colon event name as it appears in spec.md §6, e.g.
    /// `task:completed` or `tasks:version-conflict`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task:created",
            Event::TaskUpdated { .. } => "task:updated",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskDeleted { .. } => "task:deleted",
            Event::TaskPromoted { .. } => "task:promoted",
            Event::TaskPhaseMismatch { .. } => "task:phase-mismatch",
            Event::TasksVersionConflict { .. } => "tasks:version-conflict",
            Event::SecurityThreat { .. } => "security:threat",
            Event::SecurityBlocked { .. } => "security:blocked",
            Event::ShadowEnabled => "shadow:enabled",
            Event::ShadowModeChanged { .. } => "shadow:mode-changed",
            Event::ShadowInitialized => "shadow:initialized",
            Event::ShadowSynced => "shadow:synced",
            Event::MetricDivergence { .. } => "metric:divergence",
            Event::CounterIncremented { .. } => "counter:incremented",
        }
    }
}

/// A subscriber callback. Invoked synchronously from [`EventBus::emit`].
pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// In-process, single-writer pub-sub bus used by every component to report
/// the events listed in spec.md §6.
///
/// Delivery order matches emission order; there is no queuing or batching.
#[derive(Default, Clone)]
pub struct EventBus {
    subscribers: Arc<parking_lot_compat::RwLock<Vec<Subscriber>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Returns nothing: subscribers live for the
    /// lifetime of the bus (there is no unsubscribe — callers drop the bus).
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(callback));
    }

    /// Emit an event to all subscribers, synchronously, in registration order.
    /// Always also logs at `tracing::info!` so events show up in structured logs
    /// even with no subscribers attached.
    pub fn emit(&self, event: Event) {
        tracing::info!(event = event.name(), "event emitted");
        for sub in self.subscribers.read().iter() {
            sub(&event);
        }
    }

    /// Number of currently registered subscribers (mainly for tests).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Minimal `RwLock` re-export shim so this module has a single lock type to
/// reason about without pulling `parking_lot` into the public API surface of
/// every downstream crate unnecessarily.
mod parking_lot_compat {
    pub use parking_lot::RwLock;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn event_names_match_spec() {
        assert_eq!(
            Event::TaskCompleted {
                task_id: "t".into()
            }
            .name(),
            "task:completed"
        );
        assert_eq!(
            Event::TasksVersionConflict {
                disk_version: 1,
                memory_version: 2,
                summary: String::new(),
            }
            .name(),
            "tasks:version-conflict"
        );
        assert_eq!(Event::ShadowEnabled.name(), "shadow:enabled");
    }

    #[test]
    fn emit_delivers_to_all_subscribers_in_order() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        bus.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = calls.clone();
        bus.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        bus.emit(Event::ShadowSynced);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(Event::ShadowInitialized);
    }
}
