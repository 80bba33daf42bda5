use thiserror::Error;

/// A convenience `Result` alias using [`TaskforgeError`].
pub type TaskforgeResult<T> = Result<T, TaskforgeError>;

/// Top-level error type for the taskforge orchestrator.
///
/// Each variant corresponds to a subsystem that can produce errors, or to one
/// of the named error kinds in the error-handling design (NotFound,
/// VersionConflict, CheckoutTimeout, ...).
#[derive(Error, Debug)]
pub enum TaskforgeError {
    /// A task, artifact, or detection id refers to nothing the caller can act on.
    #[error("not found: {0}")]
    NotFound(String),

    /// `save()` of an invalid state/task was rejected.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// Internal: surfaced only when a conflict could not be auto-resolved.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// Pool checkout exceeded its configured timeout.
    #[error("checkout timed out after {0:?}")]
    CheckoutTimeout(std::time::Duration),

    /// The pool was shut down while a checkout or checkin was pending.
    #[error("pool is shutting down")]
    PoolShutdown,

    /// A spawned subprocess exited non-zero or was signalled.
    #[error("subprocess failed: code={code:?} signal={signal:?}")]
    SubprocessFailure {
        /// Process exit code, if the process exited normally.
        code: Option<i32>,
        /// Signal that terminated the process, if any.
        signal: Option<i32>,
    },

    /// The state journal could not recover a valid backup.
    #[error("state corrupted beyond recovery: {0}")]
    CorruptState(String),

    /// The Memory Store backend is unavailable; caller should degrade gracefully.
    #[error("memory backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An error from the input validator.
    #[error("validator error: {0}")]
    Validator(String),

    /// An error from the guardrail detector.
    #[error("guardrail error: {0}")]
    Guardrail(String),

    /// An error from the delegation engine.
    #[error("delegation error: {0}")]
    Delegation(String),

    /// An error from the hierarchy runtime (pool, cache, subprocess supervision).
    #[error("hierarchy error: {0}")]
    Hierarchy(String),

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
