use crate::timeout::{calculate_timeout, grace_period_ms};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::warn;

/// How many trailing bytes of stderr are retained on failure.
const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// One child process to spawn under a parent task (spec.md §4.G,
/// "Subprocess supervision").
#[derive(Debug, Clone)]
pub struct Spawn {
    pub program: String,
    pub args: Vec<String>,
    pub subtask_index: usize,
    pub subtask_total: usize,
    pub parent_task_id: String,
    pub parent_session_id: String,
}

/// Outcome of one spawned subprocess.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success { stdout: String },
    Failure { code: Option<i32>, signal: Option<i32>, stderr_tail: String },
    Skipped,
    TimedOut,
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Report produced by running a batch of subtasks under one pattern.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub all_succeeded: bool,
    pub results: Vec<Outcome>,
}

/// How a batch of subtasks is supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

/// Run one subprocess to completion, enforcing the tiered deadline and
/// grace-period kill (spec.md §4.G / §5 cancellation).
pub async fn spawn_one(spec: &Spawn, depth: u32, parent_remaining_ms: Option<u64>) -> Outcome {
    let timeout = calculate_timeout(depth, parent_remaining_ms);
    let grace = grace_period_ms(depth);

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .env("PARENT_SESSION_ID", &spec.parent_session_id)
        .env("ORCHESTRATOR_SESSION", "true")
        .env("SUBTASK_INDEX", spec.subtask_index.to_string())
        .env("SUBTASK_TOTAL", spec.subtask_total.to_string())
        .env("PARENT_TASK_ID", &spec.parent_task_id)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %spec.program, error = %err, "failed to spawn subprocess");
            return Outcome::Failure {
                code: None,
                signal: None,
                stderr_tail: err.to_string(),
            };
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_lines(stdout).await });
    let stderr_task = tokio::spawn(async move { read_lines(stderr).await });

    let wait = tokio::time::timeout(Duration::from_millis(timeout.timeout_ms), child.wait()).await;

    let status = match wait {
        Ok(status) => status,
        Err(_) => {
            // Deadline hit: cooperative cancel first, then wait out the grace period.
            #[cfg(unix)]
            if let Some(id) = child.id() {
                unsafe {
                    libc::kill(id as i32, libc::SIGTERM);
                }
            }
            match tokio::time::timeout(Duration::from_millis(grace), child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    return Outcome::TimedOut;
                }
            }
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    match status {
        Ok(status) if status.success() => Outcome::Success { stdout },
        Ok(status) => Outcome::Failure {
            code: status.code(),
            signal: unix_signal(&status),
            stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
        },
        Err(err) => Outcome::Failure {
            code: None,
            signal: None,
            stderr_tail: err.to_string(),
        },
    }
}

async fn read_lines<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut reader = BufReader::new(pipe).lines();
    let mut buf = String::new();
    while let Ok(Some(line)) = reader.next_line().await {
        buf.push_str(&line);
        buf.push('\n');
    }
    buf
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        text.to_string()
    } else {
        text[text.len() - max_bytes..].to_string()
    }
}

#[cfg(unix)]
fn unix_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn unix_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Run a batch of subtasks under `mode`, honoring the ordering rules in
/// spec.md §4.G and §5 (parallel: no ordering; sequential: stop on first
/// failure, mark the rest skipped).
pub async fn run_batch(
    specs: Vec<Spawn>,
    mode: ExecutionMode,
    depth: u32,
    parent_remaining_ms: Option<u64>,
) -> BatchResult {
    match mode {
        ExecutionMode::Parallel => {
            let futures = specs
                .iter()
                .map(|spec| spawn_one(spec, depth, parent_remaining_ms));
            let results = futures_join_all(futures).await;
            let all_succeeded = results.iter().all(|r| r.succeeded());
            BatchResult { all_succeeded, results }
        }
        ExecutionMode::Sequential => {
            let mut results = Vec::with_capacity(specs.len());
            let mut failed = false;
            for spec in &specs {
                if failed {
                    results.push(Outcome::Skipped);
                    continue;
                }
                let outcome = spawn_one(spec, depth, parent_remaining_ms).await;
                if !outcome.succeeded() {
                    failed = true;
                }
                results.push(outcome);
            }
            BatchResult {
                all_succeeded: !failed,
                results,
            }
        }
    }
}

async fn futures_join_all<I>(iter: I) -> Vec<Outcome>
where
    I: IntoIterator,
    I::Item: std::future::Future<Output = Outcome>,
{
    let handles: Vec<_> = iter.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await.unwrap_or(Outcome::Failure {
            code: None,
            signal: None,
            stderr_tail: "subprocess task panicked".to_string(),
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> Spawn {
        Spawn {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            subtask_index: 0,
            subtask_total: 1,
            parent_task_id: "task-1".to_string(),
            parent_session_id: "session-1".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let outcome = spawn_one(&spec("echo", &["hello"]), 0, None).await;
        match outcome {
            Outcome::Success { stdout } => assert!(stdout.contains("hello")),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_failure() {
        let outcome = spawn_one(&spec("sh", &["-c", "echo boom 1>&2; exit 7"]), 0, None).await;
        match outcome {
            Outcome::Failure { code, stderr_tail, .. } => {
                assert_eq!(code, Some(7));
                assert!(stderr_tail.contains("boom"));
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sequential_batch_skips_remaining_after_first_failure() {
        let specs = vec![
            spec("sh", &["-c", "exit 1"]),
            spec("echo", &["never runs to completion as a success"]),
        ];
        let batch = run_batch(specs, ExecutionMode::Sequential, 0, None).await;
        assert!(!batch.all_succeeded);
        assert!(!batch.results[0].succeeded());
        assert!(matches!(batch.results[1], Outcome::Skipped));
    }

    #[tokio::test]
    async fn parallel_batch_runs_every_entry_regardless_of_failure() {
        let specs = vec![spec("sh", &["-c", "exit 1"]), spec("echo", &["ok"])];
        let batch = run_batch(specs, ExecutionMode::Parallel, 0, None).await;
        assert!(!batch.all_succeeded);
        assert_eq!(batch.results.len(), 2);
    }

    #[tokio::test]
    async fn all_succeeding_batch_reports_all_succeeded() {
        let specs = vec![spec("echo", &["a"]), spec("echo", &["b"])];
        let batch = run_batch(specs, ExecutionMode::Parallel, 0, None).await;
        assert!(batch.all_succeeded);
    }
}
