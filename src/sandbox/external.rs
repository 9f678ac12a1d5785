//! External interpreter execution with a bounded wait.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::sandbox::harness::{generate_harness, parse_analysis_lines, AnalysisLine};

/// Exit code reported when the interpreter could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Exit code reported when the interpreter was killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Offset added to the signal number of a child killed by a signal, as shells do.
pub const SIGNAL_EXIT_CODE_BASE: i32 = 128;

/// What the interpreter process produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Structured `[ANALYSIS]` lines parsed from stdout.
    pub events: Vec<AnalysisLine>,
    pub timed_out: bool,
}

impl ProcessReport {
    /// Check if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    fn failed(exit_code: i32, stderr: String) -> Self {
        Self {
            exit_code,
            stderr,
            ..Default::default()
        }
    }
}

/// Run `code` inside the harness with `interpreter`, waiting at most `timeout`.
///
/// The child is killed when the wait bound is hit. Failures to start the
/// interpreter are reported in the returned value, never as an error.
pub async fn run_external(code: &str, interpreter: &Path, timeout: Duration) -> ProcessReport {
    let harness = generate_harness(code, "analysis");

    let spawned = Command::new(interpreter)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let err = if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::InterpreterNotFound(interpreter.display().to_string())
            } else {
                SandboxError::Io(e)
            };
            warn!(interpreter = %interpreter.display(), error = %err, "failed to spawn interpreter");
            return ProcessReport::failed(SPAWN_FAILURE_EXIT_CODE, err.to_string());
        }
    };

    let stdin = child.stdin.take();
    let run = async move {
        if let Some(mut stdin) = stdin {
            // A script that exits early closes its end of the pipe; that is not our failure.
            if let Err(e) = stdin.write_all(harness.as_bytes()).await {
                debug!(error = %e, "interpreter closed stdin early");
            }
        }
        child.wait_with_output().await
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = exit_code_of(output.status);
            debug!(exit_code, "interpreter finished");
            ProcessReport {
                events: parse_analysis_lines(&stdout),
                stdout,
                stderr,
                exit_code,
                timed_out: false,
            }
        }
        Ok(Err(e)) => ProcessReport::failed(SPAWN_FAILURE_EXIT_CODE, SandboxError::Io(e).to_string()),
        Err(_) => {
            warn!(?timeout, "interpreter timed out; killed");
            ProcessReport {
                timed_out: true,
                ..ProcessReport::failed(
                    TIMEOUT_EXIT_CODE,
                    SandboxError::Timeout(timeout).to_string(),
                )
            }
        }
    }
}

/// The child's exit code, or `128 + signal` when a signal ended it.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            warn!(signal, "interpreter was killed by a signal");
            return SIGNAL_EXIT_CODE_BASE + signal;
        }
    }
    SPAWN_FAILURE_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_interpreter_is_reported() {
        let report = run_external(
            "print(1)",
            Path::new("/nonexistent/bin/lua-interpreter"),
            Duration::from_secs(1),
        )
        .await;

        assert!(!report.is_success());
        assert_eq!(report.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(report.stderr.contains("not found"));
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires lua interpreter"]
    async fn test_print_is_structured() {
        let report = run_external("print('hi', 2)", Path::new("lua"), Duration::from_secs(5)).await;

        assert!(report.is_success(), "stderr: {}", report.stderr);
        assert_eq!(report.events[0].event, "PRINT");
        assert_eq!(report.events[0].data, "hi\t2");
        assert_eq!(report.events.last().unwrap().event, "COMPLETION");
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_exit_is_distinct_from_spawn_failure() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait statuses: low bits hold the terminating signal, the next
        // byte holds a normal exit code.
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code_of(ExitStatus::from_raw(15)), 143);
        assert_eq!(exit_code_of(ExitStatus::from_raw(1 << 8)), 1);
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
    }
}
