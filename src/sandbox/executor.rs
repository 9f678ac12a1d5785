//! Execution supervisor: picks a strategy, enforces the time budget and
//! packages every run as an [`ExecutionOutcome`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{parse_lua_error, Result, SandboxError};
use crate::sandbox::config::{ExecutionStrategy, SandboxConfig, MAX_TIMEOUT};
use crate::sandbox::external::{run_external, ProcessReport};
use crate::sandbox::limits::ExecutionGuard;
use crate::sandbox::session::SandboxSession;
use crate::sandbox::trace::{duration_secs, TraceEvent, TraceKind};
use crate::sandbox::vm::{run_chunk, VmOptions};

/// Result of a script execution. The trace is present whether or not the run succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(rename = "success")]
    pub succeeded: bool,
    /// The script's final value (in-process runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace: Vec<TraceEvent>,
    #[serde(rename = "execution_time", with = "duration_secs")]
    pub elapsed: Duration,
    pub strategy: ExecutionStrategy,
    /// Captured process output (external runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessReport>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    /// Messages passed to `print`, in call order.
    pub fn prints(&self) -> Vec<&str> {
        self.trace
            .iter()
            .filter(|e| e.kind == TraceKind::PrintOutput)
            .filter_map(|e| e.payload["message"].as_str())
            .collect()
    }
}

/// Runs untrusted scripts under one of the two execution strategies.
///
/// Each call builds its own session, so a single sandbox can be shared
/// across tasks.
#[derive(Debug, Clone)]
pub struct ScriptSandbox {
    config: SandboxConfig,
}

impl ScriptSandbox {
    /// Create a new sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `code` with the configured strategy.
    ///
    /// `timeout` overrides the configured budget for this call. The only error
    /// is [`SandboxError::MalformedInput`] for empty code or a timeout that is
    /// zero or above [`MAX_TIMEOUT`]; script failures are
    /// reported in the outcome.
    pub async fn execute(&self, code: &str, timeout: Option<Duration>) -> Result<ExecutionOutcome> {
        self.execute_with(self.config.strategy, code, timeout).await
    }

    /// Execute `code` with an explicit strategy.
    pub async fn execute_with(
        &self,
        strategy: ExecutionStrategy,
        code: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionOutcome> {
        if code.trim().is_empty() {
            return Err(SandboxError::MalformedInput("No code provided".to_string()));
        }
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(SandboxError::MalformedInput("timeout must be non-zero".to_string()));
        }
        if timeout.is_some_and(|t| t > MAX_TIMEOUT) {
            return Err(SandboxError::MalformedInput(format!(
                "timeout must not exceed {:?}",
                MAX_TIMEOUT
            )));
        }

        debug!(?strategy, bytes = code.len(), "executing script");
        let outcome = match strategy {
            ExecutionStrategy::InProcess => {
                self.execute_in_process(code, timeout.unwrap_or(self.config.timeout))
                    .await
            }
            ExecutionStrategy::External => {
                self.execute_external(code, timeout.unwrap_or(self.config.interpreter_timeout))
                    .await
            }
        };
        debug!(
            success = outcome.succeeded,
            elapsed = ?outcome.elapsed,
            events = outcome.trace.len(),
            "execution finished"
        );
        Ok(outcome)
    }

    async fn execute_in_process(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let started = Instant::now();
        let session = SandboxSession::new();
        let root = session.root_snapshot();
        let trace = session.trace().clone();

        let guard = ExecutionGuard::new(timeout, self.config.hook_instruction_interval);
        let cancel = guard.cancel_handle();
        let options = VmOptions {
            max_memory: self.config.max_memory,
        };

        let code = code.to_string();
        let vm_trace = trace.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_chunk(&code, &root, &vm_trace, &guard, &options)
        });

        // The hook normally stops the chunk at the deadline; the outer bound
        // covers time spent inside a single long-running library call.
        let bound = timeout.saturating_add(self.config.cancel_grace);
        let result = match tokio::time::timeout(bound, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SandboxError::ExecutionFailed(format!("task panicked: {}", e))),
            Err(_) => {
                cancel.cancel();
                warn!(?timeout, "VM did not stop at its deadline; abandoning it");
                Err(SandboxError::Timeout(timeout))
            }
        };

        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => {
                if e.is_timeout() {
                    warn!(?timeout, "script timed out");
                }
                trace.lock().record_custom(
                    "script_error",
                    json!({ "kind": e.kind(), "message": e.to_string() }),
                );
                (None, Some(e.to_string()))
            }
        };

        ExecutionOutcome {
            succeeded: error.is_none(),
            result,
            error,
            trace: session.events(),
            elapsed: started.elapsed(),
            strategy: ExecutionStrategy::InProcess,
            process: None,
        }
    }

    async fn execute_external(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let started = Instant::now();
        let report = run_external(code, &self.config.interpreter_path, timeout).await;

        let error = if report.is_success() {
            None
        } else {
            Some(describe_process_failure(&report))
        };

        ExecutionOutcome {
            succeeded: report.is_success(),
            result: None,
            error,
            trace: Vec::new(),
            elapsed: started.elapsed(),
            strategy: ExecutionStrategy::External,
            process: Some(report),
        }
    }
}

/// One-line description of a failed interpreter run.
fn describe_process_failure(report: &ProcessReport) -> String {
    let summary = match parse_lua_error(&report.stderr) {
        Some(SandboxError::Script { chunk, line, message, .. }) if !report.timed_out => {
            SandboxError::Script {
                chunk,
                line,
                message,
                traceback: None,
            }
            .to_string()
        }
        _ => report.stderr.trim().to_string(),
    };
    SandboxError::InterpreterProcess {
        exit_code: report.exit_code,
        stderr: summary,
    }
    .to_string()
}
