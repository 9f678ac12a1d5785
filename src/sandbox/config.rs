//! Sandbox configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Longest time budget any single run may ask for.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Which backend runs a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Embedded Lua VM with traced builtins and a preemptive deadline.
    #[default]
    InProcess,
    /// A `lua` subprocess fed with a generated harness.
    External,
}

/// Configuration for the script sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Default execution time budget for in-process runs.
    pub timeout: Duration,
    /// Strategy used when a call does not pick one.
    pub strategy: ExecutionStrategy,
    /// Maximum Lua heap size in bytes.
    pub max_memory: usize,
    /// VM instructions between deadline checks.
    pub hook_instruction_interval: u32,
    /// Extra time the supervisor waits for the VM thread to observe the deadline.
    pub cancel_grace: Duration,
    /// Interpreter binary for external runs.
    pub interpreter_path: PathBuf,
    /// Upper bound on how long an external run may take.
    pub interpreter_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            strategy: ExecutionStrategy::InProcess,
            max_memory: 64 * 1024 * 1024, // 64MB
            hook_instruction_interval: 1000,
            cancel_grace: Duration::from_millis(250),
            interpreter_path: PathBuf::from("lua"),
            interpreter_timeout: Duration::from_secs(30),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Reject settings that would make every run fail or never check its deadline.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(SandboxError::Config("timeout must be non-zero".to_string()));
        }
        if self.interpreter_timeout.is_zero() {
            return Err(SandboxError::Config(
                "interpreter_timeout must be non-zero".to_string(),
            ));
        }
        if self.timeout > MAX_TIMEOUT || self.interpreter_timeout > MAX_TIMEOUT {
            return Err(SandboxError::Config(format!(
                "timeouts must not exceed {:?}",
                MAX_TIMEOUT
            )));
        }
        if self.hook_instruction_interval == 0 {
            return Err(SandboxError::Config(
                "hook_instruction_interval must be at least 1".to_string(),
            ));
        }
        if self.max_memory == 0 {
            return Err(SandboxError::Config("max_memory must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    strategy: Option<ExecutionStrategy>,
    max_memory: Option<usize>,
    hook_instruction_interval: Option<u32>,
    cancel_grace: Option<Duration>,
    interpreter_path: Option<PathBuf>,
    interpreter_timeout: Option<Duration>,
}

impl SandboxConfigBuilder {
    /// Set the default execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the default execution strategy.
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the maximum Lua heap size in bytes.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Set how many VM instructions run between deadline checks.
    pub fn hook_instruction_interval(mut self, instructions: u32) -> Self {
        self.hook_instruction_interval = Some(instructions);
        self
    }

    /// Set the grace period after the deadline before the VM thread is abandoned.
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = Some(grace);
        self
    }

    /// Set the external interpreter binary.
    pub fn interpreter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter_path = Some(path.into());
        self
    }

    /// Set the wait bound for external runs.
    pub fn interpreter_timeout(mut self, timeout: Duration) -> Self {
        self.interpreter_timeout = Some(timeout);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            strategy: self.strategy.unwrap_or(default.strategy),
            max_memory: self.max_memory.unwrap_or(default.max_memory),
            hook_instruction_interval: self
                .hook_instruction_interval
                .unwrap_or(default.hook_instruction_interval),
            cancel_grace: self.cancel_grace.unwrap_or(default.cancel_grace),
            interpreter_path: self.interpreter_path.unwrap_or(default.interpreter_path),
            interpreter_timeout: self.interpreter_timeout.unwrap_or(default.interpreter_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(8));
        assert_eq!(config.strategy, ExecutionStrategy::InProcess);
        assert_eq!(config.max_memory, 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_secs(2))
            .strategy(ExecutionStrategy::External)
            .interpreter_path("/usr/bin/lua5.4")
            .interpreter_timeout(Duration::from_secs(5))
            .hook_instruction_interval(100)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.strategy, ExecutionStrategy::External);
        assert_eq!(config.interpreter_path, PathBuf::from("/usr/bin/lua5.4"));
        assert_eq!(config.interpreter_timeout, Duration::from_secs(5));
        assert_eq!(config.hook_instruction_interval, 100);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = SandboxConfig::builder().timeout(Duration::ZERO).build();
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));

        let config = SandboxConfig::builder().hook_instruction_interval(0).build();
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_huge_timeouts() {
        let config = SandboxConfig::builder().timeout(Duration::MAX).build();
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));

        let config = SandboxConfig::builder()
            .interpreter_timeout(MAX_TIMEOUT + Duration::from_secs(1))
            .build();
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));

        let config = SandboxConfig::builder().timeout(MAX_TIMEOUT).build();
        assert!(config.validate().is_ok());
    }
}
