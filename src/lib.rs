//! # Lua Sandbox
//!
//! Runs untrusted Lua-family scripts against a simulated host API and
//! analyzes their source without running it.
//!
//! A script can be executed two ways:
//!
//! - **In-process**: an embedded Lua 5.4 VM with a restricted global
//!   environment, an instruction-count hook for the time budget and a heap
//!   limit. Every interaction with the host API is recorded as a trace event.
//! - **External**: the system `lua` binary runs the script inside a generated
//!   harness that reports prints and errors on stdout/stderr. The wait for the
//!   process is bounded and the child is killed at the deadline.
//!
//! The static analyzers (escape decoding, string tables, suspicious patterns,
//! function signatures, metrics) are pure functions over source text.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lua_sandbox_rs::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SandboxConfig::builder()
//!         .timeout(Duration::from_secs(2))
//!         .max_memory(16 * 1024 * 1024)
//!         .build();
//!
//!     let sandbox = ScriptSandbox::new(config)?;
//!     let outcome = sandbox.execute("print(game.Workspace.Name)", None).await?;
//!
//!     assert!(outcome.is_success());
//!     assert_eq!(outcome.prints(), vec!["Workspace"]);
//!
//!     let record = analyze("local function add(a, b) return a + b end");
//!     assert_eq!(record.functions[0].parameters, vec!["a", "b"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Isolation
//!
//! In-process scripts see only the safe standard library (`string`, `table`,
//! `math`, `pcall` and friends), a frozen snapshot of the virtual `game` tree
//! and `Vector3`. `os`, `io`, `require`, `load` and `debug` are absent.

pub mod analysis;
pub mod error;
pub mod prelude;
pub mod request;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use analysis::{analyze, AnalysisRecord};
pub use error::{Result, SandboxError};
pub use request::{analyze_batch, analyze_upload, execute_request, AnalysisMode};
pub use sandbox::config::{ExecutionStrategy, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{ExecutionOutcome, ScriptSandbox};
pub use sandbox::session::SandboxSession;
pub use sandbox::trace::{TraceEvent, TraceKind, TraceRecorder};
