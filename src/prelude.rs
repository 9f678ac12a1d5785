//! Prelude module for convenient imports.

pub use crate::analysis::{analyze, AnalysisRecord};
pub use crate::error::{Result, SandboxError};
pub use crate::request::{AnalysisMode, ExecuteRequest, ScriptUpload};
pub use crate::sandbox::{
    config::{ExecutionStrategy, SandboxConfig},
    executor::{ExecutionOutcome, ScriptSandbox},
    trace::{TraceEvent, TraceKind},
};
