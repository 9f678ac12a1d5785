//! Transport-free request contracts.
//!
//! These types mirror what an upload or JSON front end hands to the engine.
//! The engine never sees HTTP; an adapter maps its payloads onto these.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{
    calculate_metrics, detect_patterns, extract_functions, extract_strings, find_string_tables,
    ContentMetrics, DecodedString, FunctionSignature, PatternMatch, StringTable,
};
use crate::error::{Result, SandboxError};
use crate::sandbox::config::{ExecutionStrategy, MAX_TIMEOUT};
use crate::sandbox::executor::{ExecutionOutcome, ScriptSandbox};

/// Timeout used when an execute request does not carry one.
pub const DEFAULT_TIMEOUT_SECS: f64 = 8.0;

/// Largest number of files accepted in one batch.
pub const MAX_BATCH_FILES: usize = 50;

/// Filename reported for uploads that did not declare one.
pub const DEFAULT_FILENAME: &str = "script.lua";

/// Which analyzers an upload request runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// String literals and string tables.
    Strings,
    Patterns,
    /// Metrics and function signatures.
    Metrics,
    /// Run the script in the external interpreter.
    Execute,
    #[default]
    Full,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Strings => "strings",
            AnalysisMode::Patterns => "patterns",
            AnalysisMode::Metrics => "metrics",
            AnalysisMode::Execute => "execute",
            AnalysisMode::Full => "full",
        }
    }

    fn includes(self, part: AnalysisMode) -> bool {
        self == AnalysisMode::Full || self == part
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strings" => Ok(AnalysisMode::Strings),
            "patterns" => Ok(AnalysisMode::Patterns),
            "metrics" => Ok(AnalysisMode::Metrics),
            "execute" => Ok(AnalysisMode::Execute),
            "full" | "" => Ok(AnalysisMode::Full),
            other => Err(SandboxError::MalformedInput(format!(
                "unknown analysis mode: {}",
                other
            ))),
        }
    }
}

/// Inline script text plus an optional timeout in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    fn timeout_duration(&self) -> Result<Duration> {
        let secs = self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        match Duration::try_from_secs_f64(secs) {
            Ok(d) if !d.is_zero() && d <= MAX_TIMEOUT => Ok(d),
            _ => Err(SandboxError::MalformedInput(format!(
                "timeout must be between 0 and {} seconds, got {}",
                MAX_TIMEOUT.as_secs(),
                secs
            ))),
        }
    }
}

/// Run an execute request on the sandbox's configured strategy.
pub async fn execute_request(
    sandbox: &ScriptSandbox,
    request: ExecuteRequest,
) -> Result<ExecutionOutcome> {
    let timeout = request.timeout_duration()?;
    let code = request
        .code
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| SandboxError::MalformedInput("No code provided".to_string()))?;

    sandbox.execute(code, Some(timeout)).await
}

/// An uploaded file, as received.
#[derive(Debug, Clone)]
pub struct ScriptUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ScriptUpload {
    /// Create an upload; a blank filename becomes [`DEFAULT_FILENAME`].
    pub fn new(filename: Option<&str>, bytes: impl Into<Vec<u8>>) -> Self {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILENAME);
        Self {
            filename: filename.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Content decoded as UTF-8, with invalid sequences replaced.
    pub fn content(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Per-category analyzer output; categories the mode skipped are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strings: Option<Vec<DecodedString>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_tables: Option<Vec<StringTable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ContentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionSignature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub filename: String,
    pub mode: AnalysisMode,
    pub results: AnalysisResults,
}

/// Analyze one uploaded file.
///
/// Execution, when the mode asks for it, always goes through the external
/// interpreter; a failed run is reported inside the outcome rather than as an
/// error.
pub async fn analyze_upload(
    sandbox: &ScriptSandbox,
    upload: ScriptUpload,
    mode: AnalysisMode,
) -> Result<AnalysisReport> {
    let content = upload.content();
    if content.trim().is_empty() {
        return Err(SandboxError::MalformedInput(
            "No code or file provided".to_string(),
        ));
    }
    debug!(filename = %upload.filename, %mode, bytes = upload.size(), "analyzing upload");

    let mut results = AnalysisResults::default();
    if mode.includes(AnalysisMode::Strings) {
        results.strings = Some(extract_strings(&content));
        results.string_tables = Some(find_string_tables(&content));
    }
    if mode.includes(AnalysisMode::Patterns) {
        results.patterns = Some(detect_patterns(&content));
    }
    if mode.includes(AnalysisMode::Metrics) {
        results.metrics = Some(calculate_metrics(&content));
        results.functions = Some(extract_functions(&content));
    }
    if mode.includes(AnalysisMode::Execute) {
        let outcome = sandbox
            .execute_with(ExecutionStrategy::External, &content, None)
            .await?;
        results.execution = Some(outcome);
    }

    Ok(AnalysisReport {
        filename: upload.filename,
        mode,
        results,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub filename: String,
    /// Size of the upload in bytes.
    pub size: usize,
    pub metrics: ContentMetrics,
    pub functions: Vec<FunctionSignature>,
    pub patterns: Vec<PatternMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub files_processed: usize,
    pub results: Vec<BatchEntry>,
}

/// Static analysis of up to [`MAX_BATCH_FILES`] uploads, one entry per file.
pub fn analyze_batch(uploads: Vec<ScriptUpload>) -> Result<BatchReport> {
    if uploads.is_empty() {
        return Err(SandboxError::MalformedInput("No files uploaded".to_string()));
    }
    if uploads.len() > MAX_BATCH_FILES {
        return Err(SandboxError::MalformedInput(format!(
            "too many files: {} (max {})",
            uploads.len(),
            MAX_BATCH_FILES
        )));
    }

    let results: Vec<BatchEntry> = uploads
        .into_iter()
        .map(|upload| {
            let content = upload.content();
            BatchEntry {
                size: upload.size(),
                metrics: calculate_metrics(&content),
                functions: extract_functions(&content),
                patterns: detect_patterns(&content),
                filename: upload.filename,
            }
        })
        .collect();

    debug!(files = results.len(), "batch analyzed");
    Ok(BatchReport {
        files_processed: results.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::SandboxConfig;

    fn sandbox() -> ScriptSandbox {
        ScriptSandbox::new(SandboxConfig::default()).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("strings".parse::<AnalysisMode>().unwrap(), AnalysisMode::Strings);
        assert_eq!("FULL".parse::<AnalysisMode>().unwrap(), AnalysisMode::Full);
        assert_eq!("".parse::<AnalysisMode>().unwrap(), AnalysisMode::Full);
        assert!("everything".parse::<AnalysisMode>().is_err());
        assert_eq!(AnalysisMode::default(), AnalysisMode::Full);
    }

    #[test]
    fn test_upload_defaults_and_lossy_decode() {
        let upload = ScriptUpload::new(None, vec![b'a', 0xff, b'b']);

        assert_eq!(upload.filename, "script.lua");
        assert_eq!(upload.content(), "a\u{fffd}b");
        assert_eq!(upload.size(), 3);
    }

    #[test]
    fn test_execute_request_validation() {
        let sandbox = sandbox();

        let missing = tokio_test::block_on(execute_request(&sandbox, ExecuteRequest::default()));
        assert!(matches!(missing, Err(SandboxError::MalformedInput(_))));

        let negative = ExecuteRequest::new("return 1").with_timeout(-1.0);
        let result = tokio_test::block_on(execute_request(&sandbox, negative));
        assert!(result.unwrap_err().is_malformed_input());
    }

    #[test]
    fn test_execute_request_rejects_huge_timeout() {
        let sandbox = sandbox();

        for seconds in [1e19, f64::INFINITY, MAX_TIMEOUT.as_secs_f64() + 1.0] {
            let request = ExecuteRequest::new("return 1").with_timeout(seconds);
            let result = tokio_test::block_on(execute_request(&sandbox, request));
            assert!(result.unwrap_err().is_malformed_input(), "accepted {}", seconds);
        }
    }

    #[tokio::test]
    async fn test_execute_request_runs_script() {
        let outcome = execute_request(&sandbox(), ExecuteRequest::new("print('ok')").with_timeout(2.0))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.prints(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_analyze_upload_respects_mode() {
        let upload = ScriptUpload::new(Some("t.lua"), "local t = {'a'}\nfunction f(x) end");
        let report = analyze_upload(&sandbox(), upload, AnalysisMode::Metrics)
            .await
            .unwrap();

        assert_eq!(report.filename, "t.lua");
        assert!(report.results.metrics.is_some());
        assert_eq!(report.results.functions.as_ref().unwrap().len(), 1);
        assert!(report.results.strings.is_none());
        assert!(report.results.patterns.is_none());
        assert!(report.results.execution.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "metrics");
        assert!(json["results"].get("strings").is_none());
    }

    #[tokio::test]
    async fn test_analyze_upload_rejects_empty_content() {
        let result = analyze_upload(&sandbox(), ScriptUpload::new(None, ""), AnalysisMode::Full).await;
        assert!(result.unwrap_err().is_malformed_input());
    }

    #[test]
    fn test_batch_entries_are_independent() {
        let body = "local function add(a, b) return a+b end\n";
        let report = analyze_batch(vec![
            ScriptUpload::new(Some("one.lua"), body),
            ScriptUpload::new(Some("two.lua"), body),
        ])
        .unwrap();

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].metrics, report.results[1].metrics);
        assert_eq!(report.results[0].functions, report.results[1].functions);
        assert_eq!(report.results[1].filename, "two.lua");
        assert_eq!(report.results[0].size, body.len());
    }

    #[test]
    fn test_batch_limits() {
        assert!(analyze_batch(Vec::new()).unwrap_err().is_malformed_input());

        let too_many = (0..=MAX_BATCH_FILES)
            .map(|i| ScriptUpload::new(Some(format!("{}.lua", i).as_str()), "x = 1"))
            .collect();
        assert!(analyze_batch(too_many).unwrap_err().is_malformed_input());
    }
}
