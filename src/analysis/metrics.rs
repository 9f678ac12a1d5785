//! Size, line and digest metrics for a script.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::analysis::functions::extract_functions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetrics {
    /// Lines after splitting on `\n`; a trailing newline adds an empty line.
    pub line_count: usize,
    /// Unicode scalar values.
    pub char_count: usize,
    pub function_count: usize,
    #[serde(rename = "content_hash_md5")]
    pub md5: String,
    #[serde(rename = "content_hash_sha256")]
    pub sha256: String,
    /// Mean characters per line, 0.0 when there are no lines.
    pub avg_line_length: f64,
}

pub fn calculate_metrics(content: &str) -> ContentMetrics {
    let lines: Vec<&str> = if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    };

    let line_chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    let avg_line_length = if lines.is_empty() {
        warn!("empty content; average line length reported as 0");
        0.0
    } else {
        line_chars as f64 / lines.len() as f64
    };

    ContentMetrics {
        line_count: lines.len(),
        char_count: content.chars().count(),
        function_count: extract_functions(content).len(),
        md5: format!("{:x}", Md5::digest(content.as_bytes())),
        sha256: format!("{:x}", Sha256::digest(content.as_bytes())),
        avg_line_length,
    }
}
