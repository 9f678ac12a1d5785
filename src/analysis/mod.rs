//! Static analyzers.
//!
//! Every analyzer is a pure function of the source text. Regex catalogs are
//! compiled once and shared between threads.

pub mod escapes;
pub mod functions;
pub mod metrics;
pub mod patterns;
pub mod strings;

use serde::{Deserialize, Serialize};

pub use escapes::decode_escapes;
pub use functions::{extract_functions, FunctionShape, FunctionSignature};
pub use metrics::{calculate_metrics, ContentMetrics};
pub use patterns::{detect_patterns, PatternKind, PatternMatch};
pub use strings::{extract_strings, find_string_tables, DecodedString, StringTable, TableShape};

/// Output of every analyzer over one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub strings: Vec<DecodedString>,
    pub string_tables: Vec<StringTable>,
    pub patterns: Vec<PatternMatch>,
    pub functions: Vec<FunctionSignature>,
    pub metrics: ContentMetrics,
}

/// Run the full analyzer suite.
pub fn analyze(content: &str) -> AnalysisRecord {
    AnalysisRecord {
        strings: extract_strings(content),
        string_tables: find_string_tables(content),
        patterns: detect_patterns(content),
        functions: extract_functions(content),
        metrics: calculate_metrics(content),
    }
}
