//! Suspicious-pattern detection over raw source text.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches must be longer than this many characters to be reported.
pub const MIN_MATCH_LEN: usize = 6;

/// Name of the signature that produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Base64,
    Hex,
    ObfuscatedCall,
    EncodedArray,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Base64 => "base64",
            PatternKind::Hex => "hex",
            PatternKind::ObfuscatedCall => "obfuscated_call",
            PatternKind::EncodedArray => "encoded_array",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signature hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    #[serde(rename = "match")]
    pub matched: String,
    pub position: usize,
}

static SIGNATURES: LazyLock<Vec<(PatternKind, Regex)>> = LazyLock::new(|| {
    [
        (PatternKind::Base64, r"[A-Za-z0-9+/]+={0,2}"),
        (PatternKind::Hex, r"[0-9A-Fa-f]{8,}"),
        (PatternKind::ObfuscatedCall, r"\w+\([^)]*\)"),
        (PatternKind::EncodedArray, r"\[[^\]]+\]"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid signature regex")))
    .collect()
});

/// Run every signature over `content`.
///
/// Hits are grouped by signature in catalog order. Overlaps between
/// signatures are all reported.
pub fn detect_patterns(content: &str) -> Vec<PatternMatch> {
    SIGNATURES
        .iter()
        .flat_map(|(kind, regex)| {
            regex
                .find_iter(content)
                .filter(|m| m.as_str().chars().count() > MIN_MATCH_LEN)
                .map(move |m| PatternMatch {
                    kind: *kind,
                    matched: m.as_str().to_string(),
                    position: m.start(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_run_reported_once() {
        let hits = detect_patterns("QUJDREVGMTIzNDU2Nzg5MA==");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, PatternKind::Base64);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].matched, "QUJDREVGMTIzNDU2Nzg5MA==");
    }

    #[test]
    fn test_short_matches_dropped() {
        assert!(detect_patterns("x = f(a)").is_empty());
    }

    #[test]
    fn test_match_length_counts_characters() {
        // Five characters, eight bytes.
        assert!(detect_patterns("[ééé]").is_empty());

        let hits = detect_patterns("[ééééé]x");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, PatternKind::EncodedArray);
        assert_eq!(hits[0].matched, "[ééééé]");
    }

    #[test]
    fn test_overlapping_signatures_all_reported() {
        let hits = detect_patterns("deadbeef00");
        let kinds: Vec<_> = hits.iter().map(|h| h.kind).collect();

        assert_eq!(kinds, vec![PatternKind::Base64, PatternKind::Hex]);
    }

    #[test]
    fn test_call_and_array_shapes() {
        let hits = detect_patterns("loadstring(payload) t[index + 1]");

        assert!(hits
            .iter()
            .any(|h| h.kind == PatternKind::ObfuscatedCall && h.matched == "loadstring(payload)"));
        assert!(hits
            .iter()
            .any(|h| h.kind == PatternKind::EncodedArray && h.matched == "[index + 1]"));
    }

    #[test]
    fn test_serialized_field_names() {
        let hit = PatternMatch {
            kind: PatternKind::ObfuscatedCall,
            matched: "call(x)".to_string(),
            position: 3,
        };
        let value = serde_json::to_value(&hit).unwrap();

        assert_eq!(value["type"], "obfuscated_call");
        assert_eq!(value["match"], "call(x)");
        assert_eq!(value["position"], 3);
    }
}
