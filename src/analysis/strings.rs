//! String literal and string-table extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::escapes::decode_escapes;

// Single-line quoted literals; a backslash escapes the next character.
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)'"#).expect("valid literal regex")
});

static LOCAL_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"local\s+(\w+)\s*=\s*\{([^}]+)\}").expect("valid table regex"));

static GLOBAL_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*=\s*\{([^}]+)\}").expect("valid table regex"));

static TABLE_CONSTRUCTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"table\.create.*?\{([^}]+)\}").expect("valid table regex"));

/// A quoted literal and its decoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedString {
    /// The literal as written, quotes included.
    pub original: String,
    /// The body with escapes decoded.
    pub decoded: String,
    /// Byte offset of the opening quote.
    pub position: usize,
}

/// Which lexical shape found a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableShape {
    Local,
    Global,
    Constructor,
}

/// A table body that contains at least one quote character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringTable {
    pub name: String,
    /// Text between the braces.
    pub content: String,
    pub shape: TableShape,
    pub position: usize,
}

/// Every quoted literal in `content`, decoded independently.
pub fn extract_strings(content: &str) -> Vec<DecodedString> {
    STRING_LITERAL
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1).or_else(|| caps.get(2))?;
            Some(DecodedString {
                original: whole.as_str().to_string(),
                decoded: decode_escapes(body.as_str()),
                position: whole.start(),
            })
        })
        .collect()
}

/// Tables that look like they hold literal strings.
///
/// Each shape is matched independently, so a `local` table is also reported
/// by the global shape. Results are grouped by shape, then ordered by offset.
pub fn find_string_tables(content: &str) -> Vec<StringTable> {
    let shapes: [(&Regex, TableShape); 3] = [
        (&LOCAL_TABLE, TableShape::Local),
        (&GLOBAL_TABLE, TableShape::Global),
        (&TABLE_CONSTRUCTOR, TableShape::Constructor),
    ];

    let mut tables = Vec::new();
    for (regex, shape) in shapes {
        for caps in regex.captures_iter(content) {
            let (name, body) = match shape {
                TableShape::Constructor => ("unnamed", caps.get(1)),
                _ => (caps.get(1).map_or("unnamed", |m| m.as_str()), caps.get(2)),
            };
            let Some(body) = body else { continue };
            if !body.as_str().contains(['"', '\'']) {
                continue;
            }
            tables.push(StringTable {
                name: name.to_string(),
                content: body.as_str().to_string(),
                shape,
                position: caps.get(0).map_or(0, |m| m.start()),
            });
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_strings_decodes_each_literal() {
        let strings = extract_strings(r#"local a = "x\tz" local b = 'it\'s' -- "\110""#);

        assert_eq!(strings.len(), 3);
        assert_eq!(strings[0].original, r#""x\tz""#);
        assert_eq!(strings[0].decoded, "x\tz");
        assert_eq!(strings[0].position, 10);
        assert_eq!(strings[1].decoded, "it's");
        assert_eq!(strings[2].decoded, "H");
    }

    #[test]
    fn test_local_table_reported_by_two_shapes() {
        let tables = find_string_tables(r#"local names = {"a", "b"}"#);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].shape, TableShape::Local);
        assert_eq!(tables[0].name, "names");
        assert_eq!(tables[0].content, r#""a", "b""#);
        assert_eq!(tables[1].shape, TableShape::Global);
        assert_eq!(tables[1].name, "names");
    }

    #[test]
    fn test_numeric_tables_skipped() {
        assert!(find_string_tables("local t = {1, 2, 3}\nv = {x = 1}").is_empty());
    }

    #[test]
    fn test_constructor_shape_is_unnamed() {
        let tables = find_string_tables("table.create(3, {'k'})");

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].shape, TableShape::Constructor);
        assert_eq!(tables[0].name, "unnamed");
        assert_eq!(tables[0].content, "'k'");
    }
}
