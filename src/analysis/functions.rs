//! Function-signature extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// `local` is optional so a local definition is matched exactly once.
static NAMED_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(local\s+)?function\s+(\w+(?:[.:]\w+)*)\s*\(([^)]*)\)")
        .expect("valid function regex")
});

static ASSIGNED_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+(?:[.:]\w+)*)\s*=\s*function\s*\(([^)]*)\)").expect("valid function regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionShape {
    /// `function name(..)`
    Global,
    /// `local function name(..)`
    Local,
    /// `name = function(..)`
    Assignment,
}

/// A function definition found in source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    #[serde(rename = "params")]
    pub parameters: Vec<String>,
    /// The matched text, from `function`/name through the closing paren.
    #[serde(rename = "full_match")]
    pub signature: String,
    pub shape: FunctionShape,
    pub position: usize,
}

/// Every function definition in `content`, ordered by offset.
pub fn extract_functions(content: &str) -> Vec<FunctionSignature> {
    let named = NAMED_FUNCTION.captures_iter(content).filter_map(|caps| {
        let whole = caps.get(0)?;
        let shape = if caps.get(1).is_some() {
            FunctionShape::Local
        } else {
            FunctionShape::Global
        };
        Some(FunctionSignature {
            name: caps.get(2)?.as_str().to_string(),
            parameters: split_parameters(caps.get(3).map_or("", |m| m.as_str())),
            signature: whole.as_str().to_string(),
            shape,
            position: whole.start(),
        })
    });

    let assigned = ASSIGNED_FUNCTION.captures_iter(content).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(FunctionSignature {
            name: caps.get(1)?.as_str().to_string(),
            parameters: split_parameters(caps.get(2).map_or("", |m| m.as_str())),
            signature: whole.as_str().to_string(),
            shape: FunctionShape::Assignment,
            position: whole.start(),
        })
    });

    let mut functions: Vec<_> = named.chain(assigned).collect();
    functions.sort_by_key(|f| f.position);
    functions
}

fn split_parameters(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
