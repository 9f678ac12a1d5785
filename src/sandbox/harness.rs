//! Harness source wrapped around scripts sent to an external interpreter.
//!
//! The harness replaces `print` with a function that emits
//! `[ANALYSIS] PRINT: <args>` lines, runs the script under `xpcall`, and ends
//! with an `[ANALYSIS] COMPLETION: ...` line carrying the CPU time spent.

use serde::{Deserialize, Serialize};

/// Prefix of every structured line the harness writes to stdout.
pub const ANALYSIS_PREFIX: &str = "[ANALYSIS] ";

/// One structured `[ANALYSIS] <event>: <data>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisLine {
    pub event: String,
    pub data: String,
}

/// Smallest long-bracket level whose closing bracket does not occur in `code`.
fn long_bracket_level(code: &str) -> usize {
    (0..)
        .find(|level| !code.contains(&format!("]{}]", "=".repeat(*level))))
        .unwrap_or(0)
}

/// Embed `code` in a Lua long-string literal it cannot terminate.
fn quote_long(code: &str) -> String {
    let eq = "=".repeat(long_bracket_level(code));
    // Lua drops the newline right after the opening bracket, so line numbers are preserved.
    format!("[{eq}[\n{code}\n]{eq}]")
}

/// Generate the harness for `code`.
pub fn generate_harness(code: &str, mode: &str) -> String {
    format!(
        r##"local __analysis_mode = "{mode}"
local __start_time = os.clock()
local __write, __format, __tostring, __concat, __select = io.write, string.format, tostring, table.concat, select

local function __log_event(event_type, data)
    __write(__format("[ANALYSIS] %s: %s\n", event_type, data))
end

print = function(...)
    local parts = {{}}
    for i = 1, __select("#", ...) do
        parts[i] = __tostring((__select(i, ...)))
    end
    __log_event("PRINT", __concat(parts, "\t"))
end

local __chunk, __load_err = load({source}, "=script")
if not __chunk then
    io.stderr:write(__tostring(__load_err), "\n")
    os.exit(1)
end

local __ok, __err = xpcall(__chunk, debug.traceback)
if not __ok then
    io.stderr:write(__tostring(__err), "\n")
    os.exit(1)
end

__log_event("COMPLETION", __format("Execution time: %.3f seconds", os.clock() - __start_time))
"##,
        mode = mode.replace(['"', '\\', '\n'], ""),
        source = quote_long(code),
    )
}

/// Extract the structured lines from harness stdout.
pub fn parse_analysis_lines(stdout: &str) -> Vec<AnalysisLine> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix(ANALYSIS_PREFIX))
        .filter_map(|rest| {
            let (event, data) = rest.split_once(": ").unwrap_or((rest.trim_end_matches(':'), ""));
            if event.is_empty() {
                return None;
            }
            Some(AnalysisLine {
                event: event.to_string(),
                data: data.to_string(),
            })
        })
        .collect()
}
