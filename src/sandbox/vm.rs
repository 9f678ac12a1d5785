//! In-process Lua execution with a restricted, traced environment.

use mlua::{Function, Lua, LuaSerdeExt, MultiValue, Table, Value, Variadic};
use serde_json::json;

use crate::error::{parse_lua_error, Result, SandboxError};
use crate::sandbox::limits::{apply_memory_limit, ExecutionGuard};
use crate::sandbox::trace::{SharedTrace, TraceKind};
use crate::sandbox::vector::Vec3;

/// Chunk name used in error messages (`script:<line>: ...`).
pub const CHUNK_NAME: &str = "script";

/// Side-effect-free globals copied into the script environment.
const SAFE_GLOBALS: &[&str] = &[
    "string", "table", "math", "utf8", "pairs", "ipairs", "next", "select", "type", "tostring",
    "tonumber", "pcall", "xpcall", "error", "assert", "unpack", "rawlen",
];

/// Tables nested deeper than this render the whole result through `tostring`.
const MAX_RESULT_DEPTH: usize = 128;

/// Values visited while converting one result before giving up on JSON.
const MAX_RESULT_NODES: usize = 100_000;

/// Worst-case matcher steps one `find`/`match`/`gmatch`/`gsub` call may take.
/// Those run inside C where the instruction hook cannot interrupt them.
const MAX_PATTERN_STEPS: f64 = 5e8;

/// Settings for a single in-process run.
#[derive(Debug, Clone)]
pub struct VmOptions {
    pub max_memory: usize,
}

/// Run `code` to completion or until `guard` stops it.
///
/// Prints are written to `trace` as they happen, so they survive a failure.
/// Returns the chunk's first return value as JSON.
pub fn run_chunk(
    code: &str,
    root: &serde_json::Value,
    trace: &SharedTrace,
    guard: &ExecutionGuard,
    options: &VmOptions,
) -> Result<serde_json::Value> {
    let lua = Lua::new();
    apply_memory_limit(&lua, options.max_memory)
        .map_err(|e| SandboxError::RuntimeInit(anyhow::anyhow!("failed to set memory limit: {}", e)))?;

    let env = build_environment(&lua, root, trace, guard)
        .map_err(|e| SandboxError::RuntimeInit(anyhow::anyhow!("failed to build environment: {}", e)))?;

    let chunk = lua
        .load(code)
        .set_name(format!("={}", CHUNK_NAME))
        .set_environment(env);

    guard.install(&lua);
    let outcome = chunk.eval::<MultiValue>();
    lua.remove_hook();

    match outcome {
        Ok(values) => {
            let first = values.into_iter().next().unwrap_or(Value::Nil);
            Ok(value_to_json(first))
        }
        Err(_) if guard.timed_out() => Err(SandboxError::Timeout(guard.timeout())),
        Err(e) => Err(classify_error(e)),
    }
}

/// Map an mlua error to the sandbox taxonomy.
fn classify_error(error: mlua::Error) -> SandboxError {
    match error {
        mlua::Error::SyntaxError { message, .. } => SandboxError::Syntax { message },
        mlua::Error::MemoryError(message) => SandboxError::MemoryLimitExceeded(message),
        mlua::Error::CallbackError { cause, .. } => classify_error((*cause).clone()),
        mlua::Error::RuntimeError(message) => script_error(message),
        other => script_error(other.to_string()),
    }
}

fn script_error(message: String) -> SandboxError {
    parse_lua_error(&message).unwrap_or(SandboxError::Script {
        chunk: None,
        line: None,
        message,
        traceback: None,
    })
}

/// Convert a Lua value to JSON, falling back to its string rendering.
///
/// Functions, userdata, cycles and tables past [`MAX_RESULT_DEPTH`] cannot be
/// represented, so the whole value is rendered with `tostring` instead.
fn value_to_json(value: Value) -> serde_json::Value {
    let mut budget = MAX_RESULT_NODES;
    match to_json(&value, 0, &mut budget) {
        Some(json) => json,
        None => match value.to_string() {
            Ok(text) => serde_json::Value::String(text),
            Err(_) => serde_json::Value::String(value.type_name().to_string()),
        },
    }
}

fn to_json(value: &Value, depth: usize, budget: &mut usize) -> Option<serde_json::Value> {
    *budget = budget.checked_sub(1)?;
    match value {
        Value::Nil => Some(serde_json::Value::Null),
        Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        Value::Integer(i) => Some(serde_json::Value::from(*i)),
        Value::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
        Value::String(s) => Some(serde_json::Value::String(String::from(s.to_string_lossy()))),
        Value::Table(table) if depth < MAX_RESULT_DEPTH => table_to_json(table, depth + 1, budget),
        _ => None,
    }
}

/// Sequences `{1..n}` become arrays; anything else becomes an object keyed by
/// the stringified keys.
fn table_to_json(table: &Table, depth: usize, budget: &mut usize) -> Option<serde_json::Value> {
    let mut entries = Vec::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) = pair.ok()?;
        let json = to_json(&value, depth, budget)?;
        entries.push((key, json));
    }

    let len = entries.len() as i64;
    let is_sequence = len > 0
        && entries
            .iter()
            .all(|(key, _)| matches!(key, Value::Integer(i) if (1..=len).contains(i)));
    if is_sequence {
        entries.sort_by_key(|(key, _)| match key {
            Value::Integer(i) => *i,
            _ => 0,
        });
        return Some(serde_json::Value::Array(
            entries.into_iter().map(|(_, json)| json).collect(),
        ));
    }

    let mut object = serde_json::Map::with_capacity(entries.len());
    for (key, json) in entries {
        let name = match key {
            Value::String(s) => String::from(s.to_string_lossy()),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => return None,
        };
        object.insert(name, json);
    }
    Some(serde_json::Value::Object(object))
}

/// Replace the pattern-matching functions of the `string` library with
/// versions that refuse calls whose worst case exceeds [`MAX_PATTERN_STEPS`].
///
/// The library table is shared with the string metatable, so `s:find(..)`
/// goes through the checked versions too.
fn limit_pattern_functions(lua: &Lua) -> mlua::Result<()> {
    let string: Table = lua.globals().get("string")?;
    for name in ["find", "match", "gmatch", "gsub"] {
        let original: Function = string.get(name)?;
        let checked = lua.create_function(move |_, args: MultiValue| {
            check_pattern_cost(name, &args)?;
            original.call::<MultiValue>(args)
        })?;
        string.set(name, checked)?;
    }
    Ok(())
}

fn check_pattern_cost(name: &str, args: &MultiValue) -> mlua::Result<()> {
    let mut args = args.iter();
    let (Some(Value::String(subject)), Some(Value::String(pattern))) = (args.next(), args.next())
    else {
        return Ok(());
    };
    // string.find(s, p, init, plain)
    let plain = name == "find"
        && args
            .nth(1)
            .is_some_and(|v| !matches!(v, Value::Nil | Value::Boolean(false)));
    if plain {
        return Ok(());
    }

    let length = subject.as_bytes().len();
    if pattern_steps(length, &pattern.as_bytes()) > MAX_PATTERN_STEPS {
        return Err(mlua::Error::RuntimeError(format!(
            "{}: pattern too complex for a {}-byte subject",
            name, length
        )));
    }
    Ok(())
}

/// Upper bound on backtracking steps for `pattern` over `length` bytes.
///
/// Each repetition item (`*`, `+`, `-`) can try every split of the remaining
/// input, which gives `C(length + repetitions, repetitions)` per start
/// position. Unanchored patterns retry from every position.
fn pattern_steps(length: usize, pattern: &[u8]) -> f64 {
    let (anchored, repetitions) = pattern_shape(pattern);
    let n = length as f64;
    let per_start = (1..=repetitions).fold(1.0, |acc, k| acc * (n + k as f64) / k as f64);
    if anchored {
        per_start
    } else {
        per_start * (n + 1.0)
    }
}

fn pattern_shape(pattern: &[u8]) -> (bool, usize) {
    let anchored = pattern.first() == Some(&b'^');
    let mut i = usize::from(anchored);
    let mut repetitions = 0;
    while i < pattern.len() {
        i = match pattern[i] {
            b'(' | b')' => {
                i += 1;
                continue;
            }
            b'%' => match pattern.get(i + 1) {
                Some(b'b') => i + 4,
                Some(b'f') => skip_set(pattern, i + 2),
                _ => i + 2,
            },
            b'[' => skip_set(pattern, i),
            _ => i + 1,
        };
        if matches!(pattern.get(i), Some(b'*' | b'+' | b'-')) {
            repetitions += 1;
            i += 1;
        }
    }
    (anchored, repetitions)
}

/// Index just past the `[...]` set starting at `start`.
fn skip_set(pattern: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    // A leading `]` is a member, not the terminator.
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

// Protected calls must not swallow the deadline error, or a script could
// spin in `while true do pcall(f) end` forever.
const GUARDED_PCALL: &str = r#"
local pcall, xpcall, error, stopped = pcall, xpcall, error, ...
local function check(ok, ...)
    if not ok and stopped() then error((...), 0) end
    return ok, ...
end
return function(f, ...) return check(pcall(f, ...)) end,
    function(f, handler, ...) return check(xpcall(f, handler, ...)) end
"#;

fn build_environment(
    lua: &Lua,
    root: &serde_json::Value,
    trace: &SharedTrace,
    guard: &ExecutionGuard,
) -> mlua::Result<Table> {
    limit_pattern_functions(lua)?;

    let globals = lua.globals();
    let env = lua.create_table()?;
    for name in SAFE_GLOBALS {
        env.set(*name, globals.get::<Value>(*name)?)?;
    }
    env.set("_G", env.clone())?;

    let watched = guard.clone();
    let stopped = lua.create_function(move |_, ()| Ok(watched.timed_out()))?;
    let (pcall, xpcall): (Function, Function) =
        lua.load(GUARDED_PCALL).set_name("=guard").call(stopped)?;
    env.set("pcall", pcall)?;
    env.set("xpcall", xpcall)?;

    env.set("print", create_print(lua, trace.clone())?)?;

    let game = lua.to_value(root)?;
    env.set("game", freeze(lua, game)?)?;

    env.set("Vector3", create_vector_library(lua)?)?;
    Ok(env)
}

/// `print` forwards its tab-joined arguments to the trace.
fn create_print(lua: &Lua, trace: SharedTrace) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: Variadic<Value>| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args.iter() {
            parts.push(tostring.call::<String>(arg.clone())?);
        }
        let message = parts.join("\t");
        trace.record(
            TraceKind::PrintOutput,
            json!({ "args": parts, "message": message }),
        );
        Ok(())
    })
}

/// Wrap tables in read-only proxies, recursively.
fn freeze(lua: &Lua, value: Value) -> mlua::Result<Value> {
    let Value::Table(table) = value else {
        return Ok(value);
    };

    let frozen = lua.create_table()?;
    for pair in table.pairs::<Value, Value>() {
        let (key, inner) = pair?;
        frozen.raw_set(key, freeze(lua, inner)?)?;
    }

    let proxy = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.set("__index", frozen.clone())?;
    meta.set(
        "__newindex",
        lua.create_function(|_, (_, key): (Value, Value)| -> mlua::Result<()> {
            Err(mlua::Error::RuntimeError(format!(
                "attempt to modify read-only host object (key '{}')",
                key.to_string().unwrap_or_default()
            )))
        })?,
    )?;
    let next: Function = lua.globals().get("next")?;
    meta.set(
        "__pairs",
        lua.create_function(move |_, _: Value| Ok((next.clone(), frozen.clone(), Value::Nil)))?,
    )?;
    meta.set("__metatable", false)?;
    let setmetatable: Function = lua.globals().get("setmetatable")?;
    setmetatable.call::<()>((proxy.clone(), meta))?;
    Ok(Value::Table(proxy))
}

fn vec3_from_table(table: &Table) -> mlua::Result<Vec3> {
    Ok(Vec3::new(
        table.get::<Option<f64>>("x")?.unwrap_or(0.0),
        table.get::<Option<f64>>("y")?.unwrap_or(0.0),
        table.get::<Option<f64>>("z")?.unwrap_or(0.0),
    ))
}

fn vec3_to_table(lua: &Lua, v: Vec3) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("x", v.x)?;
    table.set("y", v.y)?;
    table.set("z", v.z)?;
    table.set("magnitude", v.magnitude())?;
    Ok(table)
}

/// `Vector3.create/add/dot`. Pure and untraced.
fn create_vector_library(lua: &Lua) -> mlua::Result<Table> {
    let lib = lua.create_table()?;
    lib.set(
        "create",
        lua.create_function(|lua, (x, y, z): (Option<f64>, Option<f64>, Option<f64>)| {
            vec3_to_table(
                lua,
                Vec3::new(x.unwrap_or(0.0), y.unwrap_or(0.0), z.unwrap_or(0.0)),
            )
        })?,
    )?;
    lib.set(
        "add",
        lua.create_function(|lua, (a, b): (Table, Table)| {
            vec3_to_table(lua, vec3_from_table(&a)?.add(&vec3_from_table(&b)?))
        })?,
    )?;
    lib.set(
        "dot",
        lua.create_function(|_, (a, b): (Table, Table)| {
            Ok(vec3_from_table(&a)?.dot(&vec3_from_table(&b)?))
        })?,
    )?;
    Ok(lib)
}
