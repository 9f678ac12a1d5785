//! Example demonstrating error handling patterns.
//!
//! This example shows how each kind of failure surfaces:
//! - Lua runtime errors
//! - Syntax errors
//! - Timeouts
//! - Memory limits
//! - Malformed input and configuration errors
//!
//! Run with: cargo run --example error_handling

use std::time::Duration;

use lua_sandbox_rs::error::parse_lua_error;
use lua_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== Error Handling Example ===\n");

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .max_memory(8 * 1024 * 1024)
        .build();
    let sandbox = ScriptSandbox::new(config)?;

    let cases = [
        ("Runtime error", "local t = nil\nreturn t.field"),
        ("Syntax error", "local = 1"),
        ("Explicit error", "error({ code = 42 })"),
        (
            "Memory limit",
            "local t = {} for i = 1, 1e8 do t[i] = string.rep('x', 1024) .. i end",
        ),
    ];

    for (i, (label, code)) in cases.iter().enumerate() {
        println!("--- Test {}: {} ---", i + 1, label);
        let outcome = sandbox.execute(code, None).await?;
        println!("success: {}", outcome.is_success());
        if let Some(error) = &outcome.error {
            println!("error: {}", error);
        }
        if let Some(last) = outcome.trace.last() {
            println!("error event: {}", last.payload);
        }
        println!();
    }

    println!("--- Test 5: Timeout ---");
    let outcome = sandbox
        .execute("while true do end", Some(Duration::from_millis(250)))
        .await?;
    println!("error: {}\n", outcome.error.unwrap_or_default());

    println!("--- Test 6: Malformed input ---");
    match sandbox.execute("   ", None).await {
        Err(e) if e.is_malformed_input() => println!("rejected: {}\n", e),
        other => println!("unexpected: {:?}\n", other.map(|o| o.succeeded)),
    }

    println!("--- Test 7: Invalid configuration ---");
    let invalid = SandboxConfig::builder().timeout(Duration::ZERO).build();
    match ScriptSandbox::new(invalid) {
        Err(e) => println!("rejected: {}\n", e),
        Ok(_) => println!("unexpectedly accepted\n"),
    }

    println!("--- Test 8: Parsing interpreter stderr ---");
    let stderr = "lua: script:3: attempt to index a nil value (local 't')\nstack traceback:\n\t[C]: in ?";
    if let Some(SandboxError::Script { chunk, line, message, traceback }) = parse_lua_error(stderr) {
        println!("chunk: {:?}", chunk);
        println!("line: {:?}", line);
        println!("message: {}", message);
        println!("has traceback: {}", traceback.is_some());
    }

    Ok(())
}
