//! Basic example of executing Lua code in the sandbox.
//!
//! Run with: cargo run --example basic_execution
//!
//! Set `RUST_LOG=lua_sandbox_rs=debug` to see the supervisor's logs.

use std::time::Duration;

use lua_sandbox_rs::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure the sandbox
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .max_memory(32 * 1024 * 1024) // 32MB
        .build();

    println!("Creating sandbox with config: {:?}", config);
    let sandbox = ScriptSandbox::new(config)?;

    // Execute simple arithmetic
    println!("\n=== Test 1: Simple arithmetic ===");
    match sandbox.execute("print(1 + 1) return 6 * 7", None).await {
        Ok(outcome) => {
            println!("prints: {:?}", outcome.prints());
            println!("result: {:?}", outcome.result);
            println!("duration: {:?}", outcome.elapsed);
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    // Walk the host API
    println!("\n=== Test 2: Host API ===");
    let code = r#"
for name, service in pairs(game) do
    if type(service) == "table" then
        print(name, service.Name)
    end
end
local v = Vector3.add(Vector3.create(1, 2, 3), Vector3.create(1, 1, 1))
print("vector", v.x, v.y, v.z)
"#;
    match sandbox.execute(code, None).await {
        Ok(outcome) => {
            for line in outcome.prints() {
                println!("  {}", line);
            }
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    // Test error handling
    println!("\n=== Test 3: Lua error ===");
    match sandbox.execute("print('before')\nerror('test error')", None).await {
        Ok(outcome) => {
            println!("success: {}", outcome.is_success());
            println!("error: {}", outcome.error.as_deref().unwrap_or(""));
            println!("trace events: {}", outcome.trace.len());
        }
        Err(e) => eprintln!("Execution error: {}", e),
    }

    // Full JSON document, as a front end would return it
    println!("\n=== Test 4: Serialized outcome ===");
    let outcome = sandbox.execute("print('hello')", None).await?;
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Serialization error: {}", e),
    }

    Ok(())
}
