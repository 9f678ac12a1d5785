//! Example of concurrent Lua execution with a shared sandbox.
//!
//! Every execution gets its own VM, object graph and trace, so one
//! `ScriptSandbox` can serve many tasks at once.
//!
//! Run with: cargo run --example concurrent_execution

use std::sync::Arc;
use std::time::{Duration, Instant};

use lua_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== Concurrent Execution Example ===\n");

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(10))
        .max_memory(32 * 1024 * 1024)
        .build();
    let sandbox = Arc::new(ScriptSandbox::new(config)?);

    // Define some Lua tasks to run concurrently
    let tasks = vec![
        (
            "Task 1",
            "local s = 0 for i = 1, 100 do s = s + i * i end print(s)",
            "Sum of squares",
        ),
        (
            "Task 2",
            "local n = 0 for x = 0, 999 do if x % 3 == 0 then n = n + 1 end end print(n)",
            "Count divisible by 3",
        ),
        (
            "Task 3",
            "local t = {} for i = 0, 49 do t[#t + 1] = string.char(65 + i % 26) end print(table.concat(t))",
            "Generate letters",
        ),
        (
            "Task 4",
            "print(game.Workspace.Name, game.Players.Name)",
            "Read host services",
        ),
        (
            "Task 5",
            "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end print(fib(20))",
            "Fibonacci",
        ),
    ];

    let start = Instant::now();
    let mut handles = Vec::new();

    for (name, code, description) in tasks {
        let sandbox = Arc::clone(&sandbox);
        handles.push(tokio::spawn(async move {
            let task_start = Instant::now();
            let result = sandbox.execute(code, None).await;
            (name, description, result, task_start.elapsed())
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((name, description, Ok(outcome), elapsed)) => {
                println!(
                    "{} ({}): {:?} in {:?}",
                    name,
                    description,
                    outcome.prints(),
                    elapsed
                );
            }
            Ok((name, _, Err(e), _)) => eprintln!("{} failed: {}", name, e),
            Err(e) => eprintln!("task panicked: {}", e),
        }
    }

    println!("\nAll tasks finished in {:?}", start.elapsed());
    Ok(())
}
