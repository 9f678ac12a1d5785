//! Example of the static analyzers, run on a file or a built-in sample.
//!
//! Run with: cargo run --example static_analysis [path/to/script.lua]

use lua_sandbox_rs::analysis::TableShape;
use lua_sandbox_rs::prelude::*;
use lua_sandbox_rs::request::analyze_batch;

const SAMPLE: &str = r#"local k = {"\154\157\141\144", "\x73\x74\x72\x69\x6e\x67"}
local blob = "QUJDREVGMTIzNDU2Nzg5MA=="
local function decode(s, key)
    return s:gsub(".", function(c) return c end)
end
Remote.fire = function(name, ...)
    return getfenv()[k[1]](blob)
end
"#;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let (filename, bytes) = match std::env::args().nth(1) {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            (path, bytes)
        }
        None => ("sample.lua".to_string(), SAMPLE.as_bytes().to_vec()),
    };
    let upload = ScriptUpload::new(Some(filename.as_str()), bytes);
    let record = analyze(&upload.content());

    println!("=== {} ===\n", upload.filename);

    println!("--- Decoded strings ---");
    for s in &record.strings {
        println!("{:>6}  {} -> {:?}", s.position, s.original, s.decoded);
    }

    println!("\n--- String tables ---");
    for t in &record.string_tables {
        let shape = match t.shape {
            TableShape::Local => "local",
            TableShape::Global => "global",
            TableShape::Constructor => "constructor",
        };
        println!("{:>6}  {} ({}): {}", t.position, t.name, shape, t.content);
    }

    println!("\n--- Patterns ---");
    for p in &record.patterns {
        println!("{:>6}  {:<16} {}", p.position, p.kind.as_str(), p.matched);
    }

    println!("\n--- Functions ---");
    for f in &record.functions {
        println!("{:>6}  {}({})", f.position, f.name, f.parameters.join(", "));
    }

    println!("\n--- Metrics ---");
    let m = &record.metrics;
    println!(
        "lines: {}  chars: {}  functions: {}",
        m.line_count, m.char_count, m.function_count
    );
    println!("avg line length: {:.2}", m.avg_line_length);
    println!("md5:    {}", m.md5);
    println!("sha256: {}", m.sha256);

    let batch = analyze_batch(vec![upload.clone(), upload])?;
    println!(
        "\nbatch of {} identical files agrees: {}",
        batch.files_processed,
        batch.results[0].metrics == batch.results[1].metrics
    );

    Ok(())
}
