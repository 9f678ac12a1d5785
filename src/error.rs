//! Error types for the Lua sandbox.

use thiserror::Error;

/// Errors that can occur during sandbox execution or analysis.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The execution exceeded the configured timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The script exceeded the Lua heap limit.
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    /// The script failed to compile.
    #[error("syntax error: {message}")]
    Syntax {
        /// The compiler message, including the chunk name and line.
        message: String,
    },

    /// A Lua error was raised while the script was running.
    #[error("{}", format_script_error(.chunk, .line, .message))]
    Script {
        /// The chunk name the error was reported against (e.g. "script").
        chunk: Option<String>,
        /// The line number, if the message carried one.
        line: Option<u32>,
        /// The error message without the location prefix.
        message: String,
        /// The Lua stack traceback, if available.
        traceback: Option<String>,
    },

    /// The external interpreter exited with a non-zero status.
    #[error("interpreter exited with code {exit_code}: {stderr}")]
    InterpreterProcess {
        /// Exit code of the process (synthetic when it never ran).
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The external interpreter binary could not be started.
    #[error("Lua interpreter not found: {0}")]
    InterpreterNotFound(String),

    /// The request carried no script text or file content.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The execution task failed outside the script (e.g. it panicked).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Failed to set up the Lua runtime or its environment.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while talking to the interpreter process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Short machine-readable label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Timeout(_) => "timeout",
            SandboxError::MemoryLimitExceeded(_) => "memory_limit",
            SandboxError::Syntax { .. } => "syntax",
            SandboxError::Script { .. } => "runtime",
            SandboxError::InterpreterProcess { .. } | SandboxError::InterpreterNotFound(_) => {
                "interpreter"
            }
            SandboxError::MalformedInput(_) => "malformed_input",
            SandboxError::Config(_) => "config",
            SandboxError::ExecutionFailed(_) | SandboxError::RuntimeInit(_) | SandboxError::Io(_) => {
                "internal"
            }
        }
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents a memory limit exceeded.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, SandboxError::MemoryLimitExceeded(_))
    }

    /// Check if this error was raised by the script itself.
    pub fn is_script_error(&self) -> bool {
        matches!(self, SandboxError::Script { .. } | SandboxError::Syntax { .. })
    }

    /// Check if this error rejects the request input.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, SandboxError::MalformedInput(_))
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

fn format_script_error(chunk: &Option<String>, line: &Option<u32>, message: &str) -> String {
    match (chunk, line) {
        (Some(chunk), Some(line)) => format!("{}:{}: {}", chunk, line, message),
        (Some(chunk), None) => format!("{}: {}", chunk, message),
        _ => message.to_string(),
    }
}

/// Parse a Lua error from interpreter stderr or an error message.
///
/// Understands the stock `lua` front-end format
/// (`lua: chunk:line: message` followed by `stack traceback:`) as well as the
/// bare `chunk:line: message` form produced by the harness and by `mlua`.
pub fn parse_lua_error(stderr: &str) -> Option<SandboxError> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (head, traceback) = match trimmed.find("stack traceback:") {
        Some(idx) => (
            trimmed[..idx].trim_end(),
            Some(trimmed[idx..].trim_end().to_string()),
        ),
        None => (trimmed, None),
    };

    let first_line = head.lines().next()?.trim();
    let first_line = first_line.strip_prefix("lua:").map(str::trim).unwrap_or(first_line);
    // Everything after the first line belongs to a multi-line message.
    let rest: Vec<&str> = head.lines().skip(1).collect();

    let (chunk, line, message) = split_location(first_line);
    let message = if rest.is_empty() {
        message.to_string()
    } else {
        format!("{}\n{}", message, rest.join("\n"))
    };

    Some(SandboxError::Script {
        chunk,
        line,
        message,
        traceback,
    })
}

/// Split `chunk:line: message` into its parts.
fn split_location(text: &str) -> (Option<String>, Option<u32>, &str) {
    let mut parts = text.splitn(3, ':');
    let (Some(chunk), Some(line), Some(message)) = (parts.next(), parts.next(), parts.next())
    else {
        return (None, None, text);
    };

    match line.trim().parse::<u32>() {
        Ok(line) if !chunk.is_empty() && !chunk.contains(' ') || chunk.starts_with("[string") => {
            (Some(chunk.to_string()), Some(line), message.trim_start())
        }
        _ => (None, None, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_located_error() {
        let result = parse_lua_error("script:3: attempt to call a nil value (global 'foo')");

        if let Some(SandboxError::Script {
            chunk,
            line,
            message,
            traceback,
        }) = result
        {
            assert_eq!(chunk.as_deref(), Some("script"));
            assert_eq!(line, Some(3));
            assert_eq!(message, "attempt to call a nil value (global 'foo')");
            assert!(traceback.is_none());
        } else {
            panic!("Expected Script error");
        }
    }

    #[test]
    fn test_parse_interpreter_stderr_with_traceback() {
        let stderr = "lua: script:1: boom\nstack traceback:\n\t[C]: in function 'error'\n\tscript:1: in main chunk";
        let result = parse_lua_error(stderr);

        if let Some(SandboxError::Script {
            line,
            message,
            traceback,
            ..
        }) = result
        {
            assert_eq!(line, Some(1));
            assert_eq!(message, "boom");
            assert!(traceback.unwrap().starts_with("stack traceback:"));
        } else {
            panic!("Expected Script error");
        }
    }

    #[test]
    fn test_parse_unlocated_error() {
        let result = parse_lua_error("not enough memory");

        if let Some(SandboxError::Script { chunk, line, message, .. }) = result {
            assert!(chunk.is_none());
            assert!(line.is_none());
            assert_eq!(message, "not enough memory");
        } else {
            panic!("Expected Script error");
        }
    }

    #[test]
    fn test_parse_empty_stderr() {
        assert!(parse_lua_error("").is_none());
        assert!(parse_lua_error("  \n ").is_none());
    }

    #[test]
    fn test_script_error_display() {
        let err = SandboxError::Script {
            chunk: Some("script".to_string()),
            line: Some(7),
            message: "bad argument".to_string(),
            traceback: None,
        };
        assert_eq!(err.to_string(), "script:7: bad argument");
    }

    #[test]
    fn test_error_helpers() {
        let timeout = SandboxError::Timeout(std::time::Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_memory_limit());
        assert!(!timeout.is_script_error());
        assert_eq!(timeout.kind(), "timeout");

        let memory = SandboxError::MemoryLimitExceeded("test".to_string());
        assert!(!memory.is_timeout());
        assert!(memory.is_memory_limit());

        let syntax = SandboxError::Syntax {
            message: "script:1: unexpected symbol".to_string(),
        };
        assert!(syntax.is_script_error());

        let input = SandboxError::MalformedInput("No code provided".to_string());
        assert!(input.is_malformed_input());
    }
}
