//! Error types shared across the pipeline
//!
//! Compile-time failures abort the pipeline with a single [`CompileError`];
//! runtime failures surface as a [`RuntimeError`] carrying a best-effort
//! stack trace. Both map to process exit code 1 at the CLI boundary.

use std::fmt;
use thiserror::Error;

/// A single frame of a runtime stack trace, bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Source file of the function's module
    pub file: String,
    /// Function name
    pub function: String,
    /// Line of the last dispatched instruction, if known
    pub line: Option<u32>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}:{}", self.file, self.function, line),
            None => write!(f, "{}:{}", self.file, self.function),
        }
    }
}

/// Errors produced before code generation completes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Malformed token stream
    #[error("lex error at {path}:{line}: {msg}")]
    Lex { msg: String, line: u32, path: String },
    /// Malformed syntax
    #[error("parse error at {path}:{line}: {msg}")]
    Parse { msg: String, line: u32, path: String },
    /// User-visible rule violation (mutability, arity, scoping, ...)
    #[error("compile error at {path}:{line}: {msg}")]
    User { msg: String, line: u32, path: String },
    /// Compiler invariant breach (unknown label, pool overflow, ...)
    #[error("internal compiler error: {msg}")]
    Internal { msg: String },
}

impl CompileError {
    /// Attach the source path to an error raised before the path was known
    pub fn with_path(self, path: &str) -> Self {
        match self {
            CompileError::Lex { msg, line, .. } => CompileError::Lex {
                msg,
                line,
                path: path.to_string(),
            },
            CompileError::Parse { msg, line, .. } => CompileError::Parse {
                msg,
                line,
                path: path.to_string(),
            },
            CompileError::User { msg, line, .. } => CompileError::User {
                msg,
                line,
                path: path.to_string(),
            },
            other => other,
        }
    }
}

/// Errors detected while the VM is executing
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// Type mismatches, missing globals, arity failures, unhandled throws, ...
    #[error("runtime error: {msg}")]
    Raised { msg: String, trace: Vec<TraceFrame> },
    /// Dispatcher invariant breach
    #[error("internal runtime error: {msg}")]
    Internal { msg: String, trace: Vec<TraceFrame> },
}

impl RuntimeError {
    /// The error message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            RuntimeError::Raised { msg, .. } | RuntimeError::Internal { msg, .. } => msg,
        }
    }

    /// The recorded stack trace, bottom to top
    pub fn trace(&self) -> &[TraceFrame] {
        match self {
            RuntimeError::Raised { trace, .. } | RuntimeError::Internal { trace, .. } => trace,
        }
    }

    /// Render the message followed by the stack trace
    pub fn render(&self) -> String {
        let mut out = self.to_string();
        for frame in self.trace() {
            out.push_str("\n  at ");
            out.push_str(&frame.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::User {
            msg: "cannot shadow procedure names".to_string(),
            line: 3,
            path: "main.ze".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "compile error at main.ze:3: cannot shadow procedure names"
        );
    }

    #[test]
    fn test_with_path_replaces_placeholder() {
        let err = CompileError::Lex {
            msg: "unterminated string".to_string(),
            line: 7,
            path: "<input>".to_string(),
        };
        let err = err.with_path("lib/util.ze");
        assert!(err.to_string().contains("lib/util.ze:7"));
    }

    #[test]
    fn test_runtime_error_render_includes_trace() {
        let err = RuntimeError::Raised {
            msg: "division by zero is undefined".to_string(),
            trace: vec![
                TraceFrame {
                    file: "main.ze".to_string(),
                    function: "main".to_string(),
                    line: Some(2),
                },
                TraceFrame {
                    file: "main.ze".to_string(),
                    function: "div".to_string(),
                    line: None,
                },
            ],
        };
        let rendered = err.render();
        assert!(rendered.contains("division by zero"));
        assert!(rendered.contains("main.ze:main:2"));
        assert!(rendered.contains("main.ze:div"));
    }
}
