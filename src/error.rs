//! Error types for compiling and running line expressions.

use std::io;

use thiserror::Error;

/// The expression could not be compiled. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("column {column}: {message}")]
pub struct CompileError {
    pub message: String,
    /// 1-based character column in the expression text.
    pub column: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, column: usize) -> Self {
        Self {
            message: message.into(),
            column,
        }
    }
}

/// An error raised while evaluating the expression for one record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("type error: {0}")]
    Type(String),
    #[error("undefined variable '{0}'")]
    Undefined(String),
    #[error("index {index} out of range for length {len}")]
    Index { index: i64, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("value error: {0}")]
    Value(String),
    #[error("invalid regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },
}

/// Top-level error for a run of the line evaluator.
#[derive(Debug, Error)]
pub enum LinevalError {
    #[error("expression error: {0}")]
    Compile(#[from] CompileError),

    /// A record failed under the strict policy.
    #[error("record {index}: {source}")]
    Runtime {
        index: usize,
        record: String,
        #[source]
        source: RuntimeError,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LinevalError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LinevalError::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this error.
    ///
    /// Compile and configuration errors share code 2 with clap's usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            LinevalError::Compile(_) | LinevalError::Config(_) => 2,
            LinevalError::Runtime { .. } | LinevalError::Io { .. } => 1,
        }
    }
}
