//! Run configuration for the line evaluator.

use crate::error::LinevalError;
use crate::value::Value;

/// How the input stream is split into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One record per line.
    #[default]
    Lines,
    /// The whole stream is one record.
    Slurp,
}

/// What happens when the expression fails on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Report the error, skip the record and keep going.
    #[default]
    Resilient,
    /// Report the error and stop.
    Strict,
}

/// Everything the executor needs besides the program and the streams.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mode: Mode,
    pub policy: ErrorPolicy,
    /// Treat the result as a predicate on the record instead of as output.
    pub filter: bool,
    /// Variables preset in the context before the first record.
    pub vars: Vec<(String, Value)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.push((name.into(), value));
        self
    }
}

/// Parse a `NAME=VALUE` assignment given on the command line.
///
/// The name must be a valid identifier other than the reserved `s` and `n`.
pub fn parse_var(spec: &str) -> Result<(String, Value), LinevalError> {
    let (name, value) = spec
        .split_once('=')
        .ok_or_else(|| LinevalError::Config(format!("'{spec}' is not NAME=VALUE")))?;
    let name = name.trim();

    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(LinevalError::Config(format!(
            "'{name}' is not a valid variable name"
        )));
    }
    if name == "s" || name == "n" {
        return Err(LinevalError::Config(format!(
            "'{name}' is reserved for the current record"
        )));
    }

    Ok((name.to_string(), Value::from_text(value)))
}
