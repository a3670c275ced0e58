//! Evaluation state shared across the records of one run.
//!
//! The context is owned by the executor and lent to each evaluation, so
//! variables assigned while processing one record are visible to the next.
//! It also holds the implicit match state left by the last `~` / `match()`
//! and a cache of compiled regexes.

use std::collections::HashMap;

use regex::Regex;

use crate::error::RuntimeError;
use crate::value::Value;

/// Compiled regexes kept before the cache is emptied.
pub const REGEX_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct Context {
    vars: HashMap<String, Value>,
    /// Capture groups of the last successful match; group 0 is the whole match.
    groups: Vec<Option<String>>,
    regexes: HashMap<String, Regex>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Compile `pattern`, reusing an earlier compilation when possible.
    ///
    /// The cache holds at most [`REGEX_CACHE_CAPACITY`] patterns and is
    /// emptied when full.
    pub fn regex(&mut self, pattern: &str) -> Result<Regex, RuntimeError> {
        if let Some(re) = self.regexes.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| RuntimeError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        if self.regexes.len() >= REGEX_CACHE_CAPACITY {
            self.regexes.clear();
        }
        self.regexes.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    /// Search `text` for `pattern` and update the match state.
    ///
    /// A failed search clears the groups so stale captures never leak into
    /// the next record.
    pub fn search(&mut self, pattern: &str, text: &str) -> Result<bool, RuntimeError> {
        let re = self.regex(pattern)?;
        match re.captures(text) {
            Some(caps) => {
                self.groups = caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect();
                Ok(true)
            }
            None => {
                self.groups.clear();
                Ok(false)
            }
        }
    }

    /// Capture group `index` of the last match, or `none`.
    pub fn group(&self, index: usize) -> Value {
        match self.groups.get(index) {
            Some(Some(text)) => Value::Str(text.clone()),
            _ => Value::None,
        }
    }
}
