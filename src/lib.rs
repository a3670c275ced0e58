//! # lineval
//!
//! Evaluate a small expression against every line of piped input.
//!
//! Each line becomes a record bound to `s` (its 1-based number is `n`); the
//! expression's value replaces the line in the output, and the value `none`
//! drops it. In slurp mode the whole input is a single record.
//!
//! ## Overview
//!
//! - **Records**: lines with their terminators kept aside and re-appended
//! - **Expressions**: compiled once, evaluated once per record
//! - **Context**: variables, regex match groups and compiled regexes that
//!   persist from one record to the next
//! - **Failure policy**: a failing record is reported and skipped
//!   (resilient, the default) or aborts the run (strict)
//!
//! ## Example
//!
//! ```
//! use std::io::{self, Cursor};
//! use lineval::{Config, execute};
//!
//! let mut output = Vec::new();
//! let summary = execute(
//!     "upper(s) if 'a' in s else none",
//!     Cursor::new("apple\nfig\nbanana\n"),
//!     &mut output,
//!     io::sink(),
//!     &Config::new(),
//! )
//! .unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "APPLE\nBANANA\n");
//! assert_eq!(summary.records_dropped, 1);
//! ```

pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expr;
pub mod record;
pub mod value;

use std::io::{BufRead, Write};

pub use config::{Config, ErrorPolicy, Mode, parse_var};
pub use context::Context;
pub use error::{CompileError, LinevalError, RuntimeError};
pub use evaluator::{Evaluate, Outcome, Program};
pub use executor::{Executor, Phase, RunSummary};
pub use record::{Record, RecordReader};
pub use value::Value;

/// Compile `expression` and run it over `input`.
///
/// Results go to `output`, per-record error reports to `errors`. A compile
/// error is returned before any input is read.
pub fn execute<R, W, L>(
    expression: &str,
    input: R,
    output: W,
    errors: L,
    config: &Config,
) -> Result<RunSummary, LinevalError>
where
    R: BufRead,
    W: Write,
    L: Write,
{
    let program = Program::compile(expression)?.with_filter(config.filter);
    Executor::new(&program, config).run(input, output, errors)
}
