//! Streaming record executor.
//!
//! Reads one record, evaluates it, writes the result, then reads the next.
//! Nothing but the current record is held in memory (slurp mode aside, where
//! the record is the whole input).
//!
//! Phases: `Init → Reading → (Evaluating → Writing)* → Done`. A failed
//! evaluation passes through `Error`, then returns to `Reading` under the
//! resilient policy or ends in `Done` with an error under the strict one.

use std::io::{BufRead, Write};

use tracing::{debug, trace};

use crate::config::{Config, ErrorPolicy, Mode};
use crate::context::Context;
use crate::error::LinevalError;
use crate::evaluator::{Evaluate, Outcome};
use crate::record::{Record, RecordReader};

/// Where the executor is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Reading,
    Evaluating,
    Writing,
    Error,
    Done,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub records_read: usize,
    pub records_written: usize,
    pub records_dropped: usize,
    /// Records whose evaluation failed.
    pub errors: usize,
}

/// Drives an [`Evaluate`] implementation over an input stream.
pub struct Executor<'a, E: Evaluate + ?Sized> {
    evaluator: &'a E,
    mode: Mode,
    policy: ErrorPolicy,
    context: Context,
    phase: Phase,
}

impl<'a, E: Evaluate + ?Sized> Executor<'a, E> {
    /// Create an executor whose context is seeded with `config.vars`.
    pub fn new(evaluator: &'a E, config: &Config) -> Self {
        let mut context = Context::new();
        for (name, value) in &config.vars {
            context.set_var(name.clone(), value.clone());
        }
        Self {
            evaluator,
            mode: config.mode,
            policy: config.policy,
            context,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn transition(&mut self, next: Phase) {
        trace!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// Process every record of `input`, writing results to `output` and
    /// per-record error reports to `errors`.
    pub fn run<R, W, L>(
        &mut self,
        input: R,
        mut output: W,
        mut errors: L,
    ) -> Result<RunSummary, LinevalError>
    where
        R: BufRead,
        W: Write,
        L: Write,
    {
        debug!(mode = ?self.mode, policy = ?self.policy, "starting run");
        let mut summary = RunSummary::default();

        self.transition(Phase::Reading);
        for item in RecordReader::new(input, self.mode) {
            let record = item.map_err(|e| LinevalError::io("reading input", e))?;
            summary.records_read += 1;

            self.transition(Phase::Evaluating);
            match self.evaluator.evaluate(&record, &mut self.context) {
                Ok(Outcome::Emit(text)) => {
                    self.transition(Phase::Writing);
                    write_record(&mut output, &text, &record)?;
                    summary.records_written += 1;
                }
                Ok(Outcome::Drop) => {
                    summary.records_dropped += 1;
                }
                Err(source) => {
                    self.transition(Phase::Error);
                    summary.errors += 1;
                    debug!(index = record.index(), error = %source, "evaluation failed");
                    writeln!(
                        errors,
                        "lineval: record {}: {} (record: {:?})",
                        record.index(),
                        source,
                        record.as_str()
                    )
                    .map_err(|e| LinevalError::io("writing error report", e))?;

                    if self.policy == ErrorPolicy::Strict {
                        output
                            .flush()
                            .map_err(|e| LinevalError::io("writing output", e))?;
                        self.transition(Phase::Done);
                        return Err(LinevalError::Runtime {
                            index: record.index(),
                            record: record.as_str().to_string(),
                            source,
                        });
                    }
                }
            }
            self.transition(Phase::Reading);
        }

        output
            .flush()
            .map_err(|e| LinevalError::io("writing output", e))?;
        self.transition(Phase::Done);
        debug!(
            read = summary.records_read,
            written = summary.records_written,
            dropped = summary.records_dropped,
            errors = summary.errors,
            "run complete"
        );
        Ok(summary)
    }
}

fn write_record<W: Write>(output: &mut W, text: &str, record: &Record) -> Result<(), LinevalError> {
    output
        .write_all(text.as_bytes())
        .and_then(|()| output.write_all(record.terminator().as_bytes()))
        .map_err(|e| LinevalError::io("writing output", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::evaluator::Program;
    use crate::value::Value;
    use std::fs;
    use std::io::{self, Cursor};
    use std::path::Path;

    /// Helper: run an expression over `input` and return (output, error report, result).
    fn run_with(
        expression: &str,
        input: &str,
        config: &Config,
    ) -> (String, String, Result<RunSummary, LinevalError>) {
        let program = Program::compile(expression)
            .unwrap()
            .with_filter(config.filter);
        let mut output = Vec::new();
        let mut errors = Vec::new();
        let result = Executor::new(&program, config).run(Cursor::new(input), &mut output, &mut errors);
        (
            String::from_utf8(output).unwrap(),
            String::from_utf8(errors).unwrap(),
            result,
        )
    }

    fn run_ok(expression: &str, input: &str) -> String {
        let (output, errors, result) = run_with(expression, input, &Config::new());
        result.unwrap();
        assert!(errors.is_empty(), "unexpected errors: {errors}");
        output
    }

    // --- Unit tests ---

    #[test]
    fn test_uppercase_lines() {
        assert_eq!(run_ok("upper(s)", "a\nb\nc\n"), "A\nB\nC\n");
    }

    #[test]
    fn test_identity_round_trip() {
        let input = "first\r\n\nthird\nno newline";
        assert_eq!(run_ok("s", input), input);
    }

    #[test]
    fn test_none_produces_empty_output() {
        assert_eq!(run_ok("none", "a\nb\nc\n"), "");
    }

    #[test]
    fn test_dropped_records_lose_their_terminator() {
        assert_eq!(run_ok("s if n != 2 else none", "a\nb\nc\n"), "a\nc\n");
    }

    #[test]
    fn test_slurp_counts_lines() {
        let config = Config::new().with_mode(Mode::Slurp);
        let (output, _, result) = run_with("len(lines(s))", "a\nb\nc\n", &config);
        assert_eq!(output, "3");
        assert_eq!(result.unwrap().records_read, 1);
    }

    #[test]
    fn test_slurp_identity() {
        let config = Config::new().with_mode(Mode::Slurp);
        let (output, _, _) = run_with("s", "a\nb\n", &config);
        assert_eq!(output, "a\nb\n");
    }

    #[test]
    fn test_summary_counts() {
        let (_, _, result) = run_with("s if 'x' in s else none", "x\ny\nx\n", &Config::new());
        assert_eq!(
            result.unwrap(),
            RunSummary {
                records_read: 3,
                records_written: 2,
                records_dropped: 1,
                errors: 0,
            }
        );
    }

    #[test]
    fn test_resilient_policy_skips_failures() {
        let (output, errors, result) = run_with("int(s) * 2", "1\nx\n3\n", &Config::new());
        assert_eq!(output, "2\n6\n");
        let summary = result.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.records_written, 2);
        assert_eq!(
            errors,
            "lineval: record 2: value error: invalid literal for int(): \"x\" (record: \"x\")\n"
        );
    }

    #[test]
    fn test_resilient_policy_reports_every_failure() {
        let (output, errors, result) = run_with("1 / 0", "a\nb\nc\n", &Config::new());
        assert!(output.is_empty());
        assert_eq!(errors.lines().count(), 3);
        assert_eq!(result.unwrap().errors, 3);
    }

    #[test]
    fn test_strict_policy_aborts() {
        let config = Config::new().with_policy(ErrorPolicy::Strict);
        let (output, errors, result) = run_with("int(s) * 2", "1\nx\n3\n", &config);
        assert_eq!(output, "2\n");
        assert_eq!(errors.lines().count(), 1);
        match result {
            Err(LinevalError::Runtime { index, record, source }) => {
                assert_eq!(index, 2);
                assert_eq!(record, "x");
                assert!(matches!(source, RuntimeError::Value(_)));
            }
            other => panic!("Expected Runtime error, got {other:?}"),
        }
    }

    #[test]
    fn test_phases() {
        let program = Program::compile("1 / 0").unwrap();
        let config = Config::new().with_policy(ErrorPolicy::Strict);
        let mut executor = Executor::new(&program, &config);
        assert_eq!(executor.phase(), Phase::Init);
        let result = executor.run(Cursor::new("a\n"), io::sink(), io::sink());
        assert!(result.is_err());
        assert_eq!(executor.phase(), Phase::Done);

        let program = Program::compile("s").unwrap();
        let mut executor = Executor::new(&program, &Config::new());
        executor.run(Cursor::new(""), io::sink(), io::sink()).unwrap();
        assert_eq!(executor.phase(), Phase::Done);
    }

    #[test]
    fn test_context_persists_across_records() {
        assert_eq!(
            run_ok("c += 1; str(c) + ':' + s", "a\nb\nc\n"),
            "1:a\n2:b\n3:c\n"
        );
    }

    #[test]
    fn test_preset_vars() {
        let config = Config::new().with_var("prefix", Value::from("> "));
        let (output, _, result) = run_with("prefix + s", "a\nb\n", &config);
        result.unwrap();
        assert_eq!(output, "> a\n> b\n");
    }

    #[test]
    fn test_preset_vars_visible_in_context() {
        let program = Program::compile("s").unwrap();
        let config = Config::new().with_var("limit", Value::Int(3));
        let executor = Executor::new(&program, &config);
        assert_eq!(executor.context().get_var("limit"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_filter_mode() {
        let config = Config::new().with_filter(true);
        let (output, _, _) = run_with("s ~ '^b'", "apple\nbanana\nblueberry\ncherry\n", &config);
        assert_eq!(output, "banana\nblueberry\n");
    }

    #[test]
    fn test_custom_evaluator() {
        let numbered = |record: &Record, _ctx: &mut Context| -> Result<Outcome, RuntimeError> {
            if record.as_str().is_empty() {
                Ok(Outcome::Drop)
            } else {
                Ok(Outcome::Emit(format!("{}\t{}", record.index(), record.as_str())))
            }
        };
        let mut output = Vec::new();
        let summary = Executor::new(&numbered, &Config::new())
            .run(Cursor::new("a\n\nb\n"), &mut output, io::sink())
            .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "1\ta\n3\tb\n");
        assert_eq!(summary.records_dropped, 1);
    }

    #[test]
    fn test_invalid_utf8_input_is_io_error() {
        let program = Program::compile("s").unwrap();
        let bytes: &[u8] = &[0xff, 0xfe, b'\n'];
        let result = Executor::new(&program, &Config::new()).run(Cursor::new(bytes), io::sink(), io::sink());
        assert!(matches!(result, Err(LinevalError::Io { .. })));
    }

    // --- Fixture tests for every file in specs/ ---

    /// Run `specs/<name>.expr` over `specs/input.data` and compare with
    /// `specs/<name>.out`.
    fn assert_spec(name: &str) {
        let spec_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
        let input = fs::read_to_string(spec_dir.join("input.data")).unwrap();
        let expression = fs::read_to_string(spec_dir.join(format!("{name}.expr"))).unwrap();
        let expected = fs::read_to_string(spec_dir.join(format!("{name}.out"))).unwrap();

        let output = run_ok(expression.trim_end(), &input);
        assert_eq!(output, expected, "output differs for {name}");
    }

    macro_rules! spec_test {
        ($name:ident, $file:expr) => {
            #[test]
            fn $name() {
                assert_spec($file);
            }
        };
    }

    spec_test!(spec_identity, "identity");
    spec_test!(spec_lower_case, "lower-case");
    spec_test!(spec_sales_only, "sales-only");
    spec_test!(spec_number_lines, "number-lines");
    spec_test!(spec_salary_total, "salary-total");
    spec_test!(spec_swap_names, "swap-names");
    spec_test!(spec_extract_dept, "extract-dept");
    spec_test!(spec_short_names, "short-names");
}
