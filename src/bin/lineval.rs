//! CLI tool to evaluate an expression against piped-in lines.
//!
//! Usage:
//!   lineval 'upper(s)' < input.txt
//!   lineval --slurp 'len(lines(s))' -i input.txt
//!   lineval -f transform.expr -i input.txt -o output.txt
//!
//! Exit codes: 0 on success, 1 on a strict-mode evaluation failure or an I/O
//! error, 2 on an invalid expression or command line.

use clap::Parser;
use lineval::{
    Config, ErrorPolicy, Executor, LinevalError, Mode, Program, RunSummary, parse_var,
};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Evaluate an expression for each line of input and print the results.
///
/// The line is bound to `s` and its 1-based number to `n`. A result of
/// `none` drops the line.
#[derive(Parser)]
#[command(name = "lineval", version)]
struct Cli {
    /// Expression to evaluate for each record
    #[arg(required_unless_present = "file")]
    expression: Option<String>,

    /// Read the expression from a file
    #[arg(short, long, conflicts_with = "expression")]
    file: Option<PathBuf>,

    /// Treat the whole input as a single record
    #[arg(short, long)]
    slurp: bool,

    /// Stop at the first record the expression fails on
    #[arg(long)]
    strict: bool,

    /// Keep the record when the expression is truthy, drop it otherwise
    #[arg(short = 'F', long)]
    filter: bool,

    /// Read input from file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Preset a variable before the first record (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Show debug logs and record counts on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Result<Config, LinevalError> {
        let mode = if self.slurp { Mode::Slurp } else { Mode::Lines };
        let policy = if self.strict {
            ErrorPolicy::Strict
        } else {
            ErrorPolicy::Resilient
        };
        let mut config = Config::new()
            .with_mode(mode)
            .with_policy(policy)
            .with_filter(self.filter);
        for spec in &self.vars {
            let (name, value) = parse_var(spec)?;
            config = config.with_var(name, value);
        }
        Ok(config)
    }

    fn expression(&self) -> Result<String, LinevalError> {
        match (&self.file, &self.expression) {
            (Some(path), _) => fs::read_to_string(path)
                .map(|text| text.trim_end().to_string())
                .map_err(|e| LinevalError::io(format!("expression file '{}'", path.display()), e)),
            (None, Some(expression)) => Ok(expression.clone()),
            (None, None) => Err(LinevalError::Config("no expression given".to_string())),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn open_input(cli: &Cli) -> Result<Box<dyn BufRead>, LinevalError> {
    match &cli.input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| LinevalError::io(format!("input file '{}'", path.display()), e))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(cli: &Cli) -> Result<Box<dyn Write>, LinevalError> {
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|e| {
                    LinevalError::io(format!("output directory for '{}'", path.display()), e)
                })?;
            }
            let file = File::create(path)
                .map_err(|e| LinevalError::io(format!("output file '{}'", path.display()), e))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn run(cli: &Cli) -> Result<RunSummary, LinevalError> {
    let config = cli.config()?;

    // Compile before touching any file so a bad expression never truncates the output.
    let program = Program::compile(&cli.expression()?)?.with_filter(config.filter);
    debug!(expression = program.source(), "compiled expression");

    if cli.verbose {
        eprintln!("Expression: {}", program.source());
        eprintln!(
            "Input:      {}",
            cli.input
                .as_ref()
                .map_or("(stdin)".to_string(), |p| p.display().to_string())
        );
        eprintln!(
            "Output:     {}",
            cli.output
                .as_ref()
                .map_or("(stdout)".to_string(), |p| p.display().to_string())
        );
        eprintln!("Mode:       {:?}, {:?}", config.mode, config.policy);
    }

    let input = open_input(cli)?;
    let output = open_output(cli)?;
    Executor::new(&program, &config).run(input, output, io::stderr().lock())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(summary) => {
            if cli.verbose {
                eprintln!(
                    "Records:    {} in -> {} out",
                    summary.records_read, summary.records_written
                );
                if summary.errors > 0 {
                    eprintln!("Errors:     {}", summary.errors);
                }
            }
            ExitCode::SUCCESS
        }
        // The reader went away (e.g. `| head`); nothing left to do.
        Err(LinevalError::Io { source, .. }) if source.kind() == io::ErrorKind::BrokenPipe => {
            ExitCode::SUCCESS
        }
        // Already reported on stderr by the executor.
        Err(e @ LinevalError::Runtime { .. }) => ExitCode::from(e.exit_code()),
        Err(e) => {
            eprintln!("lineval: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
