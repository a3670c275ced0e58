use std::io::{self, Cursor};
use std::path::Path;

use lineval::expr::parse_program;
use lineval::{Config, Mode, execute};
use proptest::prelude::*;

fn run(expression: &str, input: &str, config: &Config) -> String {
    let mut output = Vec::new();
    execute(expression, Cursor::new(input), &mut output, io::sink(), config).unwrap();
    String::from_utf8(output).unwrap()
}

/// Build an input from lines, each ended by `\n` or `\r\n`, optionally
/// leaving the last one unterminated.
fn join_lines(lines: &[(String, bool)], unterminated_tail: bool) -> String {
    let mut text = String::new();
    for (i, (line, crlf)) in lines.iter().enumerate() {
        text.push_str(line);
        if unterminated_tail && i + 1 == lines.len() {
            break;
        }
        text.push_str(if *crlf { "\r\n" } else { "\n" });
    }
    text
}

fn lines_strategy() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec(("[a-zA-Z0-9 ,.]{0,12}", any::<bool>()), 0..12)
}

/// Every expression shipped in specs/ must compile.
#[test]
fn parse_all_spec_expressions() {
    let spec_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
    let mut entries: Vec<_> = std::fs::read_dir(&spec_dir)
        .unwrap_or_else(|e| panic!("cannot open {}: {e}", spec_dir.display()))
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "expr"))
        .collect();
    entries.sort_by_key(|e| e.path());

    assert!(!entries.is_empty(), "no .expr files found in {}", spec_dir.display());

    let mut failures = Vec::new();
    for entry in &entries {
        let path = entry.path();
        let src = std::fs::read_to_string(&path).unwrap();
        if let Err(e) = parse_program(src.trim_end()) {
            failures.push(format!("{}: {e}", path.display()));
        }
    }
    assert!(failures.is_empty(), "failed to parse:\n  {}", failures.join("\n  "));
}

proptest! {
    /// The parser returns Ok or Err for any input, never panics.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse_program(&s);
    }

    #[test]
    fn parser_does_not_panic_on_operator_soup(s in "[a-z0-9 ()\\[\\]'\",:;+*/%<>=!~.-]{0,40}") {
        let _ = parse_program(&s);
    }
}

proptest! {
    /// `s` reproduces the input byte for byte, terminators included.
    #[test]
    fn identity_round_trip(lines in lines_strategy(), tail in any::<bool>()) {
        let input = join_lines(&lines, tail);
        prop_assert_eq!(run("s", &input, &Config::new()), input);
    }

    /// Slurp mode hands over the input untouched.
    #[test]
    fn slurp_identity_round_trip(input in "[a-z \\r\\n]{0,60}") {
        let config = Config::new().with_mode(Mode::Slurp);
        prop_assert_eq!(run("s", &input, &config), input);
    }

    /// Running the identity twice changes nothing.
    #[test]
    fn identity_is_idempotent(lines in lines_strategy(), tail in any::<bool>()) {
        let input = join_lines(&lines, tail);
        let once = run("s", &input, &Config::new());
        let twice = run("s", &once, &Config::new());
        prop_assert_eq!(once, twice);
    }

    /// Dropping every record writes nothing at all.
    #[test]
    fn none_drops_everything(lines in lines_strategy(), tail in any::<bool>()) {
        let input = join_lines(&lines, tail);
        prop_assert_eq!(run("none", &input, &Config::new()), "");
    }

    /// `n` numbers the records from 1.
    #[test]
    fn record_numbers_are_sequential(lines in prop::collection::vec("[a-z]{0,5}", 0..20)) {
        let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let expected: String = (1..=lines.len()).map(|i| format!("{i}\n")).collect();
        prop_assert_eq!(run("n", &input, &Config::new()), expected);
    }

    #[test]
    fn upper_matches_std(lines in prop::collection::vec("[a-zA-Z0-9 ]{0,10}", 0..10)) {
        let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
        prop_assert_eq!(run("upper(s)", &input, &Config::new()), input.to_uppercase());
    }
}
