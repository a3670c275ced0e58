//! Built-in function library.
//!
//! Every function is also callable with method syntax: `s.upper()` is
//! `upper(s)`, `s.replace("a", "b")` is `replace(s, "a", "b")`.
//!
//! | Function | Result |
//! |---|---|
//! | `len(x)` | characters of a str, elements of a list |
//! | `upper(s)`, `lower(s)` | case conversion |
//! | `strip(s[, chars])`, `lstrip`, `rstrip` | trim whitespace or the given characters |
//! | `replace(s, old, new)` | literal replacement |
//! | `split(s[, sep])`, `join(list, sep)`, `lines(s)` | splitting and joining |
//! | `startswith(s, p)`, `endswith(s, p)` | prefix/suffix tests |
//! | `find(s, sub)`, `count(x, item)` | position (or -1) and occurrence count |
//! | `reverse(x)` | reversed str or list |
//! | `int(x)`, `float(x)`, `str(x)` | conversions |
//! | `abs(x)`, `round(x[, digits])`, `min(..)`, `max(..)`, `sum(list)` | numbers |
//! | `sub(pattern, repl, s)`, `match(pattern, s)`, `group([i])` | regexes |
//! | `findall(pattern, s)`, `split_re(s, pattern)` | regexes |

use std::cmp::Ordering;

use crate::context::Context;
use crate::error::RuntimeError;
use crate::value::Value;

/// Call signature of a builtin, checked when the program is compiled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FnSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    /// Argument holding a regex pattern, validated at compile time when literal.
    pub pattern_arg: Option<usize>,
}

impl FnSpec {
    const fn fixed(name: &'static str, args: usize) -> Self {
        Self {
            name,
            min_args: args,
            max_args: Some(args),
            pattern_arg: None,
        }
    }

    const fn range(name: &'static str, min_args: usize, max_args: usize) -> Self {
        Self {
            name,
            min_args,
            max_args: Some(max_args),
            pattern_arg: None,
        }
    }

    const fn regex(name: &'static str, args: usize, pattern_arg: usize) -> Self {
        Self {
            name,
            min_args: args,
            max_args: Some(args),
            pattern_arg: Some(pattern_arg),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable arity for error messages.
    pub fn arity_text(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("takes {max} argument(s)"),
            Some(max) => format!("takes {} to {max} arguments", self.min_args),
            None => format!("takes at least {} argument(s)", self.min_args),
        }
    }
}

const BUILTINS: &[FnSpec] = &[
    FnSpec::fixed("len", 1),
    FnSpec::fixed("upper", 1),
    FnSpec::fixed("lower", 1),
    FnSpec::range("strip", 1, 2),
    FnSpec::range("lstrip", 1, 2),
    FnSpec::range("rstrip", 1, 2),
    FnSpec::fixed("replace", 3),
    FnSpec::range("split", 1, 2),
    FnSpec::fixed("join", 2),
    FnSpec::fixed("lines", 1),
    FnSpec::fixed("startswith", 2),
    FnSpec::fixed("endswith", 2),
    FnSpec::fixed("find", 2),
    FnSpec::fixed("count", 2),
    FnSpec::fixed("reverse", 1),
    FnSpec::fixed("int", 1),
    FnSpec::fixed("float", 1),
    FnSpec::fixed("str", 1),
    FnSpec::fixed("abs", 1),
    FnSpec::range("round", 1, 2),
    FnSpec {
        name: "min",
        min_args: 1,
        max_args: None,
        pattern_arg: None,
    },
    FnSpec {
        name: "max",
        min_args: 1,
        max_args: None,
        pattern_arg: None,
    },
    FnSpec::fixed("sum", 1),
    FnSpec::regex("sub", 3, 0),
    FnSpec::regex("match", 2, 0),
    FnSpec::range("group", 0, 1),
    FnSpec::regex("findall", 2, 0),
    FnSpec::regex("split_re", 2, 1),
];

pub fn lookup(name: &str) -> Option<&'static FnSpec> {
    BUILTINS.iter().find(|spec| spec.name == name)
}

fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::Type(format!(
            "{name}() expects a str, got {}",
            other.type_name()
        ))),
    }
}

fn expect_list<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], RuntimeError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(RuntimeError::Type(format!(
            "{name}() expects a list, got {}",
            other.type_name()
        ))),
    }
}

fn expect_int(name: &str, value: &Value) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::Type(format!("{name}() expects an int, got {}", value.type_name()))
    })
}

fn strings(items: impl Iterator<Item = impl Into<String>>) -> Value {
    Value::List(items.map(|s| Value::Str(s.into())).collect())
}

fn strip(name: &str, args: &[Value], left: bool, right: bool) -> Result<Value, RuntimeError> {
    let s = expect_str(name, &args[0])?;
    let stripped = match args.get(1) {
        None => match (left, right) {
            (true, true) => s.trim(),
            (true, false) => s.trim_start(),
            _ => s.trim_end(),
        },
        Some(chars) => {
            let chars: Vec<char> = expect_str(name, chars)?.chars().collect();
            let pred = |c: char| chars.contains(&c);
            match (left, right) {
                (true, true) => s.trim_matches(pred),
                (true, false) => s.trim_start_matches(pred),
                _ => s.trim_end_matches(pred),
            }
        }
    };
    Ok(Value::from(stripped))
}

fn to_int(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => float_to_int(x.trunc()),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| RuntimeError::Value(format!("invalid literal for int(): {s:?}"))),
        other => Err(RuntimeError::Type(format!(
            "int() cannot convert {}",
            other.type_name()
        ))),
    }
}

fn float_to_int(x: f64) -> Result<Value, RuntimeError> {
    if !x.is_finite() {
        return Err(RuntimeError::Value(format!("cannot convert {x} to int")));
    }
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(RuntimeError::Overflow);
    }
    Ok(Value::Int(x as i64))
}

fn to_float(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| RuntimeError::Value(format!("invalid literal for float(): {s:?}"))),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            RuntimeError::Type(format!("float() cannot convert {}", other.type_name()))
        }),
    }
}

fn round(args: &[Value]) -> Result<Value, RuntimeError> {
    let x = args[0].as_f64().ok_or_else(|| {
        RuntimeError::Type(format!("round() expects a number, got {}", args[0].type_name()))
    })?;
    match args.get(1) {
        None => match &args[0] {
            Value::Int(n) => Ok(Value::Int(*n)),
            _ => float_to_int(x.round()),
        },
        Some(digits) => {
            let digits = i32::try_from(expect_int("round", digits)?)
                .map_err(|_| RuntimeError::Value("round() digits out of range".to_string()))?;
            let scale = 10f64.powi(digits);
            Ok(Value::Float((x * scale).round() / scale))
        }
    }
}

fn extreme(name: &str, args: &[Value], keep: Ordering) -> Result<Value, RuntimeError> {
    let items = if args.len() == 1 {
        expect_list(name, &args[0])?
    } else {
        args
    };
    let mut best = items
        .first()
        .ok_or_else(|| RuntimeError::Value(format!("{name}() of an empty list")))?;
    for item in &items[1..] {
        if item.compare(best)? == keep {
            best = item;
        }
    }
    Ok(best.clone())
}

fn find(s: &str, sub: &str) -> Value {
    match s.find(sub) {
        Some(byte_idx) => Value::Int(s[..byte_idx].chars().count() as i64),
        None => Value::Int(-1),
    }
}

fn count(args: &[Value]) -> Result<Value, RuntimeError> {
    let n = match (&args[0], &args[1]) {
        (Value::Str(s), Value::Str(sub)) if sub.is_empty() => s.chars().count() + 1,
        (Value::Str(s), Value::Str(sub)) => s.matches(sub.as_str()).count(),
        (Value::List(items), needle) => items.iter().filter(|item| *item == needle).count(),
        (hay, needle) => {
            return Err(RuntimeError::Type(format!(
                "count() cannot count {} in {}",
                needle.type_name(),
                hay.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

/// Call builtin `name` with already-evaluated arguments.
///
/// Arity has been checked at compile time against [`lookup`].
pub fn call(name: &str, args: &[Value], ctx: &mut Context) -> Result<Value, RuntimeError> {
    match name {
        "len" => match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(RuntimeError::Type(format!(
                "len() of {}",
                other.type_name()
            ))),
        },
        "upper" => Ok(Value::from(expect_str(name, &args[0])?.to_uppercase())),
        "lower" => Ok(Value::from(expect_str(name, &args[0])?.to_lowercase())),
        "strip" => strip(name, args, true, true),
        "lstrip" => strip(name, args, true, false),
        "rstrip" => strip(name, args, false, true),
        "replace" => {
            let s = expect_str(name, &args[0])?;
            let old = expect_str(name, &args[1])?;
            let new = expect_str(name, &args[2])?;
            Ok(Value::from(s.replace(old, new)))
        }
        "split" => {
            let s = expect_str(name, &args[0])?;
            match args.get(1) {
                None => Ok(strings(s.split_whitespace())),
                Some(sep) => {
                    let sep = expect_str(name, sep)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::Value("split() with empty separator".to_string()));
                    }
                    Ok(strings(s.split(sep)))
                }
            }
        }
        "join" => {
            let items = expect_list(name, &args[0])?;
            let sep = expect_str(name, &args[1])?;
            let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
            Ok(Value::from(parts.join(sep)))
        }
        "lines" => Ok(strings(expect_str(name, &args[0])?.lines())),
        "startswith" => {
            let s = expect_str(name, &args[0])?;
            Ok(Value::Bool(s.starts_with(expect_str(name, &args[1])?)))
        }
        "endswith" => {
            let s = expect_str(name, &args[0])?;
            Ok(Value::Bool(s.ends_with(expect_str(name, &args[1])?)))
        }
        "find" => Ok(find(
            expect_str(name, &args[0])?,
            expect_str(name, &args[1])?,
        )),
        "count" => count(args),
        "reverse" => match &args[0] {
            Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
            Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
            other => Err(RuntimeError::Type(format!(
                "reverse() of {}",
                other.type_name()
            ))),
        },
        "int" => to_int(&args[0]),
        "float" => to_float(&args[0]),
        "str" => Ok(Value::Str(args[0].to_string())),
        "abs" => match &args[0] {
            Value::Int(n) => n.checked_abs().map(Value::Int).ok_or(RuntimeError::Overflow),
            Value::Float(x) => Ok(Value::Float(x.abs())),
            other => Err(RuntimeError::Type(format!(
                "abs() of {}",
                other.type_name()
            ))),
        },
        "round" => round(args),
        "min" => extreme(name, args, Ordering::Less),
        "max" => extreme(name, args, Ordering::Greater),
        "sum" => expect_list(name, &args[0])?
            .iter()
            .try_fold(Value::Int(0), |acc, item| acc.add(item)),
        "sub" => {
            let re = ctx.regex(expect_str(name, &args[0])?)?;
            let repl = expect_str(name, &args[1])?;
            let s = expect_str(name, &args[2])?;
            Ok(Value::from(re.replace_all(s, repl).into_owned()))
        }
        "match" => {
            let pattern = expect_str(name, &args[0])?;
            let s = expect_str(name, &args[1])?;
            ctx.search(pattern, s).map(Value::Bool)
        }
        "group" => {
            let index = match args.first() {
                None => 0,
                Some(v) => usize::try_from(expect_int(name, v)?).map_err(|_| {
                    RuntimeError::Value("group() index must not be negative".to_string())
                })?,
            };
            Ok(ctx.group(index))
        }
        "findall" => {
            let re = ctx.regex(expect_str(name, &args[0])?)?;
            let s = expect_str(name, &args[1])?;
            Ok(strings(re.find_iter(s).map(|m| m.as_str())))
        }
        "split_re" => {
            let s = expect_str(name, &args[0])?;
            let re = ctx.regex(expect_str(name, &args[1])?)?;
            Ok(strings(re.split(s)))
        }
        _ => Err(RuntimeError::Value(format!("unknown function '{name}'"))),
    }
}
