//! The evaluator seam and the built-in expression interpreter.
//!
//! The executor only knows the [`Evaluate`] trait: give it a record and the
//! run's [`Context`], get back what to write. [`Program`] is the
//! implementation backed by the expression language in [`crate::expr`];
//! closures implement the trait too, which keeps the driver testable in
//! isolation.

use crate::builtins;
use crate::context::Context;
use crate::error::{CompileError, RuntimeError};
use crate::expr::{AssignOp, BinOp, Expr, Stmt, UnaryOp, parse_program};
use crate::record::Record;
use crate::value::Value;

/// What the executor should do with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Write this text (followed by the record's terminator).
    Emit(String),
    /// Write nothing for this record.
    Drop,
}

/// Evaluates one record at a time.
pub trait Evaluate {
    fn evaluate(&self, record: &Record, ctx: &mut Context) -> Result<Outcome, RuntimeError>;
}

impl<F> Evaluate for F
where
    F: Fn(&Record, &mut Context) -> Result<Outcome, RuntimeError>,
{
    fn evaluate(&self, record: &Record, ctx: &mut Context) -> Result<Outcome, RuntimeError> {
        self(record, ctx)
    }
}

/// A compiled expression program.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    stmts: Vec<Stmt>,
    filter: bool,
}

/// Per-record bindings: `s` and `n`.
struct Frame {
    s: Value,
    n: i64,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        Ok(Self {
            source: source.to_string(),
            stmts: parse_program(source)?,
            filter: false,
        })
    }

    /// In filter mode the result decides whether `s` is kept.
    pub fn with_filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the program on one record, returning the raw result value and the
    /// final value of `s`.
    pub fn run(&self, record: &Record, ctx: &mut Context) -> Result<(Value, Value), RuntimeError> {
        let mut frame = Frame {
            s: Value::from(record.as_str()),
            n: i64::try_from(record.index()).map_err(|_| RuntimeError::Overflow)?,
        };

        let mut result = None;
        for stmt in &self.stmts {
            result = match stmt {
                Stmt::Expr(expr) => Some(eval(expr, &frame, ctx)?),
                Stmt::Assign { name, op, value } => {
                    let rhs = eval(value, &frame, ctx)?;
                    assign(name, *op, rhs, &mut frame, ctx)?;
                    None
                }
            };
        }

        let value = result.unwrap_or_else(|| frame.s.clone());
        Ok((value, frame.s))
    }
}

impl Evaluate for Program {
    fn evaluate(&self, record: &Record, ctx: &mut Context) -> Result<Outcome, RuntimeError> {
        let (value, s) = self.run(record, ctx)?;
        let outcome = if self.filter {
            if value.is_truthy() && !s.is_none() {
                Outcome::Emit(s.to_string())
            } else {
                Outcome::Drop
            }
        } else if value.is_none() {
            Outcome::Drop
        } else {
            Outcome::Emit(value.to_string())
        };
        Ok(outcome)
    }
}

/// Value a compound assignment starts from.
///
/// Undefined accumulators start from `""` for string right-hand sides and
/// from `0` otherwise.
fn current_value(name: &str, rhs: &Value, frame: &Frame, ctx: &Context) -> Value {
    if name == "s" {
        return frame.s.clone();
    }
    match ctx.get_var(name) {
        Some(v) => v.clone(),
        None if matches!(rhs, Value::Str(_)) => Value::from(""),
        None => Value::Int(0),
    }
}

fn assign(
    name: &str,
    op: AssignOp,
    rhs: Value,
    frame: &mut Frame,
    ctx: &mut Context,
) -> Result<(), RuntimeError> {
    let value = match op {
        AssignOp::Set => rhs,
        AssignOp::Add => current_value(name, &rhs, frame, ctx).add(&rhs)?,
        AssignOp::Sub => current_value(name, &rhs, frame, ctx).sub(&rhs)?,
        AssignOp::Mul => current_value(name, &rhs, frame, ctx).mul(&rhs)?,
        AssignOp::Div => current_value(name, &rhs, frame, ctx).div(&rhs)?,
        AssignOp::Rem => current_value(name, &rhs, frame, ctx).rem(&rhs)?,
    };

    if name == "s" {
        frame.s = value;
    } else {
        ctx.set_var(name, value);
    }
    Ok(())
}

fn eval(expr: &Expr, frame: &Frame, ctx: &mut Context) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => match name.as_str() {
            "s" => Ok(frame.s.clone()),
            "n" => Ok(Value::Int(frame.n)),
            _ => ctx
                .get_var(name)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(name.clone())),
        },
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, frame, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Unary(UnaryOp::Neg, operand) => eval(operand, frame, ctx)?.neg(),
        Expr::Unary(UnaryOp::Not, operand) => {
            Ok(Value::Bool(!eval(operand, frame, ctx)?.is_truthy()))
        }
        Expr::And(lhs, rhs) => {
            let left = eval(lhs, frame, ctx)?;
            if left.is_truthy() {
                eval(rhs, frame, ctx)
            } else {
                Ok(left)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs, frame, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, frame, ctx)
            }
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            if eval(cond, frame, ctx)?.is_truthy() {
                eval(then, frame, ctx)
            } else {
                eval(otherwise, frame, ctx)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let left = eval(lhs, frame, ctx)?;
            let right = eval(rhs, frame, ctx)?;
            binary(*op, &left, &right)
        }
        Expr::Match {
            target, pattern, ..
        } => {
            let text = eval(target, frame, ctx)?;
            let pattern = eval(pattern, frame, ctx)?;
            match (&text, &pattern) {
                (Value::Str(text), Value::Str(pattern)) => ctx.search(pattern, text).map(Value::Bool),
                _ => Err(RuntimeError::Type(format!(
                    "'~' needs str operands, got {} and {}",
                    text.type_name(),
                    pattern.type_name()
                ))),
            }
        }
        Expr::Call { name, args, .. } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, frame, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            builtins::call(name, &args, ctx)
        }
        Expr::Index(target, index) => {
            let target = eval(target, frame, ctx)?;
            let index = eval(index, frame, ctx)?;
            index_value(&target, &index)
        }
        Expr::Slice { target, start, end } => {
            let target = eval(target, frame, ctx)?;
            let start = match start {
                Some(e) => eval(e, frame, ctx)?,
                None => Value::None,
            };
            let end = match end {
                Some(e) => eval(e, frame, ctx)?,
                None => Value::None,
            };
            slice_value(&target, &start, &end)
        }
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering::{Equal, Greater, Less};

    match op {
        BinOp::Add => left.add(right),
        BinOp::Sub => left.sub(right),
        BinOp::Mul => left.mul(right),
        BinOp::Div => left.div(right),
        BinOp::FloorDiv => left.floor_div(right),
        BinOp::Rem => left.rem(right),
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt => Ok(Value::Bool(left.compare(right)? == Less)),
        BinOp::Le => Ok(Value::Bool(left.compare(right)? != Greater)),
        BinOp::Gt => Ok(Value::Bool(left.compare(right)? == Greater)),
        BinOp::Ge => Ok(Value::Bool(matches!(left.compare(right)?, Greater | Equal))),
        BinOp::In => right.contains(left).map(Value::Bool),
        BinOp::NotIn => right.contains(left).map(|found| Value::Bool(!found)),
    }
}

fn int_operand(value: &Value, what: &str) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::Type(format!("{what} must be an int, got {}", value.type_name()))
    })
}

/// Resolve a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    let signed_len = len as i64;
    let resolved = if index < 0 { index + signed_len } else { index };
    if (0..signed_len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(RuntimeError::Index { index, len })
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let index = int_operand(index, "index")?;
    match target {
        Value::Str(s) => {
            let len = s.chars().count();
            let pos = resolve_index(index, len)?;
            Ok(s
                .chars()
                .nth(pos)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or_default())
        }
        Value::List(items) => {
            let pos = resolve_index(index, items.len())?;
            Ok(items[pos].clone())
        }
        other => Err(RuntimeError::Type(format!(
            "{} is not indexable",
            other.type_name()
        ))),
    }
}

/// Clamp slice bounds the forgiving way: out-of-range bounds never fail.
fn slice_bounds(start: &Value, end: &Value, len: usize) -> Result<(usize, usize), RuntimeError> {
    let clamp = |bound: &Value, default: usize| -> Result<usize, RuntimeError> {
        if bound.is_none() {
            return Ok(default);
        }
        let i = int_operand(bound, "slice bound")?;
        let signed_len = len as i64;
        let resolved = if i < 0 { i + signed_len } else { i };
        Ok(resolved.clamp(0, signed_len) as usize)
    };
    let start = clamp(start, 0)?;
    let end = clamp(end, len)?;
    Ok((start, end.max(start)))
}

fn slice_value(target: &Value, start: &Value, end: &Value) -> Result<Value, RuntimeError> {
    match target {
        Value::Str(s) => {
            let (start, end) = slice_bounds(start, end, s.chars().count())?;
            Ok(Value::Str(s.chars().skip(start).take(end - start).collect()))
        }
        Value::List(items) => {
            let (start, end) = slice_bounds(start, end, items.len())?;
            Ok(Value::List(items[start..end].to_vec()))
        }
        other => Err(RuntimeError::Type(format!(
            "{} cannot be sliced",
            other.type_name()
        ))),
    }
}
