//! Runtime values of the expression language.
//!
//! Values are dynamically typed. Unlike shell-style languages there is no
//! implicit string/number coercion in arithmetic: `"1" + 1` is a type error,
//! and conversions go through `int()`, `float()` and `str()`.

use std::cmp::Ordering;
use std::fmt;

use crate::error::RuntimeError;

/// Largest string, in bytes, that `str * int` may build.
pub const MAX_REPEAT_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The "no output" sentinel.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Value::Str(s) => write!(f, "{s:?}")?,
                        Value::None => f.write_str("none")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("]")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    /// Parse command-line text: integers and floats become numbers,
    /// anything else stays a string.
    pub fn from_text(text: &str) -> Self {
        if let Ok(n) = text.parse::<i64>() {
            Value::Int(n)
        } else if let Ok(x) = text.parse::<f64>()
            && text.chars().any(|c| c.is_ascii_digit())
        {
            Value::Float(x)
        } else {
            Value::Str(text.to_string())
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view, with bools counting as 0 and 1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn type_error(op: &str, lhs: &Value, rhs: &Value) -> RuntimeError {
        RuntimeError::Type(format!(
            "unsupported operand types for {op}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))
    }

    fn float_pair(&self, rhs: &Value) -> Option<(f64, f64)> {
        if self.is_numeric() && rhs.is_numeric() {
            Some((self.as_f64()?, rhs.as_f64()?))
        } else {
            None
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_add(*b).map(Value::Int).ok_or(RuntimeError::Overflow)
            }
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => match self.float_pair(rhs) {
                Some((a, b)) => Ok(Value::Float(a + b)),
                None => Err(Self::type_error("+", self, rhs)),
            },
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_sub(*b).map(Value::Int).ok_or(RuntimeError::Overflow)
            }
            _ => match self.float_pair(rhs) {
                Some((a, b)) => Ok(Value::Float(a - b)),
                None => Err(Self::type_error("-", self, rhs)),
            },
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_mul(*b).map(Value::Int).ok_or(RuntimeError::Overflow)
            }
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = usize::try_from(*n).unwrap_or(0);
                let len = s.len().checked_mul(count).ok_or(RuntimeError::Overflow)?;
                if len > MAX_REPEAT_LEN {
                    return Err(RuntimeError::Value(format!(
                        "repeated string would be {len} bytes, limit is {MAX_REPEAT_LEN}"
                    )));
                }
                Ok(Value::Str(s.repeat(count)))
            }
            _ => match self.float_pair(rhs) {
                Some((a, b)) => Ok(Value::Float(a * b)),
                None => Err(Self::type_error("*", self, rhs)),
            },
        }
    }

    /// True division, always a float.
    pub fn div(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        let (a, b) = self
            .float_pair(rhs)
            .ok_or_else(|| Self::type_error("/", self, rhs))?;
        if b == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Ok(Value::Float(a / b))
    }

    /// Floor division.
    pub fn floor_div(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                let q = a.checked_div(*b).ok_or(RuntimeError::Overflow)?;
                if a % b != 0 && ((*a < 0) != (*b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            _ => {
                let (a, b) = self
                    .float_pair(rhs)
                    .ok_or_else(|| Self::type_error("//", self, rhs))?;
                if b == 0.0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Ok(Value::Float((a / b).floor()))
            }
        }
    }

    /// Modulo; the result takes the sign of the divisor.
    pub fn rem(&self, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                let r = a.checked_rem(*b).ok_or(RuntimeError::Overflow)?;
                if r != 0 && ((r < 0) != (*b < 0)) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
            _ => {
                let (a, b) = self
                    .float_pair(rhs)
                    .ok_or_else(|| Self::type_error("%", self, rhs))?;
                if b == 0.0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    Ok(Value::Float(r + b))
                } else {
                    Ok(Value::Float(r))
                }
            }
        }
    }

    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(RuntimeError::Type(format!(
                "bad operand type for unary -: {}",
                other.type_name()
            ))),
        }
    }

    /// Ordering for `< <= > >=`: numbers with numbers, strings with strings.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering, RuntimeError> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => {
                let (a, b) = self.float_pair(rhs).ok_or_else(|| {
                    RuntimeError::Type(format!(
                        "cannot compare {} with {}",
                        self.type_name(),
                        rhs.type_name()
                    ))
                })?;
                a.partial_cmp(&b)
                    .ok_or_else(|| RuntimeError::Value("cannot compare NaN".to_string()))
            }
        }
    }

    /// Membership test for `needle in self`.
    pub fn contains(&self, needle: &Value) -> Result<bool, RuntimeError> {
        match (self, needle) {
            (Value::Str(hay), Value::Str(n)) => Ok(hay.contains(n.as_str())),
            (Value::List(items), n) => Ok(items.iter().any(|item| item == n)),
            _ => Err(RuntimeError::Type(format!(
                "'in' needs a str or list on the right, got {} in {}",
                needle.type_name(),
                self.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(1e16).to_string(), "10000000000000000.0");
        assert_eq!(Value::Float(-2e20).to_string(), "-200000000000000000000.0");
        assert_eq!(Value::from("hi").to_string(), "hi");
        let list = Value::List(vec![Value::from("a"), Value::Int(1), Value::None]);
        assert_eq!(list.to_string(), r#"["a", 1, none]"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn test_from_text() {
        assert_eq!(Value::from_text("42"), Value::Int(42));
        assert_eq!(Value::from_text("1.5"), Value::Float(1.5));
        assert_eq!(Value::from_text("inf"), Value::from("inf"));
        assert_eq!(Value::from_text("abc"), Value::from("abc"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Value::Int(2).add(&Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(Value::Int(2).add(&Value::Float(0.5)).unwrap(), Value::Float(2.5));
        assert_eq!(
            Value::from("ab").add(&Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(Value::from("ab").mul(&Value::Int(3)).unwrap(), Value::from("ababab"));
        assert_eq!(Value::Int(7).div(&Value::Int(2)).unwrap(), Value::Float(3.5));
        assert!(matches!(
            Value::from("1").add(&Value::Int(1)),
            Err(RuntimeError::Type(_))
        ));
        assert_eq!(
            Value::Int(i64::MAX).add(&Value::Int(1)),
            Err(RuntimeError::Overflow)
        );
    }

    #[test]
    fn test_string_repeat_is_bounded() {
        assert_eq!(Value::Int(2).mul(&Value::from("ab")).unwrap(), Value::from("abab"));
        assert_eq!(Value::from("ab").mul(&Value::Int(-1)).unwrap(), Value::from(""));
        assert_eq!(
            Value::from("abc").mul(&Value::Int(i64::MAX)),
            Err(RuntimeError::Overflow)
        );
        assert!(matches!(
            Value::from("a").mul(&Value::Int(i64::MAX)),
            Err(RuntimeError::Value(_))
        ));
        let at_limit = i64::try_from(MAX_REPEAT_LEN).unwrap();
        assert!(matches!(
            Value::from("ab").mul(&Value::Int(at_limit)),
            Err(RuntimeError::Value(_))
        ));
    }

    #[test]
    fn test_floor_div_and_rem_follow_divisor_sign() {
        assert_eq!(Value::Int(-7).floor_div(&Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(Value::Int(7).floor_div(&Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(Value::Int(-7).rem(&Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(Value::Int(7).rem(&Value::Int(-3)).unwrap(), Value::Int(-2));
        assert_eq!(Value::Float(-1.0).rem(&Value::Float(3.0)).unwrap(), Value::Float(2.0));
        assert_eq!(
            Value::Int(1).rem(&Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        );
        assert_eq!(
            Value::Int(1).div(&Value::Float(0.0)),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn test_compare_and_equality() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)).unwrap(), Ordering::Less);
        assert_eq!(
            Value::from("b").compare(&Value::from("a")).unwrap(),
            Ordering::Greater
        );
        assert!(Value::Int(1).compare(&Value::from("a")).is_err());
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::from("1"));
    }

    #[test]
    fn test_contains() {
        assert!(Value::from("hello").contains(&Value::from("ell")).unwrap());
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(list.contains(&Value::Int(2)).unwrap());
        assert!(!list.contains(&Value::Int(3)).unwrap());
        assert!(Value::Int(1).contains(&Value::Int(1)).is_err());
    }
}
