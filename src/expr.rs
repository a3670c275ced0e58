//! Lexer, AST and parser for the line expression language.
//!
//! A program is a `;`-separated list of statements:
//! ```text
//! total += int(split(s)[2]); s = upper(s)
//! s[0:10] if len(s) > 10 else s
//! "ERR" in s and s ~ "code=(\d+)"
//! ```
//!
//! Operator precedence (lowest → highest):
//!   conditional  →  or  →  and  →  not  →  comparison / in / ~  →
//!   additive  →  multiplicative  →  unary minus  →  postfix  →  primary
//!
//! Everything that can be checked without input is checked here: syntax,
//! function names and arity, assignments to `n`, and regex literals.

use regex::Regex;

use crate::builtins;
use crate::error::CompileError;
use crate::value::Value;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    And,
    Or,
    Not,
    In,
    If,
    Else,
    True,
    False,
    None,

    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Tilde,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {n}"),
            Token::Float(x) => format!("number {x}"),
            Token::Str(_) => "string".to_string(),
            Token::Ident(name) => format!("'{name}'"),
            Token::Eof => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::In => "in",
            Token::If => "if",
            Token::Else => "else",
            Token::True => "true",
            Token::False => "false",
            Token::None => "none",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::Tilde => "~",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Dot => ".",
            Token::Int(_) | Token::Float(_) | Token::Str(_) | Token::Ident(_) | Token::Eof => "",
        }
    }
}

/// A token with the 1-based character column it starts at.
#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    column: usize,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char, column: usize) -> Result<Token, CompileError> {
        let mut s = String::from(first);
        let mut is_float = false;

        while let Some(c @ ('0'..='9' | '_')) = self.peek() {
            if c != '_' {
                s.push(c);
            }
            self.pos += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            while let Some(c @ '0'..='9') = self.peek() {
                s.push(c);
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && (matches!(self.peek2(), Some('0'..='9'))
                || (matches!(self.peek2(), Some('+' | '-'))
                    && matches!(self.src.get(self.pos + 2).copied(), Some('0'..='9'))))
        {
            is_float = true;
            s.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                s.push(sign);
                self.pos += 1;
            }
            while let Some(c @ '0'..='9') = self.peek() {
                s.push(c);
                self.pos += 1;
            }
        }

        if is_float {
            s.parse()
                .map(Token::Float)
                .map_err(|_| CompileError::new(format!("invalid number '{s}'"), column))
        } else {
            s.parse()
                .map(Token::Int)
                .map_err(|_| CompileError::new(format!("integer literal too large: {s}"), column))
        }
    }

    fn read_string(&mut self, quote: char, column: usize) -> Result<Token, CompileError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(CompileError::new("unterminated string", column)),
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => s.push(c),
                    // Unknown escapes are kept verbatim so regexes like "\d" work.
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => return Err(CompileError::new("unterminated string", column)),
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        match s.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "if" => Token::If,
            "else" => Token::Else,
            "true" | "True" => Token::True,
            "false" | "False" => Token::False,
            "none" | "None" => Token::None,
            _ => Token::Ident(s),
        }
    }

    fn next_token(&mut self) -> Result<Spanned, CompileError> {
        self.skip_ws();
        let column = self.pos + 1;
        let ch = match self.advance() {
            None => {
                return Ok(Spanned {
                    token: Token::Eof,
                    column,
                });
            }
            Some(c) => c,
        };

        let token = match ch {
            '0'..='9' => self.read_number(ch, column)?,
            '"' | '\'' => self.read_string(ch, column)?,
            c if c.is_alphabetic() || c == '_' => self.read_ident(c),
            '+' if self.eat('=') => Token::PlusAssign,
            '+' => Token::Plus,
            '-' if self.eat('=') => Token::MinusAssign,
            '-' => Token::Minus,
            '*' if self.eat('=') => Token::StarAssign,
            '*' => Token::Star,
            '/' if self.eat('/') => Token::SlashSlash,
            '/' if self.eat('=') => Token::SlashAssign,
            '/' => Token::Slash,
            '%' if self.eat('=') => Token::PercentAssign,
            '%' => Token::Percent,
            '~' => Token::Tilde,
            '=' if self.eat('=') => Token::Eq,
            '=' => Token::Assign,
            '!' if self.eat('=') => Token::Ne,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '.' => Token::Dot,
            c => return Err(CompileError::new(format!("unexpected character '{c}'"), column)),
        };
        Ok(Spanned { token, column })
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t.token == Token::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Assignment operator; `Set` is plain `=`, the rest are `op=`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `target ~ pattern`
    Match {
        target: Box<Expr>,
        pattern: Box<Expr>,
        column: usize,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        column: usize,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest nesting the parser accepts, both in its own recursion and in the
/// height of the resulting tree.
pub const MAX_DEPTH: usize = 64;

/// Height of an expression tree, computed without recursion.
fn height(expr: &Expr) -> usize {
    let mut max: usize = 0;
    let mut stack: Vec<(&Expr, usize)> = vec![(expr, 1)];
    while let Some((expr, depth)) = stack.pop() {
        max = max.max(depth);
        let below = depth + 1;
        match expr {
            Expr::Literal(_) | Expr::Var(_) => {}
            Expr::List(items) | Expr::Call { args: items, .. } => {
                stack.extend(items.iter().map(|item| (item, below)));
            }
            Expr::Unary(_, operand) => stack.push((&**operand, below)),
            Expr::Binary(_, lhs, rhs)
            | Expr::And(lhs, rhs)
            | Expr::Or(lhs, rhs)
            | Expr::Index(lhs, rhs)
            | Expr::Match {
                target: lhs,
                pattern: rhs,
                ..
            } => {
                stack.push((&**lhs, below));
                stack.push((&**rhs, below));
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                stack.push((&**cond, below));
                stack.push((&**then, below));
                stack.push((&**otherwise, below));
            }
            Expr::Slice { target, start, end } => {
                stack.push((&**target, below));
                stack.extend(start.iter().chain(end.iter()).map(|bound| (&**bound, below)));
            }
        }
    }
    max
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn column(&self) -> usize {
        self.tokens[self.pos].column
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> CompileError {
        CompileError::new(
            format!("unexpected {}", self.peek().describe()),
            self.column(),
        )
    }

    fn too_deep(&self) -> CompileError {
        CompileError::new("expression nested too deeply", self.column())
    }

    /// Run a recursive parse step one level deeper.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        self.checked(result?)
    }

    /// Reject a freshly built node whose tree is too tall.
    fn checked(&self, expr: Expr) -> Result<Expr, CompileError> {
        if height(&expr) > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(expr)
    }

    fn expect(&mut self, token: Token) -> Result<(), CompileError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(CompileError::new(
                format!(
                    "expected '{}' but found {}",
                    token.symbol(),
                    self.peek().describe()
                ),
                self.column(),
            ))
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Semicolon) {}
            if self.peek() == &Token::Eof {
                break;
            }
            stmts.push(self.parse_stmt()?);
            if self.peek() != &Token::Eof && !matches!(self.peek(), Token::Semicolon) {
                return Err(self.unexpected());
            }
        }
        if stmts.is_empty() {
            return Err(CompileError::new("empty expression", 1));
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.peek_at(1) {
                Token::Assign => Some(AssignOp::Set),
                Token::PlusAssign => Some(AssignOp::Add),
                Token::MinusAssign => Some(AssignOp::Sub),
                Token::StarAssign => Some(AssignOp::Mul),
                Token::SlashAssign => Some(AssignOp::Div),
                Token::PercentAssign => Some(AssignOp::Rem),
                _ => None,
            };
            if let Some(op) = op {
                if name == "n" {
                    return Err(CompileError::new(
                        "'n' is the record number and cannot be assigned",
                        self.column(),
                    ));
                }
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                return Ok(Stmt::Assign { name, op, value });
            }
        }
        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, CompileError> {
        let then = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(Token::Else)?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = self.checked(Expr::Or(Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = self.checked(Expr::And(Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    /// Comparison operators do not chain: `a < b < c` is rejected.
    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_additive()?;
        let column = self.column();
        let op = match self.peek() {
            Token::Eq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Lt => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Gt => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            Token::In => Some(BinOp::In),
            Token::Not if self.peek_at(1) == &Token::In => Some(BinOp::NotIn),
            Token::Tilde => None,
            _ => return Ok(lhs),
        };
        if op == Some(BinOp::NotIn) {
            self.advance();
        }
        self.advance();
        let rhs = self.parse_additive()?;

        if self.is_comparison() {
            return Err(CompileError::new(
                "comparison operators cannot be chained",
                self.column(),
            ));
        }

        Ok(match op {
            Some(op) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
            None => Expr::Match {
                target: Box::new(lhs),
                pattern: Box::new(rhs),
                column,
            },
        })
    }

    fn is_comparison(&self) -> bool {
        matches!(
            self.peek(),
            Token::Eq
                | Token::Ne
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::In
                | Token::Tilde
        ) || (self.peek() == &Token::Not && self.peek_at(1) == &Token::In)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = self.checked(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.checked(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        if self.eat(&Token::Plus) {
            return self.nested(Self::parse_unary);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LBracket => {
                    self.advance();
                    let subscripted = self.parse_subscript(expr)?;
                    expr = self.checked(subscripted)?;
                }
                Token::Dot => {
                    self.advance();
                    let column = self.column();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        other => {
                            return Err(CompileError::new(
                                format!("expected method name after '.', found {}", other.describe()),
                                column,
                            ));
                        }
                    };
                    self.expect(Token::LParen)?;
                    let mut args = vec![expr];
                    args.extend(self.parse_args()?);
                    expr = self.checked(Expr::Call { name, args, column })?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parse the inside of `[...]` after the opening bracket.
    fn parse_subscript(&mut self, target: Expr) -> Result<Expr, CompileError> {
        let start = if matches!(self.peek(), Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        if self.eat(&Token::Colon) {
            let end = if matches!(self.peek(), Token::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect(Token::RBracket)?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start,
                end,
            });
        }

        self.expect(Token::RBracket)?;
        match start {
            Some(index) => Ok(Expr::Index(Box::new(target), index)),
            None => Err(self.unexpected()),
        }
    }

    /// Parse call arguments after the opening parenthesis.
    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.parse_sequence(Token::RParen)
    }

    fn parse_sequence(&mut self, close: Token) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat(&close) {
                return Ok(items);
            }
            if !self.eat(&Token::Comma) {
                return Err(CompileError::new(
                    format!(
                        "expected ',' or '{}' but found {}",
                        close.symbol(),
                        self.peek().describe()
                    ),
                    self.column(),
                ));
            }
            // Trailing comma.
            if self.eat(&close) {
                return Ok(items);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let column = self.column();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::None)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args, column })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.parse_sequence(Token::RBracket)?)),
            other => Err(CompileError::new(
                format!("unexpected {}", other.describe()),
                column,
            )),
        }
    }
}

// ── Checks ────────────────────────────────────────────────────────────────────

fn check_regex_literal(pattern: &Expr, column: usize) -> Result<(), CompileError> {
    if let Expr::Literal(Value::Str(p)) = pattern {
        Regex::new(p).map_err(|e| CompileError::new(format!("invalid regex '{p}': {e}"), column))?;
    }
    Ok(())
}

fn check_expr(expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => Ok(()),
        Expr::List(items) => items.iter().try_for_each(check_expr),
        Expr::Unary(_, operand) => check_expr(operand),
        Expr::Binary(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            check_expr(lhs)?;
            check_expr(rhs)
        }
        Expr::Index(target, index) => {
            check_expr(target)?;
            check_expr(index)
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            check_expr(cond)?;
            check_expr(then)?;
            check_expr(otherwise)
        }
        Expr::Match {
            target,
            pattern,
            column,
        } => {
            check_expr(target)?;
            check_expr(pattern)?;
            check_regex_literal(pattern, *column)
        }
        Expr::Slice { target, start, end } => {
            check_expr(target)?;
            if let Some(start) = start {
                check_expr(start)?;
            }
            if let Some(end) = end {
                check_expr(end)?;
            }
            Ok(())
        }
        Expr::Call { name, args, column } => {
            let spec = builtins::lookup(name).ok_or_else(|| {
                CompileError::new(format!("unknown function '{name}'"), *column)
            })?;
            if !spec.accepts(args.len()) {
                return Err(CompileError::new(
                    format!("{name}() {}, got {}", spec.arity_text(), args.len()),
                    *column,
                ));
            }
            if let Some(pos) = spec.pattern_arg {
                check_regex_literal(&args[pos], *column)?;
            }
            args.iter().try_for_each(check_expr)
        }
    }
}

/// Parse and check a program.
pub fn parse_program(text: &str) -> Result<Vec<Stmt>, CompileError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let stmts = parser.parse_program()?;
    for stmt in &stmts {
        match stmt {
            Stmt::Expr(expr) | Stmt::Assign { value: expr, .. } => check_expr(expr)?,
        }
    }
    Ok(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> Expr {
        match parse_program(text).unwrap().remove(0) {
            Stmt::Expr(expr) => expr,
            other => panic!("Expected expression, got {other:?}"),
        }
    }

    fn compile_err(text: &str) -> CompileError {
        match parse_program(text) {
            Err(e) => e,
            Ok(stmts) => panic!("Expected compile error for {text:?}, got {stmts:?}"),
        }
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens: Vec<Token> = Lexer::new("a // b += 1.5e3 != 'x'")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::SlashSlash,
                Token::Ident("b".to_string()),
                Token::PlusAssign,
                Token::Float(1500.0),
                Token::Ne,
                Token::Str("x".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse_one(r#""a\tb\n\"q\"""#),
            Expr::Literal(Value::from("a\tb\n\"q\""))
        );
        // Unknown escapes survive for regex use.
        assert_eq!(parse_one(r#""\d+""#), Expr::Literal(Value::from("\\d+")));
        assert_eq!(parse_one("'héllo'"), Expr::Literal(Value::from("héllo")));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_one("1 + 2 * 3");
        assert_eq!(
            expr,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Literal(Value::Int(1))),
                Box::new(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Literal(Value::Int(2))),
                    Box::new(Expr::Literal(Value::Int(3))),
                )),
            )
        );
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = parse_one("not s == 'x'");
        assert!(matches!(expr, Expr::Unary(UnaryOp::Not, inner) if matches!(*inner, Expr::Binary(BinOp::Eq, _, _))));
    }

    #[test]
    fn test_not_in() {
        let expr = parse_one("'x' not in s");
        assert!(matches!(expr, Expr::Binary(BinOp::NotIn, _, _)));
    }

    #[test]
    fn test_conditional() {
        let expr = parse_one("s if n > 1 else none");
        match expr {
            Expr::Conditional { then, otherwise, .. } => {
                assert_eq!(*then, Expr::Var("s".to_string()));
                assert_eq!(*otherwise, Expr::Literal(Value::None));
            }
            other => panic!("Expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_method_call_desugars() {
        let expr = parse_one("s.replace('a', 'b')");
        match expr {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "replace");
                assert_eq!(args.len(), 3);
                assert_eq!(args[0], Expr::Var("s".to_string()));
            }
            other => panic!("Expected Call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_and_slices() {
        assert!(matches!(parse_one("s[0]"), Expr::Index(_, _)));
        assert!(matches!(
            parse_one("s[1:]"),
            Expr::Slice { start: Some(_), end: None, .. }
        ));
        assert!(matches!(
            parse_one("s[:-1]"),
            Expr::Slice { start: None, end: Some(_), .. }
        ));
        assert!(matches!(
            parse_one("s[:]"),
            Expr::Slice { start: None, end: None, .. }
        ));
    }

    #[test]
    fn test_statements() {
        let stmts = parse_program("total += 1; s = upper(s);").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], Stmt::Assign { name, op: AssignOp::Add, .. } if name == "total"));
        assert!(matches!(&stmts[1], Stmt::Assign { name, op: AssignOp::Set, .. } if name == "s"));
    }

    #[test]
    fn test_list_literal() {
        assert_eq!(
            parse_one("[1, 'a',]"),
            Expr::List(vec![
                Expr::Literal(Value::Int(1)),
                Expr::Literal(Value::from("a")),
            ])
        );
    }

    #[test]
    fn test_syntax_errors_report_column() {
        let err = compile_err("s +");
        assert_eq!(err.column, 4);
        assert!(err.message.contains("end of expression"), "Got: {}", err.message);

        let err = compile_err("upper(s");
        assert_eq!(err.message, "expected ',' or ')' but found end of expression");

        assert_eq!(compile_err("'abc").message, "unterminated string");
        assert_eq!(compile_err("s $ 1").column, 3);
        assert_eq!(compile_err("a b").message, "unexpected 'b'");
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}1{}", "(".repeat(MAX_DEPTH - 2), ")".repeat(MAX_DEPTH - 2));
        assert!(parse_program(&ok).is_ok());
        assert!(parse_program(&format!("{}1", "-".repeat(MAX_DEPTH - 2))).is_ok());

        let deep_parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let deep_negation = format!("{}1", "-".repeat(100_000));
        let deep_not = format!("{}s", "not ".repeat(100_000));
        let long_sum = format!("1{}", " + 1".repeat(100_000));
        let long_index = format!("s{}", "[0]".repeat(100_000));
        let deep_calls = format!("{}s{}", "upper(".repeat(100_000), ")".repeat(100_000));
        for text in [deep_parens, deep_negation, deep_not, long_sum, long_index, deep_calls] {
            let err = compile_err(&text);
            assert_eq!(err.message, "expression nested too deeply");
        }
    }

    #[test]
    fn test_empty_program_is_an_error() {
        assert_eq!(compile_err("").message, "empty expression");
        assert_eq!(compile_err(" ; ").message, "empty expression");
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let err = compile_err("1 < n < 3");
        assert!(err.message.contains("chained"));
    }

    #[test]
    fn test_unknown_function() {
        let err = compile_err("shout(s)");
        assert_eq!(err.message, "unknown function 'shout'");
        assert_eq!(err.column, 1);
    }

    #[test]
    fn test_wrong_arity() {
        let err = compile_err("replace(s, 'a')");
        assert!(err.message.starts_with("replace()"), "Got: {}", err.message);
        assert!(parse_program("split(s)").is_ok());
        assert!(parse_program("split(s, ',')").is_ok());
        assert!(parse_program("split(s, ',', 3)").is_err());
    }

    #[test]
    fn test_assign_to_record_number_rejected() {
        let err = compile_err("n = 3");
        assert!(err.message.contains("'n'"));
    }

    #[test]
    fn test_invalid_regex_literal() {
        let err = compile_err("s ~ '('");
        assert!(err.message.starts_with("invalid regex"), "Got: {}", err.message);
        assert_eq!(err.column, 3);

        assert!(parse_program("sub('[', 'x', s)").is_err());
        assert!(parse_program("split_re(s, '(')").is_err());
        // Dynamic patterns are checked at runtime.
        assert!(parse_program("s ~ p").is_ok());
    }
}
