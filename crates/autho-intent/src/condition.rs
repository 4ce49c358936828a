//! Step conditions.
//!
//! A condition is a small boolean expression over the variable context.  The
//! grammar is closed; nothing in a condition can execute code:
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | cmp
//! cmp     := primary (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in") primary)?
//! primary := number | string | true | false | null | "-" primary
//!          | func "(" expr ")" | path | "(" expr ")"
//! path    := ident ("." ident | "[" (integer | string) "]")*
//! func    := "len" | "defined" | "empty"
//! ```
//!
//! Variables are looked up in the context.  A leading `context` segment
//! names the context itself unless a variable called `context` exists, so
//! `context.rows`, `context['rows']` and `rows` are equivalent.
//!
//! Truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
//! Undefined variables, unknown functions, type mismatches and syntax errors
//! are reported as [`IntentError::Condition`].

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value;

use crate::context::VariableContext;
use crate::error::{IntentError, Result};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition expression.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|reason| condition_error(source, reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or().map_err(|reason| condition_error(source, reason))?;
        if let Some(tok) = parser.peek() {
            return Err(condition_error(source, format!("unexpected token {tok:?}")));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against a context.
    pub fn evaluate(&self, ctx: &VariableContext) -> Result<bool> {
        eval_bool(&self.expr, ctx).map_err(|reason| condition_error(&self.source, reason))
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse and evaluate in one go.
pub fn evaluate(source: &str, ctx: &VariableContext) -> Result<bool> {
    Condition::parse(source)?.evaluate(ctx)
}

fn condition_error(expression: &str, reason: String) -> IntentError {
    IntentError::Condition {
        expression: expression.to_string(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Minus,
    Cmp(CmpOp),
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => push(&mut chars, &mut tokens, Token::LParen),
            ')' => push(&mut chars, &mut tokens, Token::RParen),
            '[' => push(&mut chars, &mut tokens, Token::LBracket),
            ']' => push(&mut chars, &mut tokens, Token::RBracket),
            '.' => push(&mut chars, &mut tokens, Token::Dot),
            '-' => push(&mut chars, &mut tokens, Token::Minus),
            '=' | '!' | '<' | '>' => {
                chars.next();
                let eq = chars.next_if_eq(&'=').is_some();
                tokens.push(match (c, eq) {
                    ('=', true) => Token::Cmp(CmpOp::Eq),
                    ('!', true) => Token::Cmp(CmpOp::Ne),
                    ('<', true) => Token::Cmp(CmpOp::Le),
                    ('>', true) => Token::Cmp(CmpOp::Ge),
                    ('<', false) => Token::Cmp(CmpOp::Lt),
                    ('>', false) => Token::Cmp(CmpOp::Gt),
                    ('!', false) => Token::Not,
                    _ => return Err("single `=` is not an operator; use `==`".into()),
                });
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&c).is_none() {
                    return Err(format!("expected `{c}{c}`"));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars, c)?));
            }
            c if c.is_ascii_digit() => tokens.push(Token::Number(lex_number(&mut chars)?)),
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                    ident.push(ch);
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::Cmp(CmpOp::In),
                    _ => Token::Ident(ident),
                });
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

fn push(chars: &mut Peekable<Chars<'_>>, tokens: &mut Vec<Token>, token: Token) {
    chars.next();
    tokens.push(token);
}

fn lex_string(chars: &mut Peekable<Chars<'_>>, quote: char) -> std::result::Result<String, String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err("unterminated string literal".into()),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err("unterminated string literal".into()),
            },
            Some(c) if c == quote => return Ok(out),
            Some(c) => out.push(c),
        }
    }
}

fn lex_number(chars: &mut Peekable<Chars<'_>>) -> std::result::Result<f64, String> {
    let mut raw = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || *c == '_') {
        if c != '_' {
            raw.push(c);
        }
    }
    // A dot only continues the number when a digit follows; `rows.0.id` is a path.
    let mut ahead = chars.clone();
    if ahead.next() == Some('.') && ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
        chars.next();
        raw.push('.');
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
            raw.push(c);
        }
    }
    raw.parse::<f64>().map_err(|_| format!("invalid number `{raw}`"))
}

// ---------------------------------------------------------------------------
// AST and parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Len,
    Defined,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String, Vec<Segment>),
    Neg(Box<Expr>),
    Call(Func, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {:?}", self.peek()))
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        if let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.parse_primary()?;
            return Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.parse_primary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_ident(name),
            other => Err(format!("expected a value, found {other:?}")),
        }
    }

    fn parse_ident(&mut self, name: String) -> ParseResult<Expr> {
        match name.as_str() {
            "true" | "True" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" | "False" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" | "None" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        if self.eat(&Token::LParen) {
            let func = match name.as_str() {
                "len" => Func::Len,
                "defined" => Func::Defined,
                "empty" => Func::Empty,
                other => return Err(format!("unknown function `{other}`")),
            };
            let arg = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(Expr::Call(func, Box::new(arg)));
        }

        let mut segments = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.next() {
                    Some(Token::Ident(key)) => segments.push(Segment::Key(key)),
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push(Segment::Index(n as usize));
                    }
                    other => return Err(format!("expected a field name after `.`, found {other:?}")),
                }
            } else if self.eat(&Token::LBracket) {
                match self.next() {
                    Some(Token::Str(key)) => segments.push(Segment::Key(key)),
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push(Segment::Index(n as usize));
                    }
                    other => return Err(format!("expected an index or key in `[]`, found {other:?}")),
                }
                self.expect(&Token::RBracket)?;
            } else {
                break;
            }
        }
        Ok(Expr::Path(name, segments))
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

type EvalResult<T> = std::result::Result<T, String>;

fn eval_bool(expr: &Expr, ctx: &VariableContext) -> EvalResult<bool> {
    match expr {
        Expr::And(lhs, rhs) => Ok(eval_bool(lhs, ctx)? && eval_bool(rhs, ctx)?),
        Expr::Or(lhs, rhs) => Ok(eval_bool(lhs, ctx)? || eval_bool(rhs, ctx)?),
        Expr::Not(inner) => Ok(!eval_bool(inner, ctx)?),
        other => Ok(truthy(&eval(other, ctx)?)),
    }
}

fn eval(expr: &Expr, ctx: &VariableContext) -> EvalResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(root, segments) => {
            resolve_path(root, segments, ctx).ok_or_else(|| format!("undefined variable `{}`", render_path(root, segments)))
        }
        Expr::Neg(inner) => match eval(inner, ctx)? {
            Value::Number(n) => n
                .as_i64()
                .map(|i| i.checked_neg().map_or_else(|| Value::from(-(i as f64)), Value::from))
                .or_else(|| n.as_f64().map(|f| Value::from(-f)))
                .ok_or_else(|| "cannot negate number".to_string()),
            other => Err(format!("cannot negate {}", type_name(&other))),
        },
        Expr::Call(func, arg) => eval_call(*func, arg, ctx),
        Expr::Compare(op, lhs, rhs) => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
        Expr::And(..) | Expr::Or(..) | Expr::Not(..) => eval_bool(expr, ctx).map(Value::Bool),
    }
}

fn eval_call(func: Func, arg: &Expr, ctx: &VariableContext) -> EvalResult<Value> {
    match func {
        Func::Defined => match arg {
            Expr::Path(root, segments) => Ok(Value::Bool(resolve_path(root, segments, ctx).is_some())),
            _ => Err("defined() takes a variable name".into()),
        },
        Func::Empty => Ok(Value::Bool(!truthy(&eval(arg, ctx)?))),
        Func::Len => match eval(arg, ctx)? {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Object(map) => Ok(Value::from(map.len())),
            other => Err(format!("len() of {}", type_name(&other))),
        },
    }
}

fn resolve_path(root: &str, segments: &[Segment], ctx: &VariableContext) -> Option<Value> {
    let (mut current, rest) = match ctx.get(root) {
        Some(v) => (v.clone(), segments),
        None if root == "context" => match segments.split_first() {
            Some((Segment::Key(key), rest)) => (ctx.get(key)?.clone(), rest),
            Some((Segment::Index(_), _)) => return None,
            None => (ctx.to_value(), segments),
        },
        None => return None,
    };

    for segment in rest {
        current = match (segment, &current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?.clone(),
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?.clone(),
            (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn render_path(root: &str, segments: &[Segment]) -> String {
    let mut out = root.to_string();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            Segment::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> EvalResult<bool> {
    match op {
        CmpOp::Eq => Ok(loosely_equal(lhs, rhs)),
        CmpOp::Ne => Ok(!loosely_equal(lhs, rhs)),
        CmpOp::In => match rhs {
            Value::Array(items) => Ok(items.iter().any(|item| loosely_equal(lhs, item))),
            Value::String(haystack) => match lhs {
                Value::String(needle) => Ok(haystack.contains(needle.as_str())),
                other => Err(format!("`in` string requires a string, got {}", type_name(other))),
            },
            Value::Object(map) => match lhs {
                Value::String(key) => Ok(map.contains_key(key)),
                other => Err(format!("`in` mapping requires a string key, got {}", type_name(other))),
            },
            other => Err(format!("`in` requires a list, string or mapping, got {}", type_name(other))),
        },
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(lhs, rhs)?;
            Ok(match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn order(lhs: &Value, rhs: &Value) -> EvalResult<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).ok_or_else(|| "numbers are not comparable".to_string())
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(format!("cannot order {} against {}", type_name(a), type_name(b))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
