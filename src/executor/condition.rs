//! Condition evaluation for `when` clauses.
//!
//! A deliberately small expression language over a host's resolved
//! variables: boolean connectives, comparisons, membership and a handful of
//! `is` tests. There are no function calls or filters.
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | compare
//! compare := primary [ cmp-op primary | ["not"] "in" primary | "is" ["not"] test ]
//! primary := literal | path | "(" expr ")" | "[" [expr ("," expr)*] "]" | "-" primary
//! test    := defined | undefined | none | true | false
//! ```
//!
//! Referencing an undefined variable is an error unless it is guarded by
//! an `is defined` / `is undefined` test.

use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use thiserror::Error;

use crate::vars::HostVars;

/// Errors raised while parsing or evaluating a condition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("malformed condition '{expr}': {message}")]
    Syntax { expr: String, message: String },

    #[error("condition '{expr}' references undefined variable '{name}'")]
    Undefined { expr: String, name: String },

    #[error("condition '{expr}' cannot be evaluated: {message}")]
    TypeMismatch { expr: String, message: String },
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `is` tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Defined,
    Undefined,
    None,
    True,
    False,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(JsonValue),
    Var(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    In {
        needle: Box<Expr>,
        haystack: Box<Expr>,
        negated: bool,
    },
    Test {
        subject: Box<Expr>,
        test: TestKind,
        negated: bool,
    },
}

/// A parsed `when` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a predicate
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(syntax(source, format!("unexpected {}", token.describe())));
        }
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// The predicate as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The parsed tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against a host's variables
    pub fn evaluate(&self, vars: &HostVars) -> Result<bool, ConditionError> {
        let eval = Evaluator {
            source: &self.source,
            vars,
        };
        let value = eval.eval(&self.expr)?;
        Ok(is_truthy(&value))
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Evaluate a conjunction of predicates. Evaluation stops at the first false.
pub fn evaluate_all(conditions: &[Condition], vars: &HostVars) -> Result<bool, ConditionError> {
    for condition in conditions {
        if !condition.evaluate(vars)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Python-like truthiness
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn syntax(source: &str, message: impl Into<String>) -> ConditionError {
    ConditionError::Syntax {
        expr: source.trim().to_string(),
        message: message.into(),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Minus,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Int(n) => format!("number {}", n),
            Token::Float(n) => format!("number {}", n),
            Token::Op(op) => format!("'{}'", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Minus => "'-'".to_string(),
        }
    }
}

fn lex(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (ch, next) {
                    ('=', Some('=')) => "==",
                    ('!', Some('=')) => "!=",
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err(syntax(source, format!("unexpected '{}'", ch))),
                };
                tokens.push(Token::Op(op));
                i += op.len();
            }
            '"' | '\'' => {
                let quote = ch;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax(source, "unterminated string")),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                value.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // After a '.', digits are a path segment, never a fraction.
                let in_path = matches!(tokens.last(), Some(Token::Dot));
                let is_float = !in_path
                    && chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| syntax(source, format!("invalid number '{}'", text)))?;
                    tokens.push(Token::Float(value));
                } else {
                    let text: String = chars[start..i].iter().collect();
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| syntax(source, format!("invalid number '{}'", text)))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(syntax(source, format!("unexpected '{}'", other))),
        }
    }

    if tokens.is_empty() {
        return Err(syntax(source, "empty expression"));
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    fn peek_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.tokens.get(self.pos + offset), Some(Token::Ident(s)) if s == keyword)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(syntax(
                self.source,
                format!("expected {}, found {}", expected.describe(), token.describe()),
            )),
            None => Err(syntax(
                self.source,
                format!("expected {}, found end of expression", expected.describe()),
            )),
        }
    }

    fn expr(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.unary()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek_keyword("not") {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.primary()?;

        if let Some(Token::Op(op)) = self.peek() {
            let op = match *op {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                _ => CmpOp::Ge,
            };
            self.pos += 1;
            let right = self.primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }

        if self.peek_keyword("in") || (self.peek_keyword("not") && self.peek_keyword_at(1, "in")) {
            let negated = self.peek_keyword("not");
            self.pos += if negated { 2 } else { 1 };
            let haystack = self.primary()?;
            return Ok(Expr::In {
                needle: Box::new(left),
                haystack: Box::new(haystack),
                negated,
            });
        }

        if self.peek_keyword("is") {
            self.pos += 1;
            let negated = self.peek_keyword("not");
            if negated {
                self.pos += 1;
            }
            let test = match self.advance() {
                Some(Token::Ident(name)) => match name.as_str() {
                    "defined" => TestKind::Defined,
                    "undefined" => TestKind::Undefined,
                    "none" | "None" => TestKind::None,
                    "true" | "True" => TestKind::True,
                    "false" | "False" => TestKind::False,
                    other => {
                        return Err(syntax(self.source, format!("unknown test '{}'", other)))
                    }
                },
                Some(token) => {
                    return Err(syntax(
                        self.source,
                        format!("expected a test name after 'is', found {}", token.describe()),
                    ))
                }
                None => return Err(syntax(self.source, "expected a test name after 'is'")),
            };
            return Ok(Expr::Test {
                subject: Box::new(left),
                test,
                negated,
            });
        }

        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Literal(JsonValue::String(s))),
            Some(Token::Int(n)) => Ok(Expr::Literal(JsonValue::from(n))),
            Some(Token::Float(n)) => Ok(Expr::Literal(JsonValue::from(n))),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.primary()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.pos += 1;
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expr()?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(syntax(self.source, "unterminated list")),
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(JsonValue::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(JsonValue::Bool(false))),
                "none" | "None" | "null" => Ok(Expr::Literal(JsonValue::Null)),
                "and" | "or" | "not" | "in" | "is" => Err(syntax(
                    self.source,
                    format!("unexpected keyword '{}'", name),
                )),
                _ => {
                    let mut path = name;
                    while matches!(self.peek(), Some(Token::Dot)) {
                        self.pos += 1;
                        match self.advance() {
                            Some(Token::Ident(segment)) => {
                                path.push('.');
                                path.push_str(&segment);
                            }
                            Some(Token::Int(index)) => {
                                path.push('.');
                                path.push_str(&index.to_string());
                            }
                            _ => {
                                return Err(syntax(
                                    self.source,
                                    format!("invalid attribute access after '{}'", path),
                                ))
                            }
                        }
                    }
                    Ok(Expr::Var(path))
                }
            },
            Some(token) => Err(syntax(
                self.source,
                format!("unexpected {}", token.describe()),
            )),
            None => Err(syntax(self.source, "unexpected end of expression")),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

struct Evaluator<'a> {
    source: &'a str,
    vars: &'a HostVars,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr) -> Result<JsonValue, ConditionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(path) => self.vars.lookup(path).cloned().ok_or_else(|| {
                ConditionError::Undefined {
                    expr: self.source.to_string(),
                    name: path.clone(),
                }
            }),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            Expr::Neg(inner) => match self.eval(inner)? {
                JsonValue::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        i.checked_neg()
                            .map(JsonValue::from)
                            .ok_or_else(|| self.mismatch(format!("cannot negate {}", i)))
                    } else {
                        Ok(JsonValue::from(-n.as_f64().unwrap_or(0.0)))
                    }
                }
                other => Err(self.mismatch(format!("cannot negate {}", type_name(&other)))),
            },
            Expr::Not(inner) => Ok(JsonValue::Bool(!is_truthy(&self.eval(inner)?))),
            Expr::And(left, right) => {
                if !is_truthy(&self.eval(left)?) {
                    return Ok(JsonValue::Bool(false));
                }
                Ok(JsonValue::Bool(is_truthy(&self.eval(right)?)))
            }
            Expr::Or(left, right) => {
                if is_truthy(&self.eval(left)?) {
                    return Ok(JsonValue::Bool(true));
                }
                Ok(JsonValue::Bool(is_truthy(&self.eval(right)?)))
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, &left, &right).map(JsonValue::Bool)
            }
            Expr::In {
                needle,
                haystack,
                negated,
            } => {
                let needle = self.eval(needle)?;
                let haystack = self.eval(haystack)?;
                let found = match &haystack {
                    JsonValue::Array(items) => items.iter().any(|item| loose_eq(item, &needle)),
                    JsonValue::Object(map) => match &needle {
                        JsonValue::String(key) => map.contains_key(key),
                        _ => false,
                    },
                    JsonValue::String(text) => match &needle {
                        JsonValue::String(sub) => text.contains(sub.as_str()),
                        other => {
                            return Err(self.mismatch(format!(
                                "cannot search a string for {}",
                                type_name(other)
                            )))
                        }
                    },
                    other => {
                        return Err(
                            self.mismatch(format!("'in' needs a list, mapping or string, found {}", type_name(other)))
                        )
                    }
                };
                Ok(JsonValue::Bool(found != *negated))
            }
            Expr::Test {
                subject,
                test,
                negated,
            } => {
                let result = match test {
                    TestKind::Defined | TestKind::Undefined => {
                        let defined = match subject.as_ref() {
                            Expr::Var(path) => self.vars.lookup(path).is_some(),
                            other => self.eval(other).is_ok(),
                        };
                        defined == (*test == TestKind::Defined)
                    }
                    TestKind::None => self.eval(subject)?.is_null(),
                    TestKind::True => self.eval(subject)? == JsonValue::Bool(true),
                    TestKind::False => self.eval(subject)? == JsonValue::Bool(false),
                };
                Ok(JsonValue::Bool(result != *negated))
            }
        }
    }

    fn compare(&self, op: CmpOp, left: &JsonValue, right: &JsonValue) -> Result<bool, ConditionError> {
        let accept: fn(Ordering) -> bool = match op {
            CmpOp::Eq => return Ok(loose_eq(left, right)),
            CmpOp::Ne => return Ok(!loose_eq(left, right)),
            CmpOp::Lt => Ordering::is_lt,
            CmpOp::Le => Ordering::is_le,
            CmpOp::Gt => Ordering::is_gt,
            CmpOp::Ge => Ordering::is_ge,
        };

        let ordering = match (left, right) {
            (JsonValue::Number(a), JsonValue::Number(b)) => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b)
            }
            (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
        .ok_or_else(|| {
            self.mismatch(format!(
                "cannot order {} and {}",
                type_name(left),
                type_name(right)
            ))
        })?;

        Ok(accept(ordering))
    }

    fn mismatch(&self, message: String) -> ConditionError {
        ConditionError::TypeMismatch {
            expr: self.source.to_string(),
            message,
        }
    }
}

/// Equality that treats `80` and `80.0` as equal
fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "none",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}
