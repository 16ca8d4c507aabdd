//! The condition expression language.
//!
//! Condition blocks evaluate author-written expressions like
//! `<agent.content> == 'yes' && attempts < 3`. The grammar is deliberately
//! small and closed: literals, references, comparisons, boolean connectives,
//! and parentheses. There is no function call syntax, no assignment, and no
//! host access — the evaluation scope is exactly the [`ReferenceSource`].
//!
//! Bare identifiers resolve, in priority order, against iteration variables,
//! the caller's locals (the implicit upstream output fields), and environment
//! variables.

use serde_json::Value;

use crate::error::ExpressionError;
use crate::path;
use crate::source::ReferenceSource;
use crate::template::angle_token;
use crate::value::{as_number, to_boolean, type_name};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Ident(String),
    Ref(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Ident(String),
    Reference(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

fn lex(text: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse(
                        "single '=' is not an operator; use '=='".into(),
                    ));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse("expected '&&'".into()));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse("expected '||'".into()));
                }
            }
            '<' => {
                // A `<ref>` span, or the less-than family.
                if let Some(token) = angle_token(&text[i + 1..]) {
                    tokens.push(Token::Ref(token.to_owned()));
                    i += token.len() + 2;
                } else if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(ExpressionError::Parse(format!(
                        "unterminated string literal in {text:?}"
                    )));
                }
                tokens.push(Token::Str(text[start..j].to_owned()));
                i = j + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) =>
            {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
                {
                    i += 1;
                }
                let raw = &text[start..i];
                let num: f64 = raw
                    .parse()
                    .map_err(|_| ExpressionError::Parse(format!("bad number literal: {raw}")))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric()
                        || matches!(bytes[i], b'_' | b'.'))
                {
                    i += 1;
                }
                let word = &text[start..i];
                tokens.push(match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word.to_owned()),
                });
            }
            other => {
                return Err(ExpressionError::Parse(format!(
                    "unexpected character {other:?} in expression"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_unary()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(serde_json::json!(n))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::Ref(token)) => Ok(Expr::Reference(token)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err(ExpressionError::Parse("expected ')'".into()))
                }
            }
            other => Err(ExpressionError::Parse(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }
}

fn resolve_ident(name: &str, source: &dyn ReferenceSource) -> Result<Value, ExpressionError> {
    let (head, rest) = name.split_once('.').map_or((name, ""), |(h, r)| (h, r));

    if let Some(v) = source.iteration_var(head) {
        return Ok(path::walk(&v, rest).cloned().unwrap_or(Value::Null));
    }
    if let Some(v) = source.local_var(head) {
        return Ok(path::walk(&v, rest).cloned().unwrap_or(Value::Null));
    }
    if rest.is_empty()
        && let Some(v) = source.env_var(head)
    {
        return Ok(Value::String(v));
    }

    Err(ExpressionError::unresolved(name))
}

fn eval(expr: &Expr, source: &dyn ReferenceSource) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => resolve_ident(name, source),
        Expr::Reference(token) => {
            let resolver = crate::template::Resolver::new(source);
            Ok(resolver.lookup(token)?.unwrap_or(Value::Null))
        }
        Expr::Not(inner) => Ok(Value::Bool(!to_boolean(&eval(inner, source)?))),
        Expr::And(lhs, rhs) => {
            if to_boolean(&eval(lhs, source)?) {
                Ok(Value::Bool(to_boolean(&eval(rhs, source)?)))
            } else {
                Ok(Value::Bool(false))
            }
        }
        Expr::Or(lhs, rhs) => {
            if to_boolean(&eval(lhs, source)?) {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(to_boolean(&eval(rhs, source)?)))
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, source)?;
            let rhs = eval(rhs, source)?;
            compare(*op, &lhs, &rhs)
        }
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExpressionError> {
    let result = match op {
        BinaryOp::Eq => values_equal(lhs, rhs),
        BinaryOp::Ne => !values_equal(lhs, rhs),
        ordering => {
            let cmp = match (lhs, rhs) {
                (Value::Number(_), Value::Number(_)) => {
                    let (a, b) = (as_number(lhs), as_number(rhs));
                    match (a, b) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => None,
                    }
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(cmp) = cmp else {
                return Err(ExpressionError::Eval(format!(
                    "cannot order {} against {}",
                    type_name(lhs),
                    type_name(rhs)
                )));
            };
            match ordering {
                BinaryOp::Lt => cmp == std::cmp::Ordering::Less,
                BinaryOp::Le => cmp != std::cmp::Ordering::Greater,
                BinaryOp::Gt => cmp == std::cmp::Ordering::Greater,
                BinaryOp::Ge => cmp != std::cmp::Ordering::Less,
                BinaryOp::Eq | BinaryOp::Ne => unreachable!("handled above"),
            }
        }
    };
    Ok(Value::Bool(result))
}

/// Equality that treats `2` and `2.0` as the same number.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return (a - b).abs() < f64::EPSILON;
    }
    lhs == rhs
}

/// Evaluate condition text to a value.
pub fn evaluate(text: &str, source: &dyn ReferenceSource) -> Result<Value, ExpressionError> {
    let tokens = lex(text)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Parse("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExpressionError::Parse(format!(
            "trailing tokens after expression in {text:?}"
        )));
    }
    eval(&expr, source)
}

/// Evaluate condition text to a boolean (JavaScript-style truthiness).
pub fn evaluate_condition(
    text: &str,
    source: &dyn ReferenceSource,
) -> Result<bool, ExpressionError> {
    Ok(to_boolean(&evaluate(text, source)?))
}
