//! Restricted arithmetic for formula-encoded scales.
//!
//! Formula exports express a bracket's tax as text over one placeholder for
//! the net worth, e.g. `($wert$ - 100000) * 0.015 + 820`. This module
//! parses such text into a small expression tree and evaluates it with
//! checked decimal arithmetic. Nothing beyond the grammar below is
//! accepted:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '×' | '/' | '÷') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := NUMBER | '$' NAME '$' | '(' expr ')'
//! ```
//!
//! All placeholders in one formula must share the same name.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::expression::Expression;
//!
//! let formula = Expression::parse("($wert$ - 100000) * 0.015 + 820").unwrap();
//!
//! assert_eq!(formula.evaluate(dec!(200000)).unwrap(), dec!(2320));
//! ```

use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("formula is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("formula ends unexpectedly")]
    UnexpectedEnd,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unterminated placeholder starting at position {0}")]
    UnterminatedPlaceholder(usize),

    #[error("formula uses placeholders '${first}$' and '${second}$'; only one variable is allowed")]
    ConflictingPlaceholders { first: String, second: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(Decimal),
    Variable,
    Neg(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Placeholder(String),
    Op(Op),
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Placeholder(name) => write!(f, "placeholder ${name}$"),
            Token::Op(op) => {
                let sym = match op {
                    Op::Add => '+',
                    Op::Sub => '-',
                    Op::Mul => '*',
                    Op::Div => '/',
                };
                write!(f, "operator '{sym}'")
            }
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
        }
    }
}

/// A parsed formula with at most one free variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    variable: Option<String>,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut variable: Option<String> = None;
        for (token, _) in &tokens {
            if let Token::Placeholder(name) = token {
                match &variable {
                    None => variable = Some(name.clone()),
                    Some(first) if first != name => {
                        return Err(ExpressionError::ConflictingPlaceholders {
                            first: first.clone(),
                            second: name.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr()?;
        if let Some((token, position)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position: *position,
            });
        }

        Ok(Self {
            source: source.trim().to_string(),
            variable,
            root,
        })
    }

    /// Evaluates the formula with every placeholder bound to `value`.
    pub fn evaluate(
        &self,
        value: Decimal,
    ) -> Result<Decimal, ExpressionError> {
        eval(&self.root, value)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name between the `$` delimiters, if the formula references one.
    pub fn variable(&self) -> Option<&str> {
        self.variable.as_deref()
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(
    node: &Node,
    value: Decimal,
) -> Result<Decimal, ExpressionError> {
    match node {
        Node::Number(n) => Ok(*n),
        Node::Variable => Ok(value),
        Node::Neg(inner) => Ok(-eval(inner, value)?),
        Node::Binary(op, lhs, rhs) => {
            let a = eval(lhs, value)?;
            let b = eval(rhs, value)?;
            match op {
                Op::Add => a.checked_add(b).ok_or(ExpressionError::Overflow),
                Op::Sub => a.checked_sub(b).ok_or(ExpressionError::Overflow),
                Op::Mul => a.checked_mul(b).ok_or(ExpressionError::Overflow),
                Op::Div if b.is_zero() => Err(ExpressionError::DivisionByZero),
                Op::Div => a.checked_div(b).ok_or(ExpressionError::Overflow),
            }
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut chars = source.char_indices().peekable();
    let mut tokens = Vec::new();

    while let Some(&(position, ch)) = chars.peek() {
        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => Token::Number(number(&mut chars)?),
            '$' => Token::Placeholder(placeholder(&mut chars, position)?),
            '+' => single(&mut chars, Token::Op(Op::Add)),
            '-' | '−' => single(&mut chars, Token::Op(Op::Sub)),
            '*' | '×' => single(&mut chars, Token::Op(Op::Mul)),
            '/' | '÷' => single(&mut chars, Token::Op(Op::Div)),
            '(' => single(&mut chars, Token::Open),
            ')' => single(&mut chars, Token::Close),
            _ => return Err(ExpressionError::UnexpectedChar { ch, position }),
        };
        tokens.push((token, position));
    }

    Ok(tokens)
}

fn single(
    chars: &mut Peekable<CharIndices<'_>>,
    token: Token,
) -> Token {
    chars.next();
    token
}

fn number(chars: &mut Peekable<CharIndices<'_>>) -> Result<Decimal, ExpressionError> {
    let mut text = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Decimal::from_str(&text).map_err(|_| ExpressionError::InvalidNumber(text))
}

fn placeholder(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
) -> Result<String, ExpressionError> {
    chars.next(); // opening '$'
    let mut name = String::new();
    for (_, c) in chars.by_ref() {
        if c == '$' {
            if name.is_empty() {
                return Err(ExpressionError::UnterminatedPlaceholder(start));
            }
            return Ok(name);
        }
        if !(c.is_alphanumeric() || c == '_') {
            return Err(ExpressionError::UnterminatedPlaceholder(start));
        }
        name.push(c);
    }
    Err(ExpressionError::UnterminatedPlaceholder(start))
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expr(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (Op::Mul | Op::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(Node::Number(n)),
            Some((Token::Placeholder(_), _)) => Ok(Node::Variable),
            Some((Token::Open, _)) => {
                let inner = self.expr()?;
                match self.next() {
                    Some((Token::Close, _)) => Ok(inner),
                    Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                        found: token.to_string(),
                        position,
                    }),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}
