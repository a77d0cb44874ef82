//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := ('-' | '+') unary | factor
//! factor := NUMBER | '(' expr ')'
//! ```

use crate::error::EvalError;
use crate::tasks::Operation;

use super::lexer::{Token, TokenKind, tokenize};

/// Maximum nesting of parentheses and unary signs.
pub const MAX_DEPTH: usize = 64;

/// Maximum number of binary operators in one expression. Bounds the height
/// of left-leaning chains like `1 + 1 + ... + 1`, which nesting alone does not.
pub const MAX_OPERATORS: usize = 1024;

/// Parsed arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Neg(Box<Expr>),
    Binary {
        op: Operation,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate the tree. Division by zero and non-finite intermediate
    /// results are errors.
    pub fn eval(&self) -> Result<f64, EvalError> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Neg(inner) => -inner.eval()?,
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval()?, rhs.eval()?)?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite)
        }
    }

    /// If this is a single binary operation between two literals (a literal
    /// may carry a leading minus), return its operands and operation.
    pub fn as_primitive(&self) -> Option<(f64, Operation, f64)> {
        match self {
            Self::Binary { op, lhs, rhs } => Some((lhs.as_literal()?, *op, rhs.as_literal()?)),
            _ => None,
        }
    }

    fn as_literal(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Neg(inner) => match inner.as_ref() {
                Self::Number(n) => Some(-n),
                _ => None,
            },
            Self::Binary { .. } => None,
        }
    }
}

/// Parse `input` into an expression tree.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(input)?;
    parse_tokens(&tokens)
}

/// Parse an already tokenized expression.
pub fn parse_tokens(tokens: &[Token]) -> Result<Expr, EvalError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        operators: 0,
    };
    let expr = parser.expr(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(unexpected(token)),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    operators: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn count_operator(&mut self) -> Result<(), EvalError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(EvalError::TooManyOperators { max: MAX_OPERATORS });
        }
        Ok(())
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, EvalError> {
        let mut lhs = self.term(depth)?;
        while let Some(op) = self.peek().and_then(|t| additive(t.kind)) {
            self.count_operator()?;
            self.pos += 1;
            let rhs = self.term(depth)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self, depth: usize) -> Result<Expr, EvalError> {
        let mut lhs = self.unary(depth)?;
        while let Some(op) = self.peek().and_then(|t| multiplicative(t.kind)) {
            self.count_operator()?;
            self.pos += 1;
            let rhs = self.unary(depth)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self, depth: usize) -> Result<Expr, EvalError> {
        if depth > MAX_DEPTH {
            return Err(EvalError::TooDeep { max: MAX_DEPTH });
        }
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary(depth + 1)?)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.unary(depth + 1)
            }
            _ => self.factor(depth),
        }
    }

    fn factor(&mut self, depth: usize) -> Result<Expr, EvalError> {
        let token = self.next().ok_or(EvalError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::LParen => {
                let inner = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(unexpected(&other)),
                    None => Err(EvalError::UnexpectedEnd),
                }
            }
            _ => Err(unexpected(&token)),
        }
    }
}

fn additive(kind: TokenKind) -> Option<Operation> {
    match kind {
        TokenKind::Plus => Some(Operation::Add),
        TokenKind::Minus => Some(Operation::Sub),
        _ => None,
    }
}

fn multiplicative(kind: TokenKind) -> Option<Operation> {
    match kind {
        TokenKind::Star => Some(Operation::Mul),
        TokenKind::Slash => Some(Operation::Div),
        _ => None,
    }
}

fn unexpected(token: &Token) -> EvalError {
    EvalError::UnexpectedToken {
        token: token.kind.to_string(),
        position: token.position,
    }
}
