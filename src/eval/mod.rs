//! Arithmetic evaluator and submission pre-checks.
//!
//! `evaluate` is the authoritative, pure evaluation of an expression string.
//! `validate_submission` is the cheaper gate applied synchronously when an
//! expression is submitted; it rejects what can be rejected without
//! evaluating, and hands back the parsed tree.

pub mod lexer;
pub mod parser;

pub use parser::{Expr, MAX_DEPTH, MAX_OPERATORS, parse};

use crate::error::{EvalError, ValidationError};
use lexer::{TokenKind, tokenize};

/// Characters allowed in a submitted expression, besides whitespace.
const ALLOWED_CHARS: &str = "0123456789+-*/().";

/// Longest accepted submission, in characters.
pub const MAX_EXPRESSION_LEN: usize = 8192;

/// Evaluate an infix arithmetic expression.
pub fn evaluate(input: &str) -> Result<f64, EvalError> {
    parse(input)?.eval()
}

/// Validate a submitted expression and return its parse tree.
///
/// Checks, in order: non-empty, length, character whitelist, division by a literal
/// zero, syntax. Division by a zero that only appears after evaluation
/// (e.g. `1 / (2 - 2)`) passes and is caught by [`evaluate`].
pub fn validate_submission(input: &str) -> Result<Expr, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    if input.chars().count() > MAX_EXPRESSION_LEN {
        return Err(ValidationError::TooLong {
            max: MAX_EXPRESSION_LEN,
        });
    }

    if let Some((position, ch)) = input
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_whitespace() && !ALLOWED_CHARS.contains(*c))
    {
        return Err(ValidationError::InvalidCharacter { ch, position });
    }

    let tokens = tokenize(input).map_err(ValidationError::Syntax)?;

    let divides_by_literal_zero = tokens.windows(2).any(|pair| {
        pair[0].kind == TokenKind::Slash && pair[1].kind == TokenKind::Number(0.0)
    });
    if divides_by_literal_zero {
        return Err(ValidationError::DivisionByZero);
    }

    parser::parse_tokens(&tokens).map_err(ValidationError::Syntax)
}
