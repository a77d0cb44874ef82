//! Tokenizer for infix arithmetic.

use std::fmt;

use crate::error::EvalError;

/// A lexical token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

/// A token plus the character offset it starts at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Split `input` into tokens. Whitespace separates tokens and is otherwise ignored.
pub fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let kind = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = parse_number(&literal)?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position: start,
                });
                continue;
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            other => {
                return Err(EvalError::UnexpectedCharacter {
                    ch: other,
                    position: i,
                });
            }
        };
        tokens.push(Token { kind, position: i });
        i += 1;
    }

    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<f64, EvalError> {
    // f64::from_str accepts "1." and ".5" but also "inf"/"NaN"; only digits
    // and dots reach here, so the remaining failure mode is "1.2.3" or ".".
    if literal.matches('.').count() > 1 || literal == "." {
        return Err(EvalError::InvalidNumber(literal.to_string()));
    }
    literal
        .parse::<f64>()
        .map_err(|_| EvalError::InvalidNumber(literal.to_string()))
}
