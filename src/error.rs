//! Error types for calc-grid.

use reqwest::StatusCode;

/// Top-level error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Malformed credential entry in {key}: {entry:?} (expected owner:token)")]
    MalformedCredential { key: String, entry: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Rejections raised synchronously when an expression is submitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("expression is empty")]
    Empty,

    #[error(
        "invalid character {ch:?} at position {position}: only numbers, +, -, *, /, (), . and spaces are allowed"
    )]
    InvalidCharacter { ch: char, position: usize },

    #[error("division by zero is not allowed")]
    DivisionByZero,

    #[error("expression is longer than {max} characters")]
    TooLong { max: usize },

    #[error("invalid expression syntax: {0}")]
    Syntax(EvalError),
}

/// Failures of the arithmetic evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unexpected character {ch:?} at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("unexpected token {token} at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,

    #[error("expression nesting exceeds {max} levels")]
    TooDeep { max: usize },

    #[error("expression has more than {max} operators")]
    TooManyOperators { max: usize },
}

/// Task Board errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: String },
}

/// Credential failures on the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Errors raised by a worker agent talking to the coordinator or compute service.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Result type alias for calc-grid.
pub type Result<T> = std::result::Result<T, Error>;
