//! Task types exchanged between the coordinator and worker agents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// A primitive binary arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[serde(alias = "+")]
    Add,
    #[serde(alias = "-")]
    Sub,
    #[serde(alias = "*")]
    Mul,
    #[serde(alias = "/")]
    Div,
}

impl Operation {
    /// Apply the operation. Division by zero is the only failure.
    pub fn apply(self, lhs: f64, rhs: f64) -> Result<f64, EvalError> {
        match self {
            Self::Add => Ok(lhs + rhs),
            Self::Sub => Ok(lhs - rhs),
            Self::Mul => Ok(lhs * rhs),
            Self::Div if rhs == 0.0 => Err(EvalError::DivisionByZero),
            Self::Div => Ok(lhs / rhs),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        };
        f.write_str(s)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" | "+" => Ok(Self::Add),
            "sub" | "-" => Ok(Self::Sub),
            "mul" | "*" => Ok(Self::Mul),
            "div" | "/" => Ok(Self::Div),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// A unit of work offered to worker agents.
///
/// `id` equals the id of the expression that spawned it. Operands and
/// operation are cleared once a result has been reported; a task with any
/// of them unset is never offered again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing)]
    pub owner: String,
    pub arg1: Option<f64>,
    pub arg2: Option<f64>,
    pub operation: Option<Operation>,
    /// Advisory compute cost in milliseconds.
    #[serde(default)]
    pub operation_time: u64,
}

impl Task {
    /// Create a task ready to be offered.
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        arg1: f64,
        operation: Operation,
        arg2: f64,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            arg1: Some(arg1),
            arg2: Some(arg2),
            operation: Some(operation),
            operation_time: 0,
        }
    }

    /// Attach an advisory duration hint.
    pub fn with_operation_time(mut self, millis: u64) -> Self {
        self.operation_time = millis;
        self
    }

    /// Whether operands and operation are all set.
    pub fn has_work(&self) -> bool {
        self.arg1.is_some() && self.arg2.is_some() && self.operation.is_some()
    }

    /// Clear operands and operation, leaving a completion record.
    pub fn clear(&mut self) {
        self.arg1 = None;
        self.arg2 = None;
        self.operation = None;
    }
}

/// Worker-facing payload for `GET /internal/task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: Task,
}

/// Worker report for `POST /internal/task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub result: f64,
}
