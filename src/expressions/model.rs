//! Expression record and its lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionStatus {
    /// Accepted, not yet evaluated.
    Pending,
    /// Evaluated; `result` holds the value.
    Done,
    /// Evaluation failed.
    Error,
}

impl ExpressionStatus {
    /// Only `pending → done` and `pending → error` are allowed.
    pub fn can_transition_to(&self, target: ExpressionStatus) -> bool {
        use ExpressionStatus::*;
        matches!((self, target), (Pending, Done) | (Pending, Error))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpressionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown expression status: {other}")),
        }
    }
}

/// Terminal outcome written to an expression exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Done(f64),
    Error,
}

impl Outcome {
    /// `Done` for a finite value, `Error` otherwise.
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Self::Done(value)
        } else {
            Self::Error
        }
    }

    pub fn status(&self) -> ExpressionStatus {
        match self {
            Self::Done(_) => ExpressionStatus::Done,
            Self::Error => ExpressionStatus::Error,
        }
    }

    pub fn result(&self) -> Option<f64> {
        match self {
            Self::Done(value) => Some(*value),
            Self::Error => None,
        }
    }
}

/// A submitted arithmetic expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub id: String,
    #[serde(skip_serializing, default)]
    pub owner: String,
    #[serde(rename = "expr")]
    pub text: String,
    pub status: ExpressionStatus,
    /// Set only while `status == Done`.
    pub result: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Expression {
    /// New pending expression with a fresh id.
    pub fn new(owner: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.into(),
            text: text.into(),
            status: ExpressionStatus::Pending,
            result: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_transitions_out() {
        use ExpressionStatus::*;
        assert!(Pending.can_transition_to(Done));
        assert!(Pending.can_transition_to(Error));
        assert!(!Done.can_transition_to(Error));
        assert!(!Error.can_transition_to(Done));
        assert!(!Done.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn non_finite_value_is_an_error_outcome() {
        assert_eq!(Outcome::from_value(f64::INFINITY), Outcome::Error);
        assert_eq!(Outcome::from_value(f64::NAN), Outcome::Error);
        assert_eq!(Outcome::from_value(3.5), Outcome::Done(3.5));
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = Expression::new("alice", "1");
        let b = Expression::new("alice", "1");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn serializes_api_shape() {
        let expr = Expression::new("alice", "2 * 3");
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["expr"], "2 * 3");
        assert_eq!(json["status"], "pending");
        assert!(json["result"].is_null());
        assert!(json.get("owner").is_none());
    }

    #[test]
    fn status_roundtrip_through_str() {
        for status in [
            ExpressionStatus::Pending,
            ExpressionStatus::Done,
            ExpressionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ExpressionStatus>().unwrap(), status);
        }
    }
}
