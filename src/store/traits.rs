//! `ExpressionStore` trait: the single async interface for durable expression state.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::expressions::{Expression, Outcome};

/// Backend-agnostic expression persistence.
///
/// Records are keyed by `(owner, id)`. Creation is append-only; the only
/// mutation is the one-time move out of `pending`.
#[async_trait]
pub trait ExpressionStore: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Persist a new expression.
    async fn insert_expression(&self, expr: &Expression) -> Result<(), DatabaseError>;

    /// Look up an expression belonging to `owner`.
    async fn get_expression(
        &self,
        owner: &str,
        id: &str,
    ) -> Result<Option<Expression>, DatabaseError>;

    /// All expressions belonging to `owner`, oldest first.
    async fn list_expressions(&self, owner: &str) -> Result<Vec<Expression>, DatabaseError>;

    /// Move a pending expression to its terminal outcome.
    ///
    /// Returns `false` (and changes nothing) if no pending expression matches
    /// `(owner, id)`.
    async fn finish_expression(
        &self,
        owner: &str,
        id: &str,
        outcome: Outcome,
    ) -> Result<bool, DatabaseError>;

    /// Every expression still pending, across owners, oldest first.
    async fn list_pending(&self) -> Result<Vec<Expression>, DatabaseError>;
}
