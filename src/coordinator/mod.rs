//! Coordinator: owns the Expression Store, the Task Board, and the
//! evaluation pool, and reconciles agent reports into expression state.

pub mod auth;
pub mod evaluation;
pub mod http;

pub use auth::{IdentityProvider, StaticTokens};
pub use evaluation::{
    EvaluationEvent, EvaluationJob, EvaluationPool, EvaluationSettings, EvaluationStats,
};
pub use http::{AppState, router};

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{DatabaseError, Result};
use crate::eval;
use crate::expressions::{Expression, Outcome};
use crate::store::ExpressionStore;
use crate::tasks::{BoardStats, ConsumeOutcome, Task, TaskBoard, TaskReport};

/// How a report was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// The expression moved to its terminal state.
    Applied(Outcome),
    /// The task had already been consumed; nothing changed.
    Duplicate,
    /// The task was consumed but its expression was no longer pending.
    Stale,
}

/// The coordinator service, shared by every request handler.
pub struct Coordinator {
    store: Arc<dyn ExpressionStore>,
    board: Arc<TaskBoard>,
    pool: EvaluationPool,
}

impl Coordinator {
    /// Build a coordinator and start its evaluation pool.
    pub fn new(
        store: Arc<dyn ExpressionStore>,
        board: Arc<TaskBoard>,
        settings: EvaluationSettings,
    ) -> Arc<Self> {
        let pool = EvaluationPool::start(Arc::clone(&store), Arc::clone(&board), settings);
        Arc::new(Self { store, board, pool })
    }

    /// Build a coordinator from process configuration.
    pub fn from_config(store: Arc<dyn ExpressionStore>, config: &CoordinatorConfig) -> Arc<Self> {
        let board = TaskBoard::new(config.task_lease);
        let settings = EvaluationSettings {
            workers: config.eval_workers,
            queue_capacity: config.eval_queue,
            dispatch_tasks: config.dispatch_tasks,
            operation_times: config.operation_times,
        };
        Self::new(store, board, settings)
    }

    /// Validate, persist, and queue a new expression.
    ///
    /// Returns as soon as the expression is stored; evaluation happens in
    /// the background and never holds up the caller.
    pub async fn submit(&self, owner: &str, text: &str) -> Result<Expression> {
        eval::validate_submission(text)?;

        let expr = Expression::new(owner, text.trim());
        self.store.insert_expression(&expr).await?;
        info!(expr_id = %expr.id, owner = %owner, "Expression submitted");

        self.enqueue(&expr).await;
        Ok(expr)
    }

    async fn enqueue(&self, expr: &Expression) -> bool {
        self.pool
            .enqueue(EvaluationJob {
                expr_id: expr.id.clone(),
                owner: expr.owner.clone(),
                text: expr.text.clone(),
            })
            .await
    }

    /// Fetch one expression belonging to `owner`.
    pub async fn get_expression(&self, owner: &str, id: &str) -> Result<Expression> {
        self.store
            .get_expression(owner, id)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound {
                    entity: "expression".into(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// All expressions belonging to `owner`, oldest first.
    pub async fn list_expressions(&self, owner: &str) -> Result<Vec<Expression>> {
        Ok(self.store.list_expressions(owner).await?)
    }

    /// Claim the next available task, if any.
    pub async fn fetch_task(&self) -> Option<Task> {
        let task = self.board.fetch_available().await;
        match &task {
            Some(task) => info!(task_id = %task.id, "Task handed to agent"),
            None => debug!("No task available"),
        }
        task
    }

    /// Apply an agent's result to the task and its expression.
    ///
    /// Unknown ids are `TaskError::NotFound`. If the store cannot be
    /// updated the task is put back on the board and the error returned.
    pub async fn report_result(&self, report: TaskReport) -> Result<Reconciliation> {
        let TaskReport { id, result } = report;

        let task = match self.board.consume(&id, result).await? {
            ConsumeOutcome::Consumed(task) => task,
            ConsumeOutcome::AlreadyConsumed { .. } => {
                debug!(task_id = %id, "Duplicate report");
                return Ok(Reconciliation::Duplicate);
            }
        };

        let outcome = Outcome::from_value(result);
        match self.store.finish_expression(&task.owner, &task.id, outcome).await {
            Ok(true) => {
                info!(
                    task_id = %id,
                    owner = %task.owner,
                    status = %outcome.status(),
                    "Task result reconciled"
                );
                self.pool.publish(EvaluationEvent::Finished {
                    expr_id: id,
                    outcome,
                });
                Ok(Reconciliation::Applied(outcome))
            }
            Ok(false) => {
                warn!(task_id = %id, "Reported task has no pending expression");
                Ok(Reconciliation::Stale)
            }
            Err(e) => {
                error!(task_id = %id, error = %e, "Failed to record task result, re-offering");
                self.board.restore(task).await;
                Err(e.into())
            }
        }
    }

    /// Re-queue expressions left pending by a previous run.
    pub async fn recover_pending(&self) -> Result<usize> {
        let pending = self.store.list_pending().await?;
        let mut recovered = 0;
        for expr in &pending {
            if self.enqueue(expr).await {
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(recovered, "Recovered pending expressions");
        }
        Ok(recovered)
    }

    /// The Task Board this coordinator serves.
    pub fn board(&self) -> &Arc<TaskBoard> {
        &self.board
    }

    /// Subscribe to evaluation and reconciliation events.
    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.pool.subscribe()
    }

    /// Evaluation pool counters since startup.
    pub fn evaluation_stats(&self) -> EvaluationStats {
        self.pool.stats()
    }

    /// Task counts by state on the board.
    pub async fn board_stats(&self) -> BoardStats {
        self.board.stats().await
    }
}
