//! Evaluation pool: bounded queue of submitted expressions drained by a
//! fixed set of workers.
//!
//! Each job either finishes the expression locally (via the evaluator) or,
//! for a single primitive operation, offers it on the Task Board and leaves
//! it pending until an agent reports back. Outcomes are counted and
//! published on a broadcast channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::OperationTimes;
use crate::eval;
use crate::expressions::Outcome;
use crate::store::ExpressionStore;
use crate::tasks::{Task, TaskBoard};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Attempts at recording an outcome before the job is rescheduled.
const FINISH_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles after each failure.
const FINISH_BACKOFF: Duration = Duration::from_millis(50);

/// How long a job whose outcome could not be recorded waits before it runs again.
const RESCHEDULE_DELAY: Duration = Duration::from_secs(1);

/// Pool sizing and dispatch policy.
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub dispatch_tasks: bool,
    pub operation_times: OperationTimes,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            dispatch_tasks: true,
            operation_times: OperationTimes::default(),
        }
    }
}

/// One expression waiting to be evaluated.
#[derive(Debug, Clone)]
pub struct EvaluationJob {
    pub expr_id: String,
    pub owner: String,
    pub text: String,
}

/// Something that happened to an expression after it was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationEvent {
    /// The expression reached a terminal state.
    Finished { expr_id: String, outcome: Outcome },
    /// The expression was offered on the Task Board.
    Dispatched { expr_id: String },
    /// The outcome could not be recorded; the expression is still pending
    /// and its job will run again.
    Failed { expr_id: String, reason: String },
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationStats {
    pub queued: u64,
    pub done: u64,
    pub errored: u64,
    pub dispatched: u64,
    pub panicked: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    done: AtomicU64,
    errored: AtomicU64,
    dispatched: AtomicU64,
    panicked: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EvaluationStats {
        EvaluationStats {
            queued: self.queued.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Done(_) => self.done.fetch_add(1, Ordering::Relaxed),
            Outcome::Error => self.errored.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// What a job decided to do with its expression.
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Finish(Outcome),
    Dispatch(Task),
}

/// Shared state handed to every pool worker.
struct PoolContext {
    store: Arc<dyn ExpressionStore>,
    board: Arc<TaskBoard>,
    dispatch_tasks: bool,
    operation_times: OperationTimes,
    in_flight: Mutex<HashSet<String>>,
    counters: Counters,
    events: broadcast::Sender<EvaluationEvent>,
    requeue: mpsc::WeakSender<EvaluationJob>,
}

/// Handle to the running evaluation pool.
pub struct EvaluationPool {
    tx: mpsc::Sender<EvaluationJob>,
    ctx: Arc<PoolContext>,
}

impl EvaluationPool {
    /// Start `settings.workers` workers. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn ExpressionStore>,
        board: Arc<TaskBoard>,
        settings: EvaluationSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (events, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let ctx = Arc::new(PoolContext {
            store,
            board,
            dispatch_tasks: settings.dispatch_tasks,
            operation_times: settings.operation_times,
            in_flight: Mutex::new(HashSet::new()),
            counters: Counters::default(),
            events,
            requeue: tx.downgrade(),
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..settings.workers.max(1) {
            let rx = Arc::clone(&rx);
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        debug!(worker, "Evaluation queue closed, worker exiting");
                        break;
                    };
                    run_job(&ctx, job).await;
                }
            });
        }

        info!(
            workers = settings.workers.max(1),
            queue = settings.queue_capacity.max(1),
            dispatch = settings.dispatch_tasks,
            "Evaluation pool started"
        );

        Self { tx, ctx }
    }

    /// Queue an expression for evaluation without waiting for queue space.
    ///
    /// Returns `false` if the same id is already queued or running, or if the
    /// pool has stopped (the expression then stays pending for
    /// [`recover_pending`](super::Coordinator::recover_pending)). When the
    /// queue is full the job is handed to a task that waits for space.
    pub async fn enqueue(&self, job: EvaluationJob) -> bool {
        {
            let mut in_flight = self.ctx.in_flight.lock().await;
            if !in_flight.insert(job.expr_id.clone()) {
                debug!(expr_id = %job.expr_id, "Expression already queued");
                return false;
            }
        }

        let expr_id = job.expr_id.clone();
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                debug!(expr_id = %expr_id, "Evaluation queue full, deferring");
                let tx = self.tx.clone();
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move {
                    let expr_id = job.expr_id.clone();
                    if tx.send(job).await.is_err() {
                        ctx.in_flight.lock().await.remove(&expr_id);
                        warn!(expr_id = %expr_id, "Evaluation pool stopped, expression left pending");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                self.ctx.in_flight.lock().await.remove(&expr_id);
                warn!(expr_id = %expr_id, "Evaluation pool stopped, expression left pending");
                return false;
            }
        }
        self.ctx.counters.queued.fetch_add(1, Ordering::Relaxed);
        debug!(expr_id = %expr_id, "Expression queued for evaluation");
        true
    }

    /// Subscribe to evaluation events.
    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.ctx.events.subscribe()
    }

    /// Publish an event on behalf of the coordinator (e.g. a reconciled report).
    pub(crate) fn publish(&self, event: EvaluationEvent) {
        if let EvaluationEvent::Finished { outcome, .. } = &event {
            self.ctx.counters.record_outcome(*outcome);
        }
        // ok if nobody is listening
        let _ = self.ctx.events.send(event);
    }

    /// Current counters.
    pub fn stats(&self) -> EvaluationStats {
        self.ctx.counters.snapshot()
    }
}

/// Decide what to do with an expression. Pure; runs on the blocking pool.
fn plan(
    expr_id: &str,
    owner: &str,
    text: &str,
    dispatch_tasks: bool,
    times: &OperationTimes,
) -> Plan {
    let parsed = match eval::parse(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(expr_id = %expr_id, error = %e, "Expression failed to parse");
            return Plan::Finish(Outcome::Error);
        }
    };

    if dispatch_tasks {
        if let Some((lhs, op, rhs)) = parsed.as_primitive() {
            // Only offer operations an agent can answer with a finite number.
            match op.apply(lhs, rhs) {
                Ok(value) if value.is_finite() => {}
                _ => {
                    debug!(expr_id = %expr_id, "Primitive operation has no finite result");
                    return Plan::Finish(Outcome::Error);
                }
            }
            let millis = u64::try_from(times.for_operation(op).as_millis()).unwrap_or(u64::MAX);
            return Plan::Dispatch(
                Task::new(expr_id, owner, lhs, op, rhs).with_operation_time(millis),
            );
        }
    }

    match parsed.eval() {
        Ok(value) => Plan::Finish(Outcome::from_value(value)),
        Err(e) => {
            debug!(expr_id = %expr_id, error = %e, "Expression evaluation failed");
            Plan::Finish(Outcome::Error)
        }
    }
}

async fn run_job(ctx: &Arc<PoolContext>, job: EvaluationJob) {
    let EvaluationJob {
        expr_id,
        owner,
        text,
    } = job;

    let planned = {
        let (expr_id, owner, text) = (expr_id.clone(), owner.clone(), text.clone());
        let dispatch = ctx.dispatch_tasks;
        let times = ctx.operation_times;
        tokio::task::spawn_blocking(move || plan(&expr_id, &owner, &text, dispatch, &times)).await
    };

    let plan = match planned {
        Ok(plan) => plan,
        Err(e) => {
            error!(expr_id = %expr_id, error = %e, "Evaluation job crashed");
            ctx.counters.panicked.fetch_add(1, Ordering::Relaxed);
            Plan::Finish(Outcome::Error)
        }
    };

    let settled = match plan {
        Plan::Finish(outcome) => finish(ctx, &owner, &expr_id, outcome).await,
        Plan::Dispatch(task) => {
            if ctx.board.insert(task).await {
                ctx.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                info!(expr_id = %expr_id, "Expression dispatched to the task board");
                let _ = ctx.events.send(EvaluationEvent::Dispatched {
                    expr_id: expr_id.clone(),
                });
            } else {
                debug!(expr_id = %expr_id, "Task already on the board");
            }
            true
        }
    };

    if settled {
        ctx.in_flight.lock().await.remove(&expr_id);
    } else {
        // Still in flight: the rescheduled job owns the id.
        reschedule(
            ctx,
            EvaluationJob {
                expr_id,
                owner,
                text,
            },
        );
    }
}

/// Record a terminal outcome, retrying transient store failures.
///
/// Returns `false` if every attempt failed and the expression is still pending.
async fn finish(ctx: &PoolContext, owner: &str, expr_id: &str, outcome: Outcome) -> bool {
    let mut backoff = FINISH_BACKOFF;
    for attempt in 1..=FINISH_ATTEMPTS {
        match ctx.store.finish_expression(owner, expr_id, outcome).await {
            Ok(true) => {
                ctx.counters.record_outcome(outcome);
                info!(
                    expr_id = %expr_id,
                    owner = %owner,
                    status = %outcome.status(),
                    "Expression evaluated"
                );
                let _ = ctx.events.send(EvaluationEvent::Finished {
                    expr_id: expr_id.to_string(),
                    outcome,
                });
                return true;
            }
            Ok(false) => {
                warn!(expr_id = %expr_id, "Expression was no longer pending, result dropped");
                return true;
            }
            Err(e) if attempt < FINISH_ATTEMPTS => {
                warn!(expr_id = %expr_id, attempt, error = %e, "Failed to record evaluation result, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(expr_id = %expr_id, error = %e, "Failed to record evaluation result, rescheduling");
                let _ = ctx.events.send(EvaluationEvent::Failed {
                    expr_id: expr_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    false
}

/// Run `job` again after [`RESCHEDULE_DELAY`], unless the pool has stopped.
fn reschedule(ctx: &Arc<PoolContext>, job: EvaluationJob) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        tokio::time::sleep(RESCHEDULE_DELAY).await;
        let expr_id = job.expr_id.clone();
        let sent = match ctx.requeue.upgrade() {
            Some(tx) => tx.send(job).await.is_ok(),
            None => false,
        };
        if sent {
            debug!(expr_id = %expr_id, "Expression rescheduled");
        } else {
            ctx.in_flight.lock().await.remove(&expr_id);
            warn!(expr_id = %expr_id, "Evaluation pool stopped, expression left pending");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{DatabaseError, EvalError};
    use crate::expressions::{Expression, ExpressionStatus};
    use crate::store::LibSqlBackend;
    use crate::tasks::{Operation, TaskState};

    async fn setup(dispatch: bool) -> (Arc<dyn ExpressionStore>, Arc<TaskBoard>, EvaluationPool) {
        let store: Arc<dyn ExpressionStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let board = TaskBoard::new(Duration::from_secs(30));
        let settings = EvaluationSettings {
            workers: 2,
            queue_capacity: 16,
            dispatch_tasks: dispatch,
            operation_times: OperationTimes {
                multiplication: Duration::from_millis(250),
                ..OperationTimes::default()
            },
        };
        let pool = EvaluationPool::start(Arc::clone(&store), Arc::clone(&board), settings);
        (store, board, pool)
    }

    async fn submit(store: &Arc<dyn ExpressionStore>, pool: &EvaluationPool, text: &str) -> Expression {
        let expr = Expression::new("alice", text);
        store.insert_expression(&expr).await.unwrap();
        assert!(
            pool.enqueue(EvaluationJob {
                expr_id: expr.id.clone(),
                owner: expr.owner.clone(),
                text: expr.text.clone(),
            })
            .await
        );
        expr
    }

    async fn next_event(rx: &mut broadcast::Receiver<EvaluationEvent>) -> EvaluationEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for evaluation event")
            .unwrap()
    }

    #[test]
    fn plan_dispatches_primitive_with_duration_hint() {
        let times = OperationTimes {
            multiplication: Duration::from_millis(40),
            ..OperationTimes::default()
        };
        match plan("e1", "alice", "2 * 3", true, &times) {
            Plan::Dispatch(task) => {
                assert_eq!(task.id, "e1");
                assert_eq!(task.owner, "alice");
                assert_eq!(task.arg1, Some(2.0));
                assert_eq!(task.arg2, Some(3.0));
                assert_eq!(task.operation, Some(Operation::Mul));
                assert_eq!(task.operation_time, 40);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn plan_evaluates_compound_locally() {
        let times = OperationTimes::default();
        assert_eq!(
            plan("e1", "alice", "(1 + 2) * 3", true, &times),
            Plan::Finish(Outcome::Done(9.0))
        );
        assert_eq!(
            plan("e1", "alice", "2 * 3", false, &times),
            Plan::Finish(Outcome::Done(6.0))
        );
    }

    #[test]
    fn plan_turns_failures_into_error() {
        let times = OperationTimes::default();
        assert_eq!(
            plan("e1", "alice", "5 / (3 - 3)", true, &times),
            Plan::Finish(Outcome::Error)
        );
        assert_eq!(
            plan("e1", "alice", "2 + * 3", true, &times),
            Plan::Finish(Outcome::Error)
        );
        assert_eq!(
            plan("e1", "alice", "5 / 0", true, &times),
            Plan::Finish(Outcome::Error)
        );

        let overflow = format!("{0} * {0}", "9".repeat(200));
        assert_eq!(eval::evaluate(&overflow), Err(EvalError::NonFinite));
        assert_eq!(
            plan("e1", "alice", &overflow, true, &times),
            Plan::Finish(Outcome::Error)
        );
        let huge_literal = format!("{} + 1", "9".repeat(400));
        assert_eq!(
            plan("e1", "alice", &huge_literal, true, &times),
            Plan::Finish(Outcome::Error)
        );
    }

    #[tokio::test]
    async fn local_evaluation_finishes_expression() {
        let (store, _board, pool) = setup(true).await;
        let mut rx = pool.subscribe();
        let expr = submit(&store, &pool, "1 + 1 * 4").await;

        let event = next_event(&mut rx).await;
        assert_eq!(
            event,
            EvaluationEvent::Finished {
                expr_id: expr.id.clone(),
                outcome: Outcome::Done(5.0)
            }
        );

        let stored = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpressionStatus::Done);
        assert_eq!(stored.result, Some(5.0));
        assert_eq!(pool.stats().done, 1);
    }

    #[tokio::test]
    async fn evaluation_error_marks_expression_error() {
        let (store, _board, pool) = setup(true).await;
        let mut rx = pool.subscribe();
        let expr = submit(&store, &pool, "5 / (3 - 3)").await;

        next_event(&mut rx).await;
        let stored = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpressionStatus::Error);
        assert_eq!(stored.result, None);
        assert_eq!(pool.stats().errored, 1);
    }

    #[tokio::test]
    async fn primitive_expression_is_dispatched_and_stays_pending() {
        let (store, board, pool) = setup(true).await;
        let mut rx = pool.subscribe();
        let expr = submit(&store, &pool, "2 * 3").await;

        assert_eq!(
            next_event(&mut rx).await,
            EvaluationEvent::Dispatched {
                expr_id: expr.id.clone()
            }
        );
        assert_eq!(board.state(&expr.id).await, Some(TaskState::Available));

        let task = board.fetch_available().await.unwrap();
        assert_eq!(task.operation_time, 250);

        let stored = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpressionStatus::Pending);
        assert_eq!(pool.stats().dispatched, 1);
    }

    /// A pool with no workers, so queued jobs stay in flight.
    async fn idle_pool(capacity: usize) -> (EvaluationPool, mpsc::Receiver<EvaluationJob>) {
        let store: Arc<dyn ExpressionStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let board = TaskBoard::new(Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(capacity);
        let (events, _) = broadcast::channel(4);
        let pool = EvaluationPool {
            ctx: Arc::new(PoolContext {
                store,
                board,
                dispatch_tasks: true,
                operation_times: OperationTimes::default(),
                in_flight: Mutex::new(HashSet::new()),
                counters: Counters::default(),
                events,
                requeue: tx.downgrade(),
            }),
            tx,
        };
        (pool, rx)
    }

    fn job(id: &str) -> EvaluationJob {
        EvaluationJob {
            expr_id: id.into(),
            owner: "alice".into(),
            text: "1 + 1".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_rejected_while_in_flight() {
        let (pool, _rx) = idle_pool(4).await;
        assert!(pool.enqueue(job("e1")).await);
        assert!(!pool.enqueue(job("e1")).await);
        assert_eq!(pool.stats().queued, 1);
    }

    #[tokio::test]
    async fn enqueue_does_not_wait_for_a_full_queue() {
        let (pool, mut rx) = idle_pool(1).await;

        let accepted = tokio::time::timeout(Duration::from_millis(500), async {
            (
                pool.enqueue(job("e1")).await,
                pool.enqueue(job("e2")).await,
                pool.enqueue(job("e3")).await,
            )
        })
        .await
        .expect("enqueue blocked on a full queue");
        assert_eq!(accepted, (true, true, true));

        // Deferred jobs land once space frees up.
        let mut seen = HashSet::new();
        for _ in 0..3 {
            let job = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.insert(job.expr_id);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn enqueue_on_stopped_pool_is_refused() {
        let (pool, rx) = idle_pool(4).await;
        drop(rx);
        assert!(!pool.enqueue(job("e1")).await);
        assert!(pool.ctx.in_flight.lock().await.is_empty());
        assert_eq!(pool.stats().queued, 0);
    }

    /// Store whose first `failures` updates fail.
    struct FlakyStore {
        inner: LibSqlBackend,
        failures: AtomicU32,
    }

    #[async_trait]
    impl ExpressionStore for FlakyStore {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            self.inner.init_schema().await
        }
        async fn insert_expression(&self, expr: &Expression) -> Result<(), DatabaseError> {
            self.inner.insert_expression(expr).await
        }
        async fn get_expression(
            &self,
            owner: &str,
            id: &str,
        ) -> Result<Option<Expression>, DatabaseError> {
            self.inner.get_expression(owner, id).await
        }
        async fn list_expressions(&self, owner: &str) -> Result<Vec<Expression>, DatabaseError> {
            self.inner.list_expressions(owner).await
        }
        async fn finish_expression(
            &self,
            owner: &str,
            id: &str,
            outcome: Outcome,
        ) -> Result<bool, DatabaseError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(DatabaseError::Query("database is locked".into()));
            }
            self.inner.finish_expression(owner, id, outcome).await
        }
        async fn list_pending(&self) -> Result<Vec<Expression>, DatabaseError> {
            self.inner.list_pending().await
        }
    }

    async fn flaky_setup(failures: u32) -> (Arc<dyn ExpressionStore>, EvaluationPool) {
        let store: Arc<dyn ExpressionStore> = Arc::new(FlakyStore {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            failures: AtomicU32::new(failures),
        });
        let settings = EvaluationSettings {
            workers: 1,
            dispatch_tasks: false,
            ..EvaluationSettings::default()
        };
        let pool = EvaluationPool::start(
            Arc::clone(&store),
            TaskBoard::new(Duration::from_secs(30)),
            settings,
        );
        (store, pool)
    }

    #[tokio::test]
    async fn transient_store_failure_is_retried() {
        let (store, pool) = flaky_setup(FINISH_ATTEMPTS - 1).await;
        let mut rx = pool.subscribe();
        let expr = submit(&store, &pool, "2 + 2").await;

        assert_eq!(
            next_event(&mut rx).await,
            EvaluationEvent::Finished {
                expr_id: expr.id.clone(),
                outcome: Outcome::Done(4.0)
            }
        );
        let stored = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpressionStatus::Done);
        assert_eq!(pool.stats().failed, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_reschedule_the_job() {
        let (store, pool) = flaky_setup(FINISH_ATTEMPTS + 1).await;
        let mut rx = pool.subscribe();
        let expr = submit(&store, &pool, "3 * 3").await;

        assert!(matches!(
            next_event(&mut rx).await,
            EvaluationEvent::Failed { ref expr_id, .. } if *expr_id == expr.id
        ));
        let pending = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(pending.status, ExpressionStatus::Pending);

        assert_eq!(
            next_event(&mut rx).await,
            EvaluationEvent::Finished {
                expr_id: expr.id.clone(),
                outcome: Outcome::Done(9.0)
            }
        );
        let stored = store.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpressionStatus::Done);
        assert_eq!(stored.result, Some(9.0));
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn many_jobs_all_finish() {
        let (store, _board, pool) = setup(false).await;
        let mut rx = pool.subscribe();
        let mut ids = HashSet::new();
        for i in 0..20 {
            let expr = submit(&store, &pool, &format!("{i} + 1")).await;
            ids.insert(expr.id);
        }

        for _ in 0..20 {
            match next_event(&mut rx).await {
                EvaluationEvent::Finished { expr_id, .. } => assert!(ids.contains(&expr_id)),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(store.list_pending().await.unwrap().is_empty());
        assert_eq!(pool.stats().done, 20);
    }
}
