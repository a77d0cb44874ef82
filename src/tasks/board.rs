//! Task Board: the coordinator's registry of work offered to agents.
//!
//! Available task ids wait in a FIFO; bodies live in a side map keyed by id.
//! Every read and write goes through one mutex, so a task is handed to at
//! most one caller and cannot be claimed while a report is clearing it.
//!
//! A fetched task is leased, not removed. If no result arrives before the
//! lease runs out, the sweep puts it back at the end of the queue. Consumed
//! entries stay behind as completion records until the retention window
//! passes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::model::Task;
use crate::error::TaskError;

/// How long consumed entries are kept as completion records.
const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Externally visible state of a board entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued and eligible for fetch.
    Available,
    /// Handed to a worker, awaiting its report.
    Leased,
    /// Result reported; operands cleared.
    Consumed,
}

#[derive(Debug)]
enum Slot {
    Queued,
    Leased { until: Instant },
    Consumed { result: f64, at: Instant },
}

#[derive(Debug)]
struct Entry {
    task: Task,
    slot: Slot,
}

#[derive(Debug, Default)]
struct BoardInner {
    queue: VecDeque<String>,
    entries: HashMap<String, Entry>,
}

/// Outcome of reporting a result for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// First report: carries the task as it was before its operands were cleared.
    Consumed(Task),
    /// The task was already consumed; nothing changed.
    AlreadyConsumed { result: f64 },
}

/// Counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub available: usize,
    pub leased: usize,
    pub consumed: usize,
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub pruned: usize,
}

/// Mutex-guarded Task Board.
pub struct TaskBoard {
    inner: Mutex<BoardInner>,
    lease: Duration,
    retention: Duration,
}

impl TaskBoard {
    /// Create a board whose claims expire after `lease`.
    pub fn new(lease: Duration) -> Arc<Self> {
        Self::with_retention(lease, DEFAULT_RETENTION)
    }

    /// Create a board with an explicit completion-record retention.
    pub fn with_retention(lease: Duration, retention: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(BoardInner::default()),
            lease,
            retention,
        })
    }

    /// Offer a task. Returns `false` if the id is already on the board or the
    /// task carries no work.
    pub async fn insert(&self, task: Task) -> bool {
        if !task.has_work() {
            warn!(task_id = %task.id, "Refusing to offer a task without operands");
            return false;
        }

        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(&task.id) {
            warn!(task_id = %task.id, "Task id already on the board");
            return false;
        }

        info!(
            task_id = %task.id,
            owner = %task.owner,
            operation = ?task.operation,
            "Task offered"
        );
        inner.queue.push_back(task.id.clone());
        inner.entries.insert(
            task.id.clone(),
            Entry {
                task,
                slot: Slot::Queued,
            },
        );
        true
    }

    /// Claim the oldest available task, leasing it to the caller.
    pub async fn fetch_available(&self) -> Option<Task> {
        let mut inner = self.inner.lock().await;
        let until = Instant::now() + self.lease;

        while let Some(id) = inner.queue.pop_front() {
            let Some(entry) = inner.entries.get_mut(&id) else {
                continue;
            };
            if !matches!(entry.slot, Slot::Queued) || !entry.task.has_work() {
                continue;
            }
            entry.slot = Slot::Leased { until };
            debug!(task_id = %id, "Task leased");
            return Some(entry.task.clone());
        }

        None
    }

    /// Record a result: clear the task's operands and mark it consumed.
    ///
    /// A second report for the same id is a no-op.
    pub async fn consume(&self, id: &str, result: f64) -> Result<ConsumeOutcome, TaskError> {
        let mut inner = self.inner.lock().await;

        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;

        if let Slot::Consumed { result, .. } = entry.slot {
            debug!(task_id = %id, "Duplicate report ignored");
            return Ok(ConsumeOutcome::AlreadyConsumed { result });
        }

        let was_queued = matches!(entry.slot, Slot::Queued);
        let original = entry.task.clone();
        entry.task.clear();
        entry.slot = Slot::Consumed {
            result,
            at: Instant::now(),
        };

        if was_queued {
            // Reported after its lease lapsed and it was re-offered.
            inner.queue.retain(|queued| queued != id);
        }

        Ok(ConsumeOutcome::Consumed(original))
    }

    /// Put a consumed task back at the front of the queue, e.g. when its
    /// result could not be recorded.
    pub async fn restore(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        let id = task.id.clone();
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.task = task;
                entry.slot = Slot::Queued;
            }
            None => {
                inner.entries.insert(
                    id.clone(),
                    Entry {
                        task,
                        slot: Slot::Queued,
                    },
                );
            }
        }
        if !inner.queue.contains(&id) {
            inner.queue.push_front(id.clone());
        }
        info!(task_id = %id, "Task re-offered");
    }

    /// Re-queue leases that ran out and prune old completion records.
    pub async fn sweep(&self) -> SweepReport {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let mut report = SweepReport::default();

        let BoardInner { queue, entries } = &mut *inner;

        for (id, entry) in entries.iter_mut() {
            if let Slot::Leased { until } = entry.slot {
                if until <= now {
                    entry.slot = Slot::Queued;
                    queue.push_back(id.clone());
                    report.requeued += 1;
                    info!(task_id = %id, "Lease expired, task re-queued");
                }
            }
        }

        let retention = self.retention;
        entries.retain(|_, entry| match entry.slot {
            Slot::Consumed { at, .. } if now.duration_since(at) >= retention => {
                report.pruned += 1;
                false
            }
            _ => true,
        });

        if report.requeued > 0 || report.pruned > 0 {
            debug!(requeued = report.requeued, pruned = report.pruned, "Board sweep");
        }
        report
    }

    /// State of a task, if it is on the board.
    pub async fn state(&self, id: &str) -> Option<TaskState> {
        let inner = self.inner.lock().await;
        inner.entries.get(id).map(|entry| match entry.slot {
            Slot::Queued => TaskState::Available,
            Slot::Leased { .. } => TaskState::Leased,
            Slot::Consumed { .. } => TaskState::Consumed,
        })
    }

    /// Count entries per state.
    pub async fn stats(&self) -> BoardStats {
        let inner = self.inner.lock().await;
        let mut stats = BoardStats::default();
        for entry in inner.entries.values() {
            match entry.slot {
                Slot::Queued => stats.available += 1,
                Slot::Leased { .. } => stats.leased += 1,
                Slot::Consumed { .. } => stats.consumed += 1,
            }
        }
        stats
    }
}

/// Spawn a background task that periodically sweeps the board.
pub fn spawn_lease_sweep(board: Arc<TaskBoard>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            board.sweep().await;
        }
    })
}
