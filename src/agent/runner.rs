//! The agent's polling loop: fetch a task, compute it, report back.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{ComputeClient, CoordinatorClient};
use crate::config::AgentConfig;
use crate::tasks::Task;

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The coordinator had nothing to hand out.
    Idle,
    /// The coordinator could not be reached or answered unexpectedly.
    FetchFailed,
    /// A task was computed and its result accepted.
    Completed { task_id: String, result: f64 },
    /// A task was computed but the report was not accepted.
    ReportFailed { task_id: String, result: f64 },
    /// The fetched task carried no work.
    Skipped { task_id: String },
}

impl PollOutcome {
    /// Whether the loop should wait before polling again.
    pub fn should_back_off(&self) -> bool {
        matches!(self, Self::Idle | Self::FetchFailed)
    }
}

/// A worker agent.
pub struct Agent {
    coordinator: CoordinatorClient,
    compute: ComputeClient,
    backoff: Duration,
}

impl Agent {
    pub fn new(coordinator: CoordinatorClient, compute: ComputeClient, backoff: Duration) -> Self {
        Self {
            coordinator,
            compute,
            backoff,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let client = reqwest::Client::new();
        Self::new(
            CoordinatorClient::with_client(
                client.clone(),
                &config.coordinator_url,
                config.agent_secret.clone(),
            ),
            ComputeClient::with_client(client, &config.compute_url),
            config.backoff,
        )
    }

    /// Fetch at most one task, compute it, and report the result.
    pub async fn poll_once(&self) -> PollOutcome {
        let task = match self.coordinator.fetch_task().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("No task available");
                return PollOutcome::Idle;
            }
            Err(e) => {
                warn!(error = %e, "Error fetching task");
                return PollOutcome::FetchFailed;
            }
        };

        let Some(result) = self.execute(&task).await else {
            warn!(task_id = %task.id, "Fetched task has no operands, skipping");
            return PollOutcome::Skipped { task_id: task.id };
        };

        match self.coordinator.report_result(&task.id, result).await {
            Ok(()) => {
                info!(task_id = %task.id, result, "Task result reported");
                PollOutcome::Completed {
                    task_id: task.id,
                    result,
                }
            }
            Err(e) => {
                // No retry: once the lease lapses the coordinator re-offers the task.
                warn!(task_id = %task.id, error = %e, "Error sending result");
                PollOutcome::ReportFailed {
                    task_id: task.id,
                    result,
                }
            }
        }
    }

    /// Compute a task, falling back to zero if the compute service fails.
    async fn execute(&self, task: &Task) -> Option<f64> {
        let (Some(arg1), Some(arg2), Some(operation)) = (task.arg1, task.arg2, task.operation)
        else {
            return None;
        };

        if task.operation_time > 0 {
            tokio::time::sleep(Duration::from_millis(task.operation_time)).await;
        }

        match self.compute.compute(arg1, arg2, operation).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Compute failed, reporting 0");
                Some(0.0)
            }
        }
    }

    /// Poll forever, backing off when idle or unreachable.
    pub async fn run(&self) {
        info!(backoff_secs = self.backoff.as_secs(), "Agent polling for tasks");
        loop {
            if self.poll_once().await.should_back_off() {
                tokio::time::sleep(self.backoff).await;
            }
        }
    }
}

/// Start `loops` concurrent polling loops sharing one agent.
pub fn spawn_loops(agent: Arc<Agent>, loops: usize) -> Vec<JoinHandle<()>> {
    (0..loops.max(1))
        .map(|_| {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.run().await })
        })
        .collect()
}
