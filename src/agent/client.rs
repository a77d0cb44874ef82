//! HTTP clients an agent uses: the coordinator's task endpoints and the
//! compute service.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::compute::ComputeRequest;
use crate::error::AgentError;
use crate::tasks::{Operation, Task, TaskEnvelope, TaskReport};

/// Client for `/internal/task`.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    client: reqwest::Client,
    base_url: String,
    secret: SecretString,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>, secret: SecretString) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, secret)
    }

    /// Share an existing connection pool.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret: SecretString,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        }
    }

    fn task_url(&self) -> String {
        format!("{}/internal/task", self.base_url)
    }

    /// Claim a task. `Ok(None)` means the coordinator has nothing to hand out.
    pub async fn fetch_task(&self) -> Result<Option<Task>, AgentError> {
        let resp = self
            .client
            .get(self.task_url())
            .header(reqwest::header::AUTHORIZATION, self.secret.expose_secret())
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let envelope: TaskEnvelope = resp
                    .json()
                    .await
                    .map_err(|e| AgentError::Decode(format!("task envelope: {e}")))?;
                debug!(task_id = %envelope.task.id, "Fetched task");
                Ok(Some(envelope.task))
            }
            status => Err(AgentError::Status {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Report a result for a previously fetched task.
    pub async fn report_result(&self, id: &str, result: f64) -> Result<(), AgentError> {
        let report = TaskReport {
            id: id.to_string(),
            result,
        };
        let resp = self
            .client
            .post(self.task_url())
            .header(reqwest::header::AUTHORIZATION, self.secret.expose_secret())
            .json(&report)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AgentError::Status {
                status: resp.status(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Client for a `/compute` endpoint.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    client: reqwest::Client,
    base_url: String,
}

impl ComputeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ask the compute service for `arg1 <operation> arg2`.
    pub async fn compute(
        &self,
        arg1: f64,
        arg2: f64,
        operation: Operation,
    ) -> Result<f64, AgentError> {
        let resp = self
            .client
            .post(format!("{}/compute", self.base_url))
            .json(&ComputeRequest {
                arg1,
                arg2,
                operation,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AgentError::Status {
                status: resp.status(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        resp.json::<f64>()
            .await
            .map_err(|e| AgentError::Decode(format!("compute result: {e}")))
    }
}
