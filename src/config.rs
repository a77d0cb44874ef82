//! Configuration types, built from environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::tasks::Operation;

/// Default shared secret for the internal task endpoints.
pub const DEFAULT_AGENT_SECRET: &str = "agent-secret-token";

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Listen address for the HTTP surface.
    pub bind: String,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Shared secret workers present on `/internal/task`.
    pub agent_secret: SecretString,
    /// Per-owner credential table (token → owner).
    pub user_tokens: HashMap<String, String>,
    /// Number of evaluation workers.
    pub eval_workers: usize,
    /// Capacity of the evaluation queue.
    pub eval_queue: usize,
    /// Offer primitive binary expressions on the Task Board instead of evaluating locally.
    pub dispatch_tasks: bool,
    /// How long a claimed task stays leased before it is re-offered.
    pub task_lease: Duration,
    /// Period of the lease sweep.
    pub sweep_interval: Duration,
    /// Advisory per-operation compute durations attached to dispatched tasks.
    pub operation_times: OperationTimes,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: PathBuf::from("./data/calculator.db"),
            agent_secret: SecretString::from(DEFAULT_AGENT_SECRET),
            user_tokens: HashMap::new(),
            eval_workers: 4,
            eval_queue: 1024,
            dispatch_tasks: true,
            task_lease: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            operation_times: OperationTimes::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset. Malformed values are reported rather than ignored.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let user_tokens = match std::env::var("CALC_USER_TOKENS") {
            Ok(raw) => parse_user_tokens("CALC_USER_TOKENS", &raw)?,
            Err(_) => HashMap::new(),
        };

        let eval_workers: usize = env_parse("CALC_EVAL_WORKERS", defaults.eval_workers)?;
        if eval_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CALC_EVAL_WORKERS".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            bind: std::env::var("CALC_BIND").unwrap_or(defaults.bind),
            db_path: std::env::var("CALC_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            agent_secret: std::env::var("CALC_AGENT_SECRET")
                .map(SecretString::from)
                .unwrap_or(defaults.agent_secret),
            user_tokens,
            eval_workers,
            eval_queue: env_parse("CALC_EVAL_QUEUE", defaults.eval_queue)?.max(1),
            dispatch_tasks: env_parse("CALC_DISPATCH_TASKS", defaults.dispatch_tasks)?,
            task_lease: Duration::from_secs(env_parse("CALC_TASK_LEASE_SECS", 30)?),
            sweep_interval: Duration::from_secs(env_parse("CALC_SWEEP_INTERVAL_SECS", 5)?.max(1)),
            operation_times: OperationTimes {
                addition: Duration::from_millis(env_parse("CALC_TIME_ADDITION_MS", 0)?),
                subtraction: Duration::from_millis(env_parse("CALC_TIME_SUBTRACTION_MS", 0)?),
                multiplication: Duration::from_millis(env_parse("CALC_TIME_MULTIPLICATION_MS", 0)?),
                division: Duration::from_millis(env_parse("CALC_TIME_DIVISION_MS", 0)?),
            },
        })
    }
}

/// Advisory compute cost per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTimes {
    pub addition: Duration,
    pub subtraction: Duration,
    pub multiplication: Duration,
    pub division: Duration,
}

impl OperationTimes {
    /// Duration hint for a given operation.
    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Add => self.addition,
            Operation::Sub => self.subtraction,
            Operation::Mul => self.multiplication,
            Operation::Div => self.division,
        }
    }
}

/// Worker agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator base URL.
    pub coordinator_url: String,
    /// Base URL of the compute service.
    pub compute_url: String,
    /// Where this agent hosts its own `/compute` endpoint.
    pub compute_bind: String,
    /// Shared secret for `/internal/task`.
    pub agent_secret: SecretString,
    /// Number of concurrent polling loops.
    pub concurrency: usize,
    /// Backoff after an idle poll or a transport failure.
    pub backoff: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://localhost:8080".to_string(),
            compute_url: "http://localhost:8081".to_string(),
            compute_bind: "0.0.0.0:8081".to_string(),
            agent_secret: SecretString::from(DEFAULT_AGENT_SECRET),
            concurrency: 1,
            backoff: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    /// Build config from environment variables.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            coordinator_url: std::env::var("CALC_COORDINATOR_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.coordinator_url),
            compute_url: std::env::var("CALC_COMPUTE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.compute_url),
            compute_bind: std::env::var("CALC_COMPUTE_BIND").unwrap_or(defaults.compute_bind),
            agent_secret: std::env::var("CALC_AGENT_SECRET")
                .map(SecretString::from)
                .unwrap_or(defaults.agent_secret),
            concurrency: env_parse("CALC_AGENT_CONCURRENCY", defaults.concurrency)?.max(1),
            backoff: Duration::from_secs(env_parse("CALC_AGENT_BACKOFF_SECS", 5)?),
        })
    }
}

/// Read and parse an env var, returning `default` when it is unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse `owner:token,owner:token` into a token → owner map.
pub fn parse_user_tokens(key: &str, raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((owner, token)) = entry.split_once(':') else {
            return Err(ConfigError::MalformedCredential {
                key: key.to_string(),
                entry: entry.to_string(),
            });
        };
        let (owner, token) = (owner.trim(), token.trim());
        if owner.is_empty() || token.is_empty() {
            return Err(ConfigError::MalformedCredential {
                key: key.to_string(),
                entry: entry.to_string(),
            });
        }
        tokens.insert(token.to_string(), owner.to_string());
    }
    Ok(tokens)
}
