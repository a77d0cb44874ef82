//! Worker agent: polls the coordinator for tasks and computes them.

pub mod client;
pub mod compute;
pub mod runner;

pub use client::{ComputeClient, CoordinatorClient};
pub use compute::{ComputeRequest, compute, compute_routes};
pub use runner::{Agent, PollOutcome, spawn_loops};
