//! calc-grid: distributed arithmetic evaluation with pollable worker agents.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod eval;
pub mod expressions;
pub mod store;
pub mod tasks;
