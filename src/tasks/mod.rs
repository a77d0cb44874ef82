//! Tasks: primitive operations offered to worker agents.

pub mod board;
pub mod model;

pub use board::{BoardStats, ConsumeOutcome, TaskBoard, TaskState, spawn_lease_sweep};
pub use model::{Operation, Task, TaskEnvelope, TaskReport};
