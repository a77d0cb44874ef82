//! Expressions: submitted formulas and their lifecycle state.

pub mod model;

pub use model::{Expression, ExpressionStatus, Outcome};
