// src/budget/mod.rs

//! Budget and deadline splitting across the tasks of a DAG.
//!
//! Both are pure functions of the task list, the DAG and the prediction
//! environment; neither mutates its inputs.

pub mod deadline;
pub mod distribution;

pub use deadline::{assign_deadlines, critical_path, deadline_distribution};
pub use distribution::{BudgetDistribution, DEFAULT_LEVEL_ALPHA};
