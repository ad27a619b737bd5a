// src/dag/mod.rs

//! Workflow DAG model.
//!
//! - [`graph`] holds the immutable task arena with index edges.
//! - [`order`] computes topological orders and levels.
//! - [`dag_job`] tracks release/completion for one live execution.
//! - [`annotations`] is the per-run side table of scheduling data
//!   (deadline, budget, EST/EFT, rank).

pub mod annotations;
pub mod dag_job;
pub mod graph;
pub mod order;

pub use annotations::{Annotations, TaskAnnotation};
pub use dag_job::DagJob;
pub use graph::{Dag, DagFile, FileId, Task, TaskId};
pub use order::{levels, reverse_topological_order, tasks_by_level, topological_order};
