// src/dag/annotations.rs

//! Per-run scheduling annotations kept beside (not inside) the DAG.

use crate::dag::graph::{Dag, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TaskAnnotation {
    pub deadline: f64,
    pub budget: f64,
    pub earliest_start: f64,
    pub earliest_finish: f64,
    pub rank: f64,
}

/// Side table `TaskId -> TaskAnnotation` owned by whichever algorithm run is
/// scheduling the DAG. Dropping it resets every annotation.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    entries: Vec<TaskAnnotation>,
}

impl Annotations {
    pub fn for_dag(dag: &Dag) -> Self {
        Self {
            entries: vec![TaskAnnotation::default(); dag.len()],
        }
    }

    pub fn get(&self, task: TaskId) -> Option<&TaskAnnotation> {
        self.entries.get(task.0)
    }

    pub fn get_mut(&mut self, task: TaskId) -> Option<&mut TaskAnnotation> {
        self.entries.get_mut(task.0)
    }

    pub fn earliest_finish(&self, task: TaskId) -> f64 {
        self.get(task).map(|a| a.earliest_finish).unwrap_or(f64::INFINITY)
    }

    pub fn earliest_start(&self, task: TaskId) -> f64 {
        self.get(task).map(|a| a.earliest_start).unwrap_or(f64::INFINITY)
    }

    pub fn rank(&self, task: TaskId) -> f64 {
        self.get(task).map(|a| a.rank).unwrap_or(0.0)
    }
}
