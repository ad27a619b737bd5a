// src/dag/dag_job.rs

//! Completion tracker for one live execution of a DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::trace;

use crate::dag::graph::{Dag, TaskId};
use crate::errors::{Result, SimError};
use crate::types::{DagJobId, JobId};

/// Tracks which tasks of a DAG have been released and completed.
///
/// A task is released iff all of its parents are completed; roots are
/// released on construction. Released tasks wait in a FIFO until the engine
/// turns them into jobs with [`DagJob::next_ready_task`].
#[derive(Debug, Clone)]
pub struct DagJob {
    id: DagJobId,
    dag: Arc<Dag>,
    start_time: f64,
    released: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    ready: VecDeque<TaskId>,
    executions: HashMap<TaskId, JobId>,
}

impl DagJob {
    pub fn new(id: DagJobId, dag: Arc<Dag>, start_time: f64) -> Self {
        let mut job = Self {
            id,
            dag,
            start_time,
            released: HashSet::new(),
            completed: HashSet::new(),
            ready: VecDeque::new(),
            executions: HashMap::new(),
        };
        let roots: Vec<TaskId> = job.dag.roots().collect();
        for root in roots {
            job.release(root);
        }
        job
    }

    pub fn id(&self) -> DagJobId {
        self.id
    }

    pub fn dag(&self) -> &Arc<Dag> {
        &self.dag
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    fn release(&mut self, task: TaskId) {
        if self.released.insert(task) {
            self.ready.push_back(task);
        }
    }

    /// Pop the oldest released task that has not been turned into a job yet.
    pub fn next_ready_task(&mut self) -> Option<TaskId> {
        self.ready.pop_front()
    }

    pub fn has_ready_tasks(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn is_released(&self, task: TaskId) -> bool {
        self.released.contains(&task)
    }

    pub fn is_complete(&self, task: TaskId) -> bool {
        self.completed.contains(&task)
    }

    pub fn released_count(&self) -> usize {
        self.released.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Mark `task` complete and release every child whose parents are now
    /// all complete. Returns the newly released children.
    pub fn complete_task(&mut self, task: TaskId) -> Result<Vec<TaskId>> {
        if !self.released.contains(&task) {
            return Err(SimError::invalid_state(format!(
                "task '{}' of DAG '{}' completed before being released",
                self.dag.task(task).name,
                self.dag.name()
            )));
        }
        if !self.completed.insert(task) {
            return Err(SimError::invalid_state(format!(
                "task '{}' of DAG '{}' completed twice",
                self.dag.task(task).name,
                self.dag.name()
            )));
        }

        let dag = Arc::clone(&self.dag);
        let mut newly_released = Vec::new();
        for child in &dag.task(task).children {
            if self.released.contains(child) {
                continue;
            }
            let ready = dag
                .task(*child)
                .parents
                .iter()
                .all(|p| self.completed.contains(p));
            if ready {
                self.release(*child);
                newly_released.push(*child);
            }
        }

        trace!(
            dag = %self.dag.name(),
            task = %dag.task(task).name,
            released = newly_released.len(),
            "task completed"
        );
        Ok(newly_released)
    }

    pub fn record_job_execution(&mut self, task: TaskId, job: JobId) {
        self.executions.insert(task, job);
    }

    /// Job that completed `task`, for data-locality lookups.
    pub fn job_for(&self, task: TaskId) -> Option<JobId> {
        self.executions.get(&task).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.released.len() == self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork_join() -> Arc<Dag> {
        // a -> {b, c} -> d
        let mut dag = Dag::new("0", "fork");
        for name in ["a", "b", "c", "d"] {
            dag.add_task(name, 1.0, 0).unwrap();
        }
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "d").unwrap();
        dag.add_edge("c", "d").unwrap();
        Arc::new(dag)
    }

    #[test]
    fn roots_are_released_on_construction() {
        let mut job = DagJob::new(DagJobId(0), fork_join(), 0.0);
        assert_eq!(job.next_ready_task(), Some(TaskId(0)));
        assert_eq!(job.next_ready_task(), None);
        assert!(!job.is_finished());
    }

    #[test]
    fn join_waits_for_all_parents() {
        let mut job = DagJob::new(DagJobId(0), fork_join(), 0.0);
        job.next_ready_task();
        let released = job.complete_task(TaskId(0)).unwrap();
        assert_eq!(released, vec![TaskId(1), TaskId(2)]);

        assert!(job.complete_task(TaskId(1)).unwrap().is_empty());
        assert!(!job.is_released(TaskId(3)));
        assert_eq!(job.complete_task(TaskId(2)).unwrap(), vec![TaskId(3)]);
        assert!(!job.is_finished());

        job.complete_task(TaskId(3)).unwrap();
        assert!(job.is_finished());
    }

    #[test]
    fn completing_unreleased_task_is_an_error() {
        let mut job = DagJob::new(DagJobId(0), fork_join(), 0.0);
        assert!(matches!(
            job.complete_task(TaskId(3)),
            Err(SimError::InvalidState(_))
        ));
    }

    #[test]
    fn completing_twice_is_an_error() {
        let mut job = DagJob::new(DagJobId(0), fork_join(), 0.0);
        job.complete_task(TaskId(0)).unwrap();
        assert!(job.complete_task(TaskId(0)).is_err());
    }

    #[test]
    fn records_executing_job() {
        let mut job = DagJob::new(DagJobId(0), fork_join(), 0.0);
        job.record_job_execution(TaskId(0), JobId(7));
        assert_eq!(job.job_for(TaskId(0)), Some(JobId(7)));
        assert_eq!(job.job_for(TaskId(1)), None);
    }
}
