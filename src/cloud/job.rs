// src/cloud/job.rs

//! One execution attempt of a task, and the arena that owns all attempts.

use std::fmt;

use crate::dag::TaskId;
use crate::errors::{Result, SimError};
use crate::types::{DagJobId, JobId, VmId};

/// Linear lifecycle: `Queued -> Idle -> Running -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Released by the engine, not yet submitted to a VM.
    Queued,
    /// In a VM's FIFO, waiting for a core.
    Idle,
    /// Holding a core (possibly still waiting for input files).
    Running,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    None,
    Success,
    Failure,
    Cancelled,
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobResult::None => "none",
            JobResult::Success => "success",
            JobResult::Failure => "failure",
            JobResult::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub dag_job: DagJobId,
    pub task: TaskId,
    pub vm: Option<VmId>,
    pub release_time: f64,
    pub submit_time: f64,
    pub start_time: f64,
    pub finish_time: f64,
    pub estimated_runtime: f64,
    pub is_retry: bool,
    state: JobState,
    result: JobResult,
}

impl Job {
    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn result(&self) -> JobResult {
        self.result
    }

    /// States only move forward.
    pub fn set_state(&mut self, next: JobState) -> Result<()> {
        let ok = matches!(
            (self.state, next),
            (JobState::Queued, JobState::Idle)
                | (JobState::Idle, JobState::Running)
                | (JobState::Running, JobState::Terminated)
                | (JobState::Queued, JobState::Terminated)
                | (JobState::Idle, JobState::Terminated)
        );
        if !ok {
            return Err(SimError::invalid_state(format!(
                "{}: illegal state change {:?} -> {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// The result is written exactly once.
    pub fn set_result(&mut self, result: JobResult) -> Result<()> {
        if self.result != JobResult::None {
            return Err(SimError::invalid_state(format!(
                "{}: result already set to {}, refusing {}",
                self.id, self.result, result
            )));
        }
        self.result = result;
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.finish_time - self.start_time
    }
}

/// Owns every job of a simulation. Jobs are never reused or removed.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Vec<Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, dag_job: DagJobId, task: TaskId, now: f64, is_retry: bool) -> JobId {
        let id = JobId(self.jobs.len());
        self.jobs.push(Job {
            id,
            dag_job,
            task,
            vm: None,
            release_time: now,
            submit_time: 0.0,
            start_time: 0.0,
            finish_time: 0.0,
            estimated_runtime: 0.0,
            is_retry,
            state: JobState::Queued,
            result: JobResult::None,
        });
        id
    }

    pub fn get(&self, id: JobId) -> Result<&Job> {
        self.jobs
            .get(id.0)
            .ok_or_else(|| SimError::invalid_state(format!("unknown {id}")))
    }

    pub fn get_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(id.0)
            .ok_or_else(|| SimError::invalid_state(format!("unknown {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
