// src/engine/workflow_engine.rs

//! Bookkeeping owned by the workflow engine.
//!
//! The engine tracks which DAG jobs are active, which launched VMs are free
//! or busy, and which released jobs are still waiting for a VM. The protocol
//! that mutates this state lives in [`crate::engine::event_handlers`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::dag::{Dag, DagJob};
use crate::errors::{Result, SimError};
use crate::types::{DagJobId, JobId, VmId};

#[derive(Debug)]
pub struct WorkflowEngine {
    dag_jobs: BTreeMap<DagJobId, DagJob>,
    next_dag_job: usize,
    free_vms: BTreeSet<VmId>,
    busy_vms: BTreeSet<VmId>,
    /// Released jobs not yet handed to a VM, in release order.
    queue: VecDeque<JobId>,
    /// VMs whose termination was requested but not yet confirmed.
    terminating: BTreeSet<VmId>,
    provisioning_active: bool,
    expected_dags: usize,
    finished_dags: usize,
}

impl WorkflowEngine {
    /// `expected_dags` is the size of the workload; once that many DAG jobs
    /// have finished and no VM is shutting down, the run is complete.
    pub fn new(expected_dags: usize) -> Self {
        Self {
            dag_jobs: BTreeMap::new(),
            next_dag_job: 0,
            free_vms: BTreeSet::new(),
            busy_vms: BTreeSet::new(),
            queue: VecDeque::new(),
            terminating: BTreeSet::new(),
            provisioning_active: false,
            expected_dags,
            finished_dags: 0,
        }
    }

    // ---- DAG jobs --------------------------------------------------------

    pub fn add_dag_job(&mut self, dag: Arc<Dag>, now: f64) -> DagJobId {
        let id = DagJobId(self.next_dag_job);
        self.next_dag_job += 1;
        self.dag_jobs.insert(id, DagJob::new(id, dag, now));
        id
    }

    pub fn dag_job(&self, id: DagJobId) -> Result<&DagJob> {
        self.dag_jobs
            .get(&id)
            .ok_or_else(|| SimError::invalid_state(format!("{id} is not active")))
    }

    pub fn dag_job_mut(&mut self, id: DagJobId) -> Result<&mut DagJob> {
        self.dag_jobs
            .get_mut(&id)
            .ok_or_else(|| SimError::invalid_state(format!("{id} is not active")))
    }

    pub fn finish_dag_job(&mut self, id: DagJobId) -> Result<DagJob> {
        let dag_job = self
            .dag_jobs
            .remove(&id)
            .ok_or_else(|| SimError::invalid_state(format!("{id} finished twice")))?;
        self.finished_dags += 1;
        Ok(dag_job)
    }

    pub fn dag_jobs(&self) -> impl Iterator<Item = &DagJob> {
        self.dag_jobs.values()
    }

    pub fn has_active_dags(&self) -> bool {
        !self.dag_jobs.is_empty()
    }

    pub fn active_dag_count(&self) -> usize {
        self.dag_jobs.len()
    }

    pub fn finished_dag_count(&self) -> usize {
        self.finished_dags
    }

    // ---- released job queue -----------------------------------------------

    pub fn release(&mut self, job: JobId) {
        self.queue.push_back(job);
    }

    pub fn queued_jobs(&self) -> &VecDeque<JobId> {
        &self.queue
    }

    /// Returns false if `job` was not queued.
    pub fn remove_queued(&mut self, job: JobId) -> bool {
        match self.queue.iter().position(|j| *j == job) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }

    // ---- VM sets ------------------------------------------------------------

    pub fn free_vms(&self) -> &BTreeSet<VmId> {
        &self.free_vms
    }

    pub fn busy_vms(&self) -> &BTreeSet<VmId> {
        &self.busy_vms
    }

    pub fn vm_launched(&mut self, vm: VmId) {
        self.free_vms.insert(vm);
    }

    /// Move `vm` free -> busy. No-op if the VM is not free.
    pub fn mark_busy(&mut self, vm: VmId) {
        if self.free_vms.remove(&vm) {
            self.busy_vms.insert(vm);
        }
    }

    /// Move `vm` busy -> free. No-op if the VM is not busy.
    pub fn mark_free(&mut self, vm: VmId) {
        if self.busy_vms.remove(&vm) {
            self.free_vms.insert(vm);
        }
    }

    /// Forget `vm` from both sets and remember that it is shutting down.
    pub fn begin_termination(&mut self, vm: VmId) {
        self.free_vms.remove(&vm);
        self.busy_vms.remove(&vm);
        self.terminating.insert(vm);
    }

    pub fn vm_terminated(&mut self, vm: VmId) {
        self.free_vms.remove(&vm);
        self.busy_vms.remove(&vm);
        self.terminating.remove(&vm);
    }

    /// Utilization of the launched fleet: busy / (free + busy).
    pub fn fleet_utilization(&self) -> Option<f64> {
        let total = self.free_vms.len() + self.busy_vms.len();
        if total == 0 {
            return None;
        }
        Some(self.busy_vms.len() as f64 / total as f64)
    }

    // ---- provisioning tick --------------------------------------------------

    pub fn provisioning_active(&self) -> bool {
        self.provisioning_active
    }

    pub fn set_provisioning_active(&mut self, active: bool) {
        self.provisioning_active = active;
    }

    /// Every expected DAG finished and no VM is still shutting down.
    pub fn workload_complete(&self) -> bool {
        self.finished_dags >= self.expected_dags
            && self.dag_jobs.is_empty()
            && self.terminating.is_empty()
    }
}
