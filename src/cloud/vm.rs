// src/cloud/vm.rs

//! Execution and billing state machine of one leased VM.
//!
//! The VM never talks to the event queue directly. Each transition returns
//! the [`VmEffect`]s the core must turn into events (transfers, compute
//! completion, notifications to the engine).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::cloud::distributions::{SimRng, VmBehaviour};
use crate::cloud::job::{JobResult, JobState, JobStore};
use crate::cloud::vm_type::VmType;
use crate::errors::{Result, SimError};
use crate::types::{JobId, VmId};

/// Lower bound for a sampled performance factor, so runtimes stay finite.
const MIN_PERFORMANCE_FACTOR: f64 = 1e-6;

/// Follow-up work requested by a VM transition.
#[derive(Debug, Clone, PartialEq)]
pub enum VmEffect {
    /// The job took a core; the engine should mark the VM busy.
    JobStarted(JobId),
    /// Input files must be fetched before computing.
    FetchInputs(JobId),
    /// Computation ends after `runtime` seconds.
    ComputeScheduled { job: JobId, runtime: f64 },
    /// Output files must be stored before the job is done.
    StoreOutputs(JobId),
    /// The job reached a terminal result; the engine must be told.
    JobFinished(JobId),
}

#[derive(Debug, Clone)]
pub struct Vm {
    id: VmId,
    vm_type: VmType,
    behaviour: VmBehaviour,
    idle_cores: u32,
    queue: VecDeque<JobId>,
    running: BTreeSet<JobId>,
    waiting_input: BTreeSet<JobId>,
    /// Outcome decided when computation starts, applied when it ends.
    pending_results: BTreeMap<JobId, JobResult>,
    launch_time: Option<f64>,
    ready_time: Option<f64>,
    terminate_time: Option<f64>,
    terminated: bool,
    cpu_seconds: f64,
    idle_ticks: u32,
    first_job: Option<JobId>,
}

impl Vm {
    pub fn new(id: VmId, vm_type: VmType, behaviour: VmBehaviour) -> Self {
        let idle_cores = vm_type.cores.max(1);
        Self {
            id,
            vm_type,
            behaviour,
            idle_cores,
            queue: VecDeque::new(),
            running: BTreeSet::new(),
            waiting_input: BTreeSet::new(),
            pending_results: BTreeMap::new(),
            launch_time: None,
            ready_time: None,
            terminate_time: None,
            terminated: false,
            cpu_seconds: 0.0,
            idle_ticks: 0,
            first_job: None,
        }
    }

    pub fn id(&self) -> VmId {
        self.id
    }

    pub fn vm_type(&self) -> &VmType {
        &self.vm_type
    }

    pub fn is_launched(&self) -> bool {
        self.launch_time.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn launch_time(&self) -> Option<f64> {
        self.launch_time
    }

    pub fn ready_time(&self) -> Option<f64> {
        self.ready_time
    }

    pub fn terminate_time(&self) -> Option<f64> {
        self.terminate_time
    }

    pub fn cpu_seconds(&self) -> f64 {
        self.cpu_seconds
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_jobs(&self) -> &BTreeSet<JobId> {
        &self.running
    }

    pub fn waiting_input_jobs(&self) -> &BTreeSet<JobId> {
        &self.waiting_input
    }

    pub fn idle_cores(&self) -> u32 {
        self.idle_cores
    }

    /// Nothing queued, running or waiting for input.
    pub fn is_really_free(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty() && self.waiting_input.is_empty()
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub fn increment_idle_ticks(&mut self) {
        self.idle_ticks += 1;
    }

    pub fn reset_idle_ticks(&mut self) {
        self.idle_ticks = 0;
    }

    /// First job ever submitted here; it is charged for the VM's boot.
    pub fn first_job(&self) -> Option<JobId> {
        self.first_job
    }

    /// Start billing. Launching twice, or after termination, is a usage error.
    pub fn launch(&mut self, now: f64) -> Result<()> {
        if self.terminated {
            return Err(SimError::invalid_state(format!(
                "attempted to launch terminated {}",
                self.id
            )));
        }
        if self.launch_time.is_some() {
            return Err(SimError::invalid_state(format!(
                "attempted to launch already launched {}",
                self.id
            )));
        }
        self.launch_time = Some(now);
        debug!(vm = %self.id, vm_type = %self.vm_type.name, time = now, "vm launched");
        Ok(())
    }

    /// Provisioning finished; the VM can take work.
    pub fn mark_ready(&mut self, now: f64) {
        self.ready_time = Some(now);
    }

    /// Enqueue `job` and start it right away if a core is idle.
    pub fn submit(&mut self, job: JobId, jobs: &mut JobStore, now: f64) -> Result<Vec<VmEffect>> {
        if self.terminated {
            return Err(SimError::invalid_state(format!(
                "attempted to submit {} to terminated {}",
                job, self.id
            )));
        }
        if !self.is_launched() {
            return Err(SimError::invalid_state(format!(
                "attempted to submit {} to {} before launch",
                job, self.id
            )));
        }

        let j = jobs.get_mut(job)?;
        j.submit_time = now;
        j.vm = Some(self.id);
        j.set_state(JobState::Idle)?;

        self.first_job.get_or_insert(job);
        self.queue.push_back(job);
        trace!(vm = %self.id, job = %job, queued = self.queue.len(), "job submitted");

        self.start_jobs(jobs, now)
    }

    /// Strict FIFO: always the queue head, while cores are idle.
    fn start_jobs(&mut self, jobs: &mut JobStore, now: f64) -> Result<Vec<VmEffect>> {
        let mut effects = Vec::new();
        while self.idle_cores > 0 {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            effects.extend(self.start_job(job, jobs, now)?);
        }
        Ok(effects)
    }

    fn start_job(&mut self, job: JobId, jobs: &mut JobStore, now: f64) -> Result<Vec<VmEffect>> {
        let j = jobs.get_mut(job)?;
        if j.state() != JobState::Idle {
            return Err(SimError::invalid_state(format!(
                "cannot start {} on {}: state is {:?}, expected Idle",
                job,
                self.id,
                j.state()
            )));
        }
        j.start_time = now;
        j.set_state(JobState::Running)?;

        self.idle_cores -= 1;
        self.waiting_input.insert(job);
        Ok(vec![VmEffect::JobStarted(job), VmEffect::FetchInputs(job)])
    }

    /// Inputs are local: sample the actual runtime and the outcome.
    pub fn inputs_transferred(
        &mut self,
        job: JobId,
        task_size: f64,
        rng: &mut SimRng,
    ) -> Result<Vec<VmEffect>> {
        if self.terminated {
            debug!(vm = %self.id, job = %job, "ignoring input completion on terminated vm");
            return Ok(Vec::new());
        }
        if self.running.contains(&job) {
            return Err(SimError::invalid_state(format!(
                "{} is already computing on {}",
                job, self.id
            )));
        }
        if !self.waiting_input.remove(&job) {
            return Err(SimError::invalid_state(format!(
                "{} is not waiting for input on {}",
                job, self.id
            )));
        }
        self.running.insert(job);

        let factor = self
            .behaviour
            .variation
            .sample(rng)
            .max(MIN_PERFORMANCE_FACTOR);
        let base = task_size / (self.vm_type.mips * factor);
        let mut runtime = self.behaviour.runtime.actual_runtime(base, rng);

        let result = if self.behaviour.failure.failure_occurred(rng) {
            runtime = self.behaviour.failure.runtime_before_failure(runtime, rng);
            JobResult::Failure
        } else {
            JobResult::Success
        };
        self.pending_results.insert(job, result);

        trace!(vm = %self.id, job = %job, runtime, %result, "compute started");
        Ok(vec![VmEffect::ComputeScheduled { job, runtime }])
    }

    pub fn compute_finished(&mut self, job: JobId, jobs: &JobStore) -> Result<Vec<VmEffect>> {
        if self.terminated {
            debug!(vm = %self.id, job = %job, "ignoring stale compute completion");
            return Ok(Vec::new());
        }
        let state = jobs.get(job)?.state();
        if state != JobState::Running || !self.running.contains(&job) {
            return Err(SimError::invalid_state(format!(
                "cannot finish {} on {}: state is {:?}",
                job, self.id, state
            )));
        }
        Ok(vec![VmEffect::StoreOutputs(job)])
    }

    /// Outputs stored: free the core, settle the job, start the next one.
    pub fn outputs_transferred(
        &mut self,
        job: JobId,
        jobs: &mut JobStore,
        now: f64,
    ) -> Result<Vec<VmEffect>> {
        if self.terminated {
            debug!(vm = %self.id, job = %job, "ignoring stale output completion");
            return Ok(Vec::new());
        }
        if !self.running.remove(&job) {
            return Err(SimError::invalid_state(format!(
                "{} is not running on {}",
                job, self.id
            )));
        }
        self.idle_cores += 1;
        let result = self
            .pending_results
            .remove(&job)
            .unwrap_or(JobResult::Success);

        let j = jobs.get_mut(job)?;
        j.finish_time = now;
        j.set_state(JobState::Terminated)?;
        j.set_result(result)?;
        self.cpu_seconds += j.duration();

        let mut effects = vec![VmEffect::JobFinished(job)];
        effects.extend(self.start_jobs(jobs, now)?);
        Ok(effects)
    }

    /// Irreversible shutdown. Every queued, waiting or running job fails now.
    pub fn terminate(
        &mut self,
        now: f64,
        deprovisioning_delay: f64,
        jobs: &mut JobStore,
    ) -> Result<Vec<VmEffect>> {
        if self.terminated {
            return Err(SimError::invalid_state(format!(
                "attempted to terminate {} twice",
                self.id
            )));
        }
        self.terminated = true;
        self.terminate_time = Some(now + deprovisioning_delay);

        let victims: Vec<JobId> = self
            .running
            .iter()
            .chain(self.waiting_input.iter())
            .copied()
            .chain(self.queue.iter().copied())
            .collect();

        let mut effects = Vec::with_capacity(victims.len());
        for job in victims {
            let j = jobs.get_mut(job)?;
            j.finish_time = now;
            j.set_state(JobState::Terminated)?;
            j.set_result(JobResult::Failure)?;
            effects.push(VmEffect::JobFinished(job));
        }

        self.queue.clear();
        self.running.clear();
        self.waiting_input.clear();
        self.pending_results.clear();
        self.idle_cores = self.vm_type.cores.max(1);

        debug!(
            vm = %self.id,
            time = now,
            failed_jobs = effects.len(),
            "vm terminated"
        );
        Ok(effects)
    }

    /// Seconds billed so far.
    pub fn runtime(&self, now: f64) -> f64 {
        match (self.launch_time, self.terminate_time) {
            (None, _) => 0.0,
            (Some(launch), Some(end)) => end - launch,
            (Some(launch), None) => now - launch,
        }
    }

    /// Whole billing periods times price; a launched VM pays at least one
    /// period, a VM that never launched pays nothing.
    pub fn cost(&self, now: f64) -> f64 {
        if !self.is_launched() {
            return 0.0;
        }
        self.vm_type.cost_for(self.runtime(now))
    }

    pub fn utilization(&self, now: f64) -> f64 {
        let capacity = self.runtime(now) * f64::from(self.vm_type.cores.max(1));
        if capacity <= 0.0 {
            return 0.0;
        }
        self.cpu_seconds / capacity
    }
}
