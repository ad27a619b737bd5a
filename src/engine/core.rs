// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! [`CoreRuntime`] owns every piece of simulation state and consumes one
//! [`Event`] at a time, returning the follow-up events as [`CoreCommand`]s.
//! It never touches the event queue; [`Runtime`](super::Runtime) does.
//!
//! Keeping the queue outside makes the core easy to drive by hand in tests:
//! feed it events at chosen times and inspect what it asks for.

use crate::algorithm::Algorithm;
use crate::cloud::{Cloud, Environment, JobStore, SimRng, VmBehaviour};
use crate::engine::context::PolicyContext;
use crate::engine::event_handlers::{
    handle_compute_finished, handle_dag_submitted, handle_inputs_transferred,
    handle_job_finished, handle_job_submit, handle_outputs_transferred,
    handle_provisioning_tick, handle_vm_launched, handle_vm_terminated, CoreCommand, CoreStep,
};
use crate::engine::workflow_engine::WorkflowEngine;
use crate::engine::{Event, SimTime};
use crate::errors::Result;
use crate::stats::{ListenerSet, SimulationListener, SimulationReport, Statistics};

/// All simulation state. No queue, no clock: time comes in with each event.
#[derive(Debug)]
pub struct CoreRuntime {
    pub(crate) engine: WorkflowEngine,
    pub(crate) cloud: Cloud,
    pub(crate) jobs: JobStore,
    pub(crate) environment: Environment,
    pub(crate) algorithm: Algorithm,
    pub(crate) rng: SimRng,
    pub(crate) behaviour: VmBehaviour,
    pub(crate) listeners: ListenerSet,
}

impl CoreRuntime {
    pub fn new(
        environment: Environment,
        algorithm: Algorithm,
        behaviour: VmBehaviour,
        rng: SimRng,
        expected_dags: usize,
    ) -> Self {
        Self {
            engine: WorkflowEngine::new(expected_dags),
            cloud: Cloud::new(),
            jobs: JobStore::new(),
            environment,
            algorithm,
            rng,
            behaviour,
            listeners: ListenerSet::default(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn SimulationListener>) {
        self.listeners.add(listener);
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn cloud(&self) -> &Cloud {
        &self.cloud
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn statistics(&self) -> &Statistics {
        self.listeners.statistics()
    }

    /// Run a policy callback with a context over the current state.
    pub(crate) fn with_policy<F>(
        &mut self,
        now: SimTime,
        commands: &mut Vec<CoreCommand>,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Algorithm, &mut PolicyContext<'_>) -> Result<()>,
    {
        let mut ctx = PolicyContext::new(
            now,
            &mut self.engine,
            &mut self.cloud,
            &mut self.jobs,
            &self.environment,
            &mut self.rng,
            self.behaviour,
            commands,
        );
        f(&mut self.algorithm, &mut ctx)
    }

    /// Handle a single event at `now`, updating state and returning the
    /// follow-up events to schedule.
    pub fn step(&mut self, now: SimTime, event: Event) -> Result<CoreStep> {
        let commands = match event {
            Event::DagSubmitted { dag } => handle_dag_submitted(self, now, dag)?,
            Event::ProvisioningTick => handle_provisioning_tick(self, now)?,
            Event::VmLaunched { vm } => handle_vm_launched(self, now, vm)?,
            Event::JobSubmit { job, vm } => handle_job_submit(self, now, job, vm)?,
            Event::InputsTransferred { vm, job } => handle_inputs_transferred(self, now, vm, job)?,
            Event::ComputeFinished { vm, job } => handle_compute_finished(self, now, vm, job)?,
            Event::OutputsTransferred { vm, job } => {
                handle_outputs_transferred(self, now, vm, job)?
            }
            Event::JobFinished { job } => handle_job_finished(self, now, job)?,
            Event::VmTerminated { vm } => handle_vm_terminated(self, now, vm)?,
        };
        Ok(CoreStep {
            commands,
            keep_running: !self.engine.workload_complete(),
        })
    }

    /// Summarise the run as of `now`.
    pub fn report(&self, now: SimTime) -> SimulationReport {
        SimulationReport::build(
            self.algorithm.kind(),
            self.algorithm.provisioner().kind().to_string(),
            self.listeners.statistics(),
            &self.cloud,
            now,
        )
    }
}
