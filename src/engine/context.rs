// src/engine/context.rs

//! The view of the simulation handed to scheduling and provisioning policies.

use tracing::{debug, info};

use crate::cloud::{
    Cloud, Environment, Job, JobState, JobStore, SimRng, Vm, VmBehaviour, VmEffect, VmType,
};
use crate::dag::DagJob;
use crate::engine::event_handlers::CoreCommand;
use crate::engine::workflow_engine::WorkflowEngine;
use crate::engine::{Event, SimTime};
use crate::errors::{Result, SimError};
use crate::types::{DagJobId, JobId, VmId};

/// Split borrow of the core state, valid for one callback.
///
/// Policies read the engine and cloud through it and act through
/// [`provision`](Self::provision), [`submit`](Self::submit) and
/// [`terminate`](Self::terminate). Follow-up events are collected as
/// [`CoreCommand`]s and applied by the run loop after the current event.
pub struct PolicyContext<'a> {
    pub now: SimTime,
    pub engine: &'a mut WorkflowEngine,
    pub cloud: &'a mut Cloud,
    pub jobs: &'a mut JobStore,
    pub environment: &'a Environment,
    pub rng: &'a mut SimRng,
    behaviour: VmBehaviour,
    commands: &'a mut Vec<CoreCommand>,
}

impl<'a> PolicyContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        now: SimTime,
        engine: &'a mut WorkflowEngine,
        cloud: &'a mut Cloud,
        jobs: &'a mut JobStore,
        environment: &'a Environment,
        rng: &'a mut SimRng,
        behaviour: VmBehaviour,
        commands: &'a mut Vec<CoreCommand>,
    ) -> Self {
        Self {
            now,
            engine,
            cloud,
            jobs,
            environment,
            rng,
            behaviour,
            commands,
        }
    }

    pub fn schedule(&mut self, delay: SimTime, event: Event) -> Result<()> {
        if !(delay >= 0.0) {
            return Err(SimError::invalid_state(format!(
                "policy scheduled {event:?} with negative delay {delay}"
            )));
        }
        self.commands.push(CoreCommand::Schedule { delay, event });
        Ok(())
    }

    pub fn job(&self, id: JobId) -> Result<&Job> {
        self.jobs.get(id)
    }

    pub fn vm(&self, id: VmId) -> Result<&Vm> {
        self.cloud.get(id)
    }

    pub fn dag_job(&self, id: DagJobId) -> Result<&DagJob> {
        self.engine.dag_job(id)
    }

    /// Snapshot of the released-but-unassigned jobs, in release order.
    pub fn queued_jobs(&self) -> Vec<JobId> {
        self.engine.queued_jobs().iter().copied().collect()
    }

    /// Free VMs with nothing queued, running or waiting for input.
    pub fn really_free_vms(&self) -> Vec<VmId> {
        self.engine
            .free_vms()
            .iter()
            .copied()
            .filter(|id| self.cloud.get(*id).map(Vm::is_really_free).unwrap_or(false))
            .collect()
    }

    /// Lease a new VM. Billing starts now; the VM takes work once
    /// `VmLaunched` arrives after the sampled provisioning delay.
    pub fn provision(&mut self, vm_type: &VmType) -> Result<VmId> {
        let id = self.cloud.create_vm(vm_type.clone(), self.behaviour);
        self.cloud.get_mut(id)?.launch(self.now)?;
        let delay = vm_type.provisioning_delay.sample(self.rng);
        info!(
            vm = %id,
            vm_type = %vm_type.name,
            mips = vm_type.mips,
            delay,
            time = self.now,
            "provisioning vm"
        );
        self.schedule(delay, Event::VmLaunched { vm: id })?;
        Ok(id)
    }

    /// Hand `job` to `vm`; the VM receives it after `delay`.
    ///
    /// The VM is marked busy right away so later matches in the same pass
    /// (or before the submit lands) do not pick it again.
    pub fn submit(&mut self, job: JobId, vm: VmId, delay: SimTime) -> Result<()> {
        {
            let v = self.cloud.get_mut(vm)?;
            if v.is_terminated() {
                return Err(SimError::invalid_state(format!(
                    "attempted to schedule {job} on terminated {vm}"
                )));
            }
            v.reset_idle_ticks();
        }
        self.engine.mark_busy(vm);
        self.engine.remove_queued(job);

        let j = self.jobs.get_mut(job)?;
        if j.state() != JobState::Queued {
            return Err(SimError::invalid_state(format!(
                "attempted to schedule {job} in state {:?}",
                j.state()
            )));
        }
        j.vm = Some(vm);

        debug!(job = %job, vm = %vm, delay, time = self.now, "submitting job");
        self.schedule(delay, Event::JobSubmit { job, vm })
    }

    /// Request termination of `vm`. Jobs still on it fail now; billing stops
    /// after the sampled deprovisioning delay.
    pub fn terminate(&mut self, vm: VmId) -> Result<()> {
        let v = self.cloud.get_mut(vm)?;
        let delay = v.vm_type().deprovisioning_delay.sample(self.rng);
        let effects = v.terminate(self.now, delay, self.jobs)?;
        self.engine.begin_termination(vm);
        info!(vm = %vm, delay, time = self.now, failed_jobs = effects.len(), "terminating vm");

        for effect in effects {
            if let VmEffect::JobFinished(job) = effect {
                self.schedule(0.0, Event::JobFinished { job })?;
            }
        }
        self.schedule(delay, Event::VmTerminated { vm })
    }
}
