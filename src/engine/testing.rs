// src/engine/testing.rs

//! Owned state for building a [`PolicyContext`] in unit tests.

use std::sync::Arc;

use rand::SeedableRng;

use crate::cloud::{Cloud, Environment, JobStore, SimRng, StorageParams, VmBehaviour, VmType};
use crate::dag::Dag;
use crate::engine::{CoreCommand, Event, PolicyContext, WorkflowEngine};
use crate::types::{DagJobId, JobId, VmId};

pub(crate) struct Harness {
    pub engine: WorkflowEngine,
    pub cloud: Cloud,
    pub jobs: JobStore,
    pub environment: Environment,
    pub rng: SimRng,
    pub commands: Vec<CoreCommand>,
}

impl Harness {
    pub fn new(vm_types: Vec<VmType>) -> Self {
        let environment = Environment::new(vm_types, StorageParams::default(), false)
            .expect("test catalog is not empty");
        Self {
            engine: WorkflowEngine::new(1),
            cloud: Cloud::new(),
            jobs: JobStore::new(),
            environment,
            rng: SimRng::seed_from_u64(7),
            commands: Vec::new(),
        }
    }

    pub fn ctx(&mut self, now: f64) -> PolicyContext<'_> {
        PolicyContext::new(
            now,
            &mut self.engine,
            &mut self.cloud,
            &mut self.jobs,
            &self.environment,
            &mut self.rng,
            VmBehaviour::default(),
            &mut self.commands,
        )
    }

    /// Provision a VM at `launch` and treat its boot as finished.
    pub fn launched_vm(&mut self, vm_type: &VmType, launch: f64) -> VmId {
        let id = self.ctx(launch).provision(vm_type).expect("provision");
        self.cloud.get_mut(id).expect("vm").mark_ready(launch);
        self.engine.vm_launched(id);
        self.commands.clear();
        id
    }

    /// VMs whose termination was requested since the last call.
    pub fn drain_terminated(&mut self) -> Vec<VmId> {
        self.commands
            .drain(..)
            .filter_map(|c| match c {
                CoreCommand::Schedule {
                    event: Event::VmTerminated { vm },
                    ..
                } => Some(vm),
                _ => None,
            })
            .collect()
    }

    /// Register `dag` with the engine and release its roots as jobs.
    pub fn submit_dag(&mut self, dag: Dag, now: f64) -> DagJobId {
        let id = self.engine.add_dag_job(Arc::new(dag), now);
        let mut ready = Vec::new();
        let dag_job = self.engine.dag_job_mut(id).expect("dag job");
        while let Some(task) = dag_job.next_ready_task() {
            ready.push(task);
        }
        for task in ready {
            let job = self.jobs.create(id, task, now, false);
            self.engine.release(job);
        }
        id
    }

    /// `JobSubmit` commands since the last call, as `(job, vm, delay)`.
    pub fn drain_submits(&mut self) -> Vec<(JobId, VmId, f64)> {
        self.commands
            .drain(..)
            .filter_map(|c| match c {
                CoreCommand::Schedule {
                    delay,
                    event: Event::JobSubmit { job, vm },
                } => Some((job, vm, delay)),
                _ => None,
            })
            .collect()
    }
}
