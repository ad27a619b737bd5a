// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! One free function per [`Event`](super::Event) variant. Each mutates the
//! [`CoreRuntime`] and returns the follow-up events as commands.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::algorithm::SchedulingPolicy;
use crate::cloud::{JobResult, VmEffect};
use crate::dag::{Dag, TaskId};
use crate::engine::core::CoreRuntime;
use crate::engine::{Event, SimTime, PROVISIONING_INTERVAL};
use crate::errors::{Result, SimError};
use crate::stats::SimulationListener;
use crate::types::{DagJobId, JobId, VmId};

/// Command produced by the pure core, to be executed by the run loop.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Deliver `event` after `delay` simulated seconds.
    Schedule { delay: SimTime, event: Event },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// False once every expected DAG has finished.
    pub keep_running: bool,
}

fn schedule(commands: &mut Vec<CoreCommand>, delay: SimTime, event: Event) {
    commands.push(CoreCommand::Schedule { delay, event });
}

/// The DAG and task a job executes.
fn job_task(core: &CoreRuntime, job: JobId) -> Result<(Arc<Dag>, TaskId)> {
    let j = core.jobs.get(job)?;
    let dag = Arc::clone(core.engine.dag_job(j.dag_job)?.dag());
    Ok((dag, j.task))
}

/// Turn every ready task of `dag_job` into a released job.
fn release_ready(core: &mut CoreRuntime, now: SimTime, dag_job: DagJobId) -> Result<()> {
    let mut ready = Vec::new();
    let tracker = core.engine.dag_job_mut(dag_job)?;
    while let Some(task) = tracker.next_ready_task() {
        ready.push(task);
    }
    for task in ready {
        let job = core.jobs.create(dag_job, task, now, false);
        release_job(core, job)?;
    }
    Ok(())
}

fn release_job(core: &mut CoreRuntime, job: JobId) -> Result<()> {
    core.engine.release(job);
    let j = core.jobs.get(job)?;
    debug!(job = %job, dag_job = %j.dag_job, task = %j.task, retry = j.is_retry, "job released");
    core.listeners.job_released(j);
    Ok(())
}

/// A workflow arrives: track it, release its roots, make sure the
/// provisioning tick runs, then let the policy plan it.
pub fn handle_dag_submitted(
    core: &mut CoreRuntime,
    now: SimTime,
    dag: Arc<Dag>,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    let id = core.engine.add_dag_job(dag, now);
    {
        let dag_job = core.engine.dag_job(id)?;
        info!(
            dag_job = %id,
            dag = dag_job.dag().name(),
            tasks = dag_job.dag().len(),
            time = now,
            "dag submitted"
        );
        core.listeners.dag_started(dag_job);
    }
    release_ready(core, now, id)?;

    if !core.engine.provisioning_active() {
        core.engine.set_provisioning_active(true);
        schedule(&mut commands, 0.0, Event::ProvisioningTick);
    }

    core.with_policy(now, &mut commands, |a, ctx| a.dag_submitted(ctx, id))?;

    if core.engine.dag_job(id)?.is_finished() {
        finish_dag(core, now, id, &mut commands)?;
    }
    Ok(commands)
}

/// Periodic provisioner run. Stops rescheduling itself once no DAG is
/// active; the next submission restarts it.
pub fn handle_provisioning_tick(core: &mut CoreRuntime, now: SimTime) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    if !core.engine.has_active_dags() {
        debug!(time = now, "no active dags; provisioning tick stops");
        core.engine.set_provisioning_active(false);
        return Ok(commands);
    }
    core.with_policy(now, &mut commands, |a, ctx| a.provision_resources(ctx))?;
    schedule(&mut commands, PROVISIONING_INTERVAL, Event::ProvisioningTick);
    Ok(commands)
}

pub fn handle_vm_launched(core: &mut CoreRuntime, now: SimTime, vm: VmId) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    let v = core.cloud.get_mut(vm)?;
    if v.is_terminated() {
        debug!(vm = %vm, "vm terminated while booting; ignoring launch");
        return Ok(commands);
    }
    v.mark_ready(now);
    core.engine.vm_launched(vm);
    info!(vm = %vm, vm_type = %v.vm_type().name, time = now, "vm launched");
    core.listeners.vm_launched(core.cloud.get(vm)?);

    core.with_policy(now, &mut commands, |a, ctx| a.vm_launched(ctx, vm))?;
    Ok(commands)
}

/// A job reaches its VM. Submitting to a terminated VM aborts the run.
pub fn handle_job_submit(
    core: &mut CoreRuntime,
    now: SimTime,
    job: JobId,
    vm: VmId,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    let effects = core.cloud.get_mut(vm)?.submit(job, &mut core.jobs, now)?;
    apply_vm_effects(core, vm, effects, &mut commands)?;
    Ok(commands)
}

pub fn handle_inputs_transferred(
    core: &mut CoreRuntime,
    _now: SimTime,
    vm: VmId,
    job: JobId,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    if core.cloud.get(vm)?.is_terminated() {
        debug!(vm = %vm, job = %job, "stale input transfer on terminated vm");
        return Ok(commands);
    }
    let (dag, task) = job_task(core, job)?;
    let size = dag.task(task).size;
    let effects = core
        .cloud
        .get_mut(vm)?
        .inputs_transferred(job, size, &mut core.rng)?;
    apply_vm_effects(core, vm, effects, &mut commands)?;
    Ok(commands)
}

pub fn handle_compute_finished(
    core: &mut CoreRuntime,
    _now: SimTime,
    vm: VmId,
    job: JobId,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    if core.cloud.get(vm)?.is_terminated() {
        debug!(vm = %vm, job = %job, "stale compute completion on terminated vm");
        return Ok(commands);
    }
    let effects = core.cloud.get_mut(vm)?.compute_finished(job, &core.jobs)?;
    apply_vm_effects(core, vm, effects, &mut commands)?;
    Ok(commands)
}

pub fn handle_outputs_transferred(
    core: &mut CoreRuntime,
    now: SimTime,
    vm: VmId,
    job: JobId,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    if core.cloud.get(vm)?.is_terminated() {
        debug!(vm = %vm, job = %job, "stale output transfer on terminated vm");
        return Ok(commands);
    }
    let effects = core
        .cloud
        .get_mut(vm)?
        .outputs_transferred(job, &mut core.jobs, now)?;
    apply_vm_effects(core, vm, effects, &mut commands)?;
    Ok(commands)
}

/// Translate what the VM asked for into engine updates and events.
fn apply_vm_effects(
    core: &mut CoreRuntime,
    vm: VmId,
    effects: Vec<VmEffect>,
    commands: &mut Vec<CoreCommand>,
) -> Result<()> {
    for effect in effects {
        match effect {
            VmEffect::JobStarted(job) => {
                core.engine.mark_busy(vm);
                core.listeners.job_started(core.jobs.get(job)?);
            }
            VmEffect::FetchInputs(job) => {
                let (dag, task) = job_task(core, job)?;
                let delay = core.environment.input_transfer_time(vm, &dag, task);
                schedule(commands, delay, Event::InputsTransferred { vm, job });
            }
            VmEffect::ComputeScheduled { job, runtime } => {
                schedule(commands, runtime, Event::ComputeFinished { vm, job });
            }
            VmEffect::StoreOutputs(job) => {
                let (dag, task) = job_task(core, job)?;
                core.environment.cache_task_files(vm, &dag, task);
                let delay = core.environment.output_transfer_time(&dag, task);
                schedule(commands, delay, Event::OutputsTransferred { vm, job });
            }
            VmEffect::JobFinished(job) => {
                schedule(commands, 0.0, Event::JobFinished { job });
            }
        }
    }
    Ok(())
}

/// Move `vm` back to the free set once nothing is left on it.
fn release_vm(core: &mut CoreRuntime, vm: Option<VmId>) -> Result<()> {
    if let Some(vm) = vm {
        if core.cloud.get(vm)?.is_really_free() {
            core.engine.mark_free(vm);
        }
    }
    Ok(())
}

/// The completion and retry protocol.
///
/// - success: complete the task, release children, let the policy account
///   for it, free the VM and finish the DAG if that was its last task;
/// - failure: release a retry (flagged as such) and tell the policy;
/// - cancelled: release a fresh job for the task.
///
/// Every path ends with a scheduling pass.
pub fn handle_job_finished(core: &mut CoreRuntime, now: SimTime, job: JobId) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    let (result, dag_job, task, vm) = {
        let j = core.jobs.get(job)?;
        core.listeners.job_finished(j);
        (j.result(), j.dag_job, j.task, j.vm)
    };

    match result {
        JobResult::Success => {
            {
                let tracker = core.engine.dag_job_mut(dag_job)?;
                let deadline = tracker.dag().deadline();
                if now > deadline {
                    warn!(job = %job, dag_job = %dag_job, deadline, time = now, "job finished after dag deadline");
                }
                tracker.complete_task(task)?;
                tracker.record_job_execution(task, job);
            }
            debug!(job = %job, time = now, "job succeeded");
            release_ready(core, now, dag_job)?;
            core.with_policy(now, &mut commands, |a, ctx| a.job_finished(ctx, job))?;
            release_vm(core, vm)?;
            if core.engine.dag_job(dag_job)?.is_finished() {
                finish_dag(core, now, dag_job, &mut commands)?;
            }
        }
        JobResult::Failure => {
            let retry = core.jobs.create(dag_job, task, now, true);
            release_vm(core, vm)?;
            release_job(core, retry)?;
            warn!(job = %job, retry = %retry, time = now, "job failed; retrying");
            core.with_policy(now, &mut commands, |a, ctx| a.job_failed(ctx, job, retry))?;
        }
        JobResult::Cancelled => {
            let fresh = core.jobs.create(dag_job, task, now, false);
            release_vm(core, vm)?;
            release_job(core, fresh)?;
            info!(job = %job, replacement = %fresh, "job cancelled; released again");
        }
        JobResult::None => {
            return Err(SimError::invalid_state(format!(
                "{job} reported finished without a result"
            )));
        }
    }

    core.with_policy(now, &mut commands, |a, ctx| a.schedule_queued_jobs(ctx))?;
    Ok(commands)
}

fn finish_dag(
    core: &mut CoreRuntime,
    now: SimTime,
    dag_job: DagJobId,
    commands: &mut Vec<CoreCommand>,
) -> Result<()> {
    let finished = core.engine.finish_dag_job(dag_job)?;
    info!(
        dag_job = %dag_job,
        dag = finished.dag().name(),
        time = now,
        deadline = finished.dag().deadline(),
        "dag finished"
    );
    core.with_policy(now, commands, |a, ctx| a.dag_finished(ctx, &finished))?;
    core.listeners.dag_finished(&finished, now);
    Ok(())
}

pub fn handle_vm_terminated(
    core: &mut CoreRuntime,
    now: SimTime,
    vm: VmId,
) -> Result<Vec<CoreCommand>> {
    let mut commands = Vec::new();
    core.engine.vm_terminated(vm);
    core.environment.evict_vm(vm);
    let v = core.cloud.get(vm)?;
    info!(vm = %vm, cost = v.cost(now), time = now, "vm terminated");
    core.listeners.vm_terminated(v);
    core.with_policy(now, &mut commands, |a, ctx| a.vm_terminated(ctx, vm))?;
    Ok(commands)
}
