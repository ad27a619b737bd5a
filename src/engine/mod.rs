// src/engine/mod.rs

//! Discrete-event engine for cloudsched.
//!
//! This module ties together:
//! - the virtual clock and FIFO-stable event queue
//! - the workflow engine bookkeeping (active DAG jobs, free/busy VMs,
//!   released-but-unassigned jobs)
//! - the handlers that implement the completion and retry protocol
//! - the run loop
//!
//! The pure core state machine lives in [`core`]; it never touches the queue
//! directly and instead returns [`CoreCommand`]s that [`runtime`] applies.

use std::sync::Arc;

use crate::dag::Dag;
use crate::types::{JobId, VmId};

/// Simulated seconds.
pub type SimTime = f64;

/// Period of the provisioning tick.
pub const PROVISIONING_INTERVAL: SimTime = 1.0;

/// Everything that can happen in a simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A workflow arrives and becomes a DAG job.
    DagSubmitted { dag: Arc<Dag> },
    /// A scheduled job reaches its VM.
    JobSubmit { job: JobId, vm: VmId },
    /// Provisioning delay elapsed; the VM can take work.
    VmLaunched { vm: VmId },
    /// Deprovisioning delay elapsed; billing has stopped.
    VmTerminated { vm: VmId },
    InputsTransferred { vm: VmId, job: JobId },
    ComputeFinished { vm: VmId, job: JobId },
    OutputsTransferred { vm: VmId, job: JobId },
    /// A job reached a terminal result on its VM.
    JobFinished { job: JobId },
    /// Periodic provisioner invocation.
    ProvisioningTick,
}

pub mod context;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod workflow_engine;

#[cfg(test)]
pub(crate) mod testing;

pub use context::PolicyContext;
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::EventQueue;
pub use runtime::Runtime;
pub use workflow_engine::WorkflowEngine;
