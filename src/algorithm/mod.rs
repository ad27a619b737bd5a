// src/algorithm/mod.rs

//! Scheduling policies.
//!
//! The workflow engine calls into the active policy at fixed points of the
//! completion protocol. Policies see the simulation through a
//! [`PolicyContext`] and act by leasing, submitting to and terminating VMs.

pub mod dynamic;
pub mod ebpsm;
pub mod fastest;
pub mod mslbl;
pub mod ranking;

use tracing::debug;

use crate::dag::DagJob;
use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::provisioner::{Provisioner, ProvisionerKind};
use crate::types::{AlgorithmKind, DagJobId, JobId, VmId};

pub use dynamic::{BudgetScheduler, Flavour};
pub use fastest::Fastest;
pub use ranking::DagAnalysis;

/// Hooks the workflow engine invokes on a scheduling policy.
pub trait SchedulingPolicy {
    /// A DAG job was created and its root tasks released.
    fn dag_submitted(&mut self, ctx: &mut PolicyContext<'_>, dag_job: DagJobId) -> Result<()>;

    /// Place released jobs; called after every job completion.
    fn schedule_queued_jobs(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()>;

    /// A job finished successfully. Its VM is still counted busy.
    fn job_finished(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()>;

    /// A job failed and `retry` was released in its place.
    fn job_failed(
        &mut self,
        _ctx: &mut PolicyContext<'_>,
        failed: JobId,
        retry: JobId,
    ) -> Result<()> {
        debug!(failed = %failed, retry = %retry, "job failed, retry released");
        Ok(())
    }

    fn dag_finished(&mut self, ctx: &mut PolicyContext<'_>, dag_job: &DagJob) -> Result<()>;

    fn vm_launched(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()>;

    fn vm_terminated(&mut self, _ctx: &mut PolicyContext<'_>, _vm: VmId) -> Result<()> {
        Ok(())
    }

    /// Body of the provisioning tick.
    fn provision_resources(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()>;
}

/// The policy selected for a run.
#[derive(Debug)]
pub enum Algorithm {
    Ebpsm(BudgetScheduler),
    Mslbl(BudgetScheduler),
    Fastest(Fastest),
}

impl Algorithm {
    /// Build `kind` with its default provisioner unless one is given.
    pub fn new(kind: AlgorithmKind, provisioner: Option<ProvisionerKind>) -> Self {
        match kind {
            AlgorithmKind::Ebpsm => Algorithm::Ebpsm(ebpsm::scheduler(
                provisioner.map(Provisioner::from_kind),
            )),
            AlgorithmKind::Mslbl => Algorithm::Mslbl(mslbl::scheduler(
                provisioner.map(Provisioner::from_kind),
            )),
            AlgorithmKind::Fastest => Algorithm::Fastest(Fastest::new(
                provisioner
                    .map(Provisioner::from_kind)
                    .unwrap_or(Provisioner::OneTaskOneVm),
            )),
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Algorithm::Ebpsm(_) => AlgorithmKind::Ebpsm,
            Algorithm::Mslbl(_) => AlgorithmKind::Mslbl,
            Algorithm::Fastest(_) => AlgorithmKind::Fastest,
        }
    }

    pub fn provisioner(&self) -> &Provisioner {
        match self {
            Algorithm::Ebpsm(s) | Algorithm::Mslbl(s) => s.provisioner(),
            Algorithm::Fastest(f) => f.provisioner(),
        }
    }

    fn policy(&mut self) -> &mut dyn SchedulingPolicy {
        match self {
            Algorithm::Ebpsm(s) | Algorithm::Mslbl(s) => s,
            Algorithm::Fastest(f) => f,
        }
    }
}

impl SchedulingPolicy for Algorithm {
    fn dag_submitted(&mut self, ctx: &mut PolicyContext<'_>, dag_job: DagJobId) -> Result<()> {
        self.policy().dag_submitted(ctx, dag_job)
    }

    fn schedule_queued_jobs(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        self.policy().schedule_queued_jobs(ctx)
    }

    fn job_finished(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()> {
        self.policy().job_finished(ctx, job)
    }

    fn job_failed(&mut self, ctx: &mut PolicyContext<'_>, failed: JobId, retry: JobId) -> Result<()> {
        self.policy().job_failed(ctx, failed, retry)
    }

    fn dag_finished(&mut self, ctx: &mut PolicyContext<'_>, dag_job: &DagJob) -> Result<()> {
        self.policy().dag_finished(ctx, dag_job)
    }

    fn vm_launched(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        self.policy().vm_launched(ctx, vm)
    }

    fn vm_terminated(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        self.policy().vm_terminated(ctx, vm)
    }

    fn provision_resources(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        self.policy().provision_resources(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provisioners_follow_algorithm() {
        let e = Algorithm::new(AlgorithmKind::Ebpsm, None);
        assert_eq!(e.kind(), AlgorithmKind::Ebpsm);
        assert_eq!(e.provisioner().kind(), ProvisionerKind::IdleThreshold);

        let m = Algorithm::new(AlgorithmKind::Mslbl, None);
        assert_eq!(m.provisioner().kind(), ProvisionerKind::BillingAware);

        let f = Algorithm::new(AlgorithmKind::Fastest, None);
        assert_eq!(f.provisioner().kind(), ProvisionerKind::OneTaskOneVm);
    }

    #[test]
    fn provisioner_can_be_overridden() {
        let e = Algorithm::new(AlgorithmKind::Ebpsm, Some(ProvisionerKind::BillingAware));
        assert_eq!(e.provisioner().kind(), ProvisionerKind::BillingAware);
    }
}
