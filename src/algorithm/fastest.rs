// src/algorithm/fastest.rs

//! Budget-oblivious baseline: every job gets its own VM of the fastest type.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::algorithm::SchedulingPolicy;
use crate::dag::DagJob;
use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::provisioner::Provisioner;
use crate::types::{DagJobId, JobId, VmId};

#[derive(Debug)]
pub struct Fastest {
    provisioner: Provisioner,
    /// VM leased for each job, kept so a job is never provisioned twice.
    provisioned: BTreeMap<JobId, VmId>,
    /// Job waiting for each booting VM.
    scheduled: BTreeMap<VmId, JobId>,
}

impl Fastest {
    pub fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            provisioned: BTreeMap::new(),
            scheduled: BTreeMap::new(),
        }
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn vm_for(&self, job: JobId) -> Option<VmId> {
        self.provisioned.get(&job).copied()
    }
}

impl SchedulingPolicy for Fastest {
    fn dag_submitted(&mut self, ctx: &mut PolicyContext<'_>, _dag_job: DagJobId) -> Result<()> {
        self.schedule_queued_jobs(ctx)
    }

    fn schedule_queued_jobs(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        let fastest = ctx.environment.fastest_vm_type().clone();
        for job in ctx.queued_jobs() {
            if self.provisioned.contains_key(&job) {
                continue;
            }
            let vm = self.provisioner.provision_resource(ctx, &fastest)?;
            self.provisioned.insert(job, vm);
            self.scheduled.insert(vm, job);
        }
        Ok(())
    }

    fn job_finished(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()> {
        let Some(vm) = ctx.job(job)?.vm else {
            return Ok(());
        };
        if !ctx.vm(vm)?.is_terminated() {
            self.provisioner.deprovision_resource(ctx, vm)?;
        }
        Ok(())
    }

    fn job_failed(&mut self, ctx: &mut PolicyContext<'_>, failed: JobId, retry: JobId) -> Result<()> {
        let Some(vm) = ctx.job(failed)?.vm else {
            return Ok(());
        };
        if ctx.vm(vm)?.is_terminated() {
            warn!(failed = %failed, retry = %retry, vm = %vm, "vm gone, retry stays queued");
            return Ok(());
        }
        debug!(failed = %failed, retry = %retry, vm = %vm, "resubmitting retry to the same vm");
        self.provisioned.insert(retry, vm);
        ctx.submit(retry, vm, 0.0)
    }

    fn dag_finished(&mut self, _ctx: &mut PolicyContext<'_>, _dag_job: &DagJob) -> Result<()> {
        Ok(())
    }

    fn vm_launched(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        match self.scheduled.remove(&vm) {
            Some(job) => ctx.submit(job, vm, 0.0)?,
            None => warn!(vm = %vm, "vm launched without a scheduled job"),
        }
        self.schedule_queued_jobs(ctx)
    }

    fn vm_terminated(&mut self, _ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        self.provisioned.retain(|_, leased| *leased != vm);
        self.scheduled.remove(&vm);
        Ok(())
    }

    fn provision_resources(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        self.provisioner.provision_resources(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{JobResult, JobState, VmType};
    use crate::dag::{Dag, TaskId};
    use crate::engine::testing::Harness;
    use crate::types::DagJobId;

    fn catalog() -> Vec<VmType> {
        vec![
            VmType::builder("slow").mips(1.0).price(1.0).build(),
            VmType::builder("fast").mips(10.0).price(5.0).build(),
        ]
    }

    fn pair() -> Dag {
        let mut dag = Dag::new("0", "pair");
        dag.add_task("a", 100.0, 0).unwrap();
        dag.add_task("b", 100.0, 0).unwrap();
        dag
    }

    #[test]
    fn one_fastest_vm_per_job() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(pair(), 0.0);
        let mut f = Fastest::new(Provisioner::OneTaskOneVm);
        f.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        // A second pass does not lease again.
        f.schedule_queued_jobs(&mut h.ctx(0.0)).unwrap();

        assert_eq!(h.cloud.len(), 2);
        assert!(h.cloud.iter().all(|vm| vm.vm_type().name == "fast"));
        // Jobs stay queued until their VM is up.
        assert_eq!(h.engine.queued_jobs().len(), 2);
    }

    #[test]
    fn launch_submits_and_success_releases_vm() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(pair(), 0.0);
        let mut f = Fastest::new(Provisioner::OneTaskOneVm);
        f.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        h.commands.clear();

        let job = h.engine.queued_jobs()[0];
        let vm = f.vm_for(job).unwrap();
        h.cloud.get_mut(vm).unwrap().mark_ready(0.0);
        h.engine.vm_launched(vm);
        f.vm_launched(&mut h.ctx(0.0), vm).unwrap();
        assert_eq!(h.drain_submits(), vec![(job, vm, 0.0)]);

        f.job_finished(&mut h.ctx(10.0), job).unwrap();
        assert_eq!(h.drain_terminated(), vec![vm]);
    }

    #[test]
    fn terminated_vm_leaves_no_lease_behind() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(pair(), 0.0);
        let mut f = Fastest::new(Provisioner::OneTaskOneVm);
        f.dag_submitted(&mut h.ctx(0.0), id).unwrap();

        let [first, second] = [h.engine.queued_jobs()[0], h.engine.queued_jobs()[1]];
        let vm = f.vm_for(first).unwrap();
        f.vm_terminated(&mut h.ctx(100.0), vm).unwrap();

        assert_eq!(f.vm_for(first), None);
        assert!(f.vm_for(second).is_some());
        assert!(!f.scheduled.contains_key(&vm));
    }

    #[test]
    fn retry_goes_back_to_the_live_vm() {
        let mut h = Harness::new(catalog());
        let vm = h.launched_vm(&catalog()[1], 0.0);
        let failed = h.jobs.create(DagJobId(0), TaskId(0), 0.0, false);
        h.engine.release(failed);
        h.ctx(0.0).submit(failed, vm, 0.0).unwrap();
        h.cloud.get_mut(vm).unwrap().submit(failed, &mut h.jobs, 0.0).unwrap();
        {
            let j = h.jobs.get_mut(failed).unwrap();
            j.set_state(JobState::Terminated).unwrap();
            j.set_result(JobResult::Failure).unwrap();
        }
        h.engine.mark_free(vm);
        h.commands.clear();

        let retry = h.jobs.create(DagJobId(0), TaskId(0), 5.0, true);
        h.engine.release(retry);
        let mut f = Fastest::new(Provisioner::OneTaskOneVm);
        f.job_failed(&mut h.ctx(5.0), failed, retry).unwrap();

        assert_eq!(h.drain_submits(), vec![(retry, vm, 0.0)]);
        assert!(h.engine.queued_jobs().is_empty());
        assert_eq!(f.vm_for(retry), Some(vm));
    }
}
