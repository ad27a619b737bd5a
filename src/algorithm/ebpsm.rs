// src/algorithm/ebpsm.rs

//! Elastic budget-constrained provisioning and scheduling.
//!
//! Jobs go in ascending earliest-finish order. A free VM is preferred when it
//! already caches one of the task's inputs, then when it last served the same
//! workflow, and only then any free VM, which pays a continuation delay for
//! switching workflow context. Whatever a finished job did not spend flows
//! back to the tasks still waiting.

use std::collections::BTreeMap;

use crate::algorithm::dynamic::{fastest_affordable, BudgetScheduler, Flavour};
use crate::cloud::{Environment, Job, Vm};
use crate::dag::{Dag, TaskId};
use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::provisioner::{Provisioner, DEFAULT_IDLE_THRESHOLD};
use crate::types::VmId;

/// Seconds added when a VM switches to another workflow's job.
pub const CONTINUATION_DELAY: f64 = 10.0;

pub fn scheduler(provisioner: Option<Provisioner>) -> BudgetScheduler {
    BudgetScheduler::new(
        Flavour::Ebpsm,
        provisioner.unwrap_or(Provisioner::IdleThreshold {
            threshold: DEFAULT_IDLE_THRESHOLD,
        }),
    )
}

/// Three tiers over the really-free VMs; returns the VM and submit delay.
pub(crate) fn find_free_vm(
    ctx: &PolicyContext<'_>,
    dag: &Dag,
    task: TaskId,
    budget: f64,
    affinity: &BTreeMap<VmId, String>,
) -> Result<Option<(VmId, f64)>> {
    let env = ctx.environment;
    let free = ctx.really_free_vms();

    let caching: Vec<VmId> = free
        .iter()
        .copied()
        .filter(|vm| env.caches_any_input(*vm, dag, task))
        .collect();
    if let Some(vm) = fastest_affordable(ctx, &caching, budget, |t| {
        env.predicted_runtime_no_transfer(t, dag, task)
    })? {
        return Ok(Some((vm, 0.0)));
    }

    let tag = dag.affinity_tag();
    let same_workflow: Vec<VmId> = free
        .iter()
        .copied()
        .filter(|vm| affinity.get(vm) == Some(&tag))
        .collect();
    if let Some(vm) = fastest_affordable(ctx, &same_workflow, budget, |t| {
        env.predicted_runtime(t, dag, task)
    })? {
        return Ok(Some((vm, 0.0)));
    }

    Ok(
        fastest_affordable(ctx, &free, budget, |t| env.predicted_runtime(t, dag, task))?
            .map(|vm| (vm, CONTINUATION_DELAY)),
    )
}

/// What `job` actually cost on `vm`. The job that brought the VM up also
/// pays for its boot.
pub fn realized_cost(vm: &Vm, job: &Job, env: &Environment) -> f64 {
    let since = match vm.launch_time() {
        Some(launch) if vm.first_job() == Some(job.id) => launch,
        _ => job.submit_time,
    };
    env.cost(job.finish_time - since, vm.vm_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{DelayDistribution, StorageParams, VmType};
    use crate::engine::testing::Harness;
    use crate::types::{DagJobId, JobId, StorageKind};

    fn global_storage() -> StorageParams {
        StorageParams {
            kind: StorageKind::Global,
            read_bandwidth: 1e6,
            write_bandwidth: 1e6,
            ..StorageParams::default()
        }
    }

    fn catalog() -> Vec<VmType> {
        vec![
            VmType::builder("slow").mips(1.0).price(1.0).build(),
            VmType::builder("fast").mips(10.0).price(5.0).build(),
        ]
    }

    fn single(name: &str) -> Dag {
        let mut dag = Dag::new("0", name).with_budget(100.0);
        dag.add_task("t", 3600.0, 0).unwrap();
        dag
    }

    #[test]
    fn affinity_match_skips_continuation_delay() {
        let mut h = Harness::new(catalog());
        let other = h.launched_vm(&catalog()[1], 0.0);
        let same = h.launched_vm(&catalog()[0], 0.0);
        let dag = single("montage-1");
        let affinity: BTreeMap<VmId, String> =
            [(same, "mo".to_string()), (other, "cy".to_string())].into();

        let found = find_free_vm(&h.ctx(0.0), &dag, TaskId(0), 100.0, &affinity).unwrap();
        assert_eq!(found, Some((same, 0.0)));

        // Without a matching tag the fastest affordable VM wins, delayed.
        let found = find_free_vm(&h.ctx(0.0), &dag, TaskId(0), 100.0, &BTreeMap::new()).unwrap();
        assert_eq!(found, Some((other, CONTINUATION_DELAY)));
    }

    #[test]
    fn caching_vm_wins_over_affinity() {
        let types = catalog();
        let mut h = Harness {
            environment: Environment::new(types.clone(), global_storage(), true).unwrap(),
            ..Harness::new(types.clone())
        };
        let cached = h.launched_vm(&types[0], 0.0);
        let tagged = h.launched_vm(&types[1], 0.0);

        let mut dag = Dag::new("0", "montage").with_budget(100.0);
        dag.add_file("in.dat", 1_000).unwrap();
        dag.add_task("t", 360.0, 0).unwrap();
        dag.add_input("t", "in.dat").unwrap();
        h.environment.cache_task_files(cached, &dag, TaskId(0));

        let affinity: BTreeMap<VmId, String> = [(tagged, "mo".to_string())].into();
        let found = find_free_vm(&h.ctx(0.0), &dag, TaskId(0), 100.0, &affinity).unwrap();
        assert_eq!(found, Some((cached, 0.0)));
    }

    #[test]
    fn budget_excludes_expensive_vms() {
        let mut h = Harness::new(catalog());
        let fast = h.launched_vm(&catalog()[1], 0.0);
        let dag = single("x");
        assert_eq!(
            find_free_vm(&h.ctx(0.0), &dag, TaskId(0), 4.0, &BTreeMap::new()).unwrap(),
            None
        );
        assert_eq!(
            find_free_vm(&h.ctx(0.0), &dag, TaskId(0), 5.0, &BTreeMap::new()).unwrap(),
            Some((fast, CONTINUATION_DELAY))
        );
    }

    #[test]
    fn bootstrap_job_pays_for_boot() {
        let booting = VmType::builder("m")
            .provisioning_delay(DelayDistribution::constant(100.0))
            .billing_period(1_000.0)
            .build();
        let mut h = Harness::new(vec![booting.clone()]);
        let vm = h.launched_vm(&booting, 0.0);

        let first = h.jobs.create(DagJobId(0), TaskId(0), 0.0, false);
        let second = h.jobs.create(DagJobId(0), TaskId(1), 0.0, false);
        for (job, at) in [(first, 100.0), (second, 950.0)] {
            h.cloud.get_mut(vm).unwrap().submit(job, &mut h.jobs, at).unwrap();
        }
        let finish = |h: &mut Harness, job: JobId, at: f64| {
            h.jobs.get_mut(job).unwrap().finish_time = at;
        };
        finish(&mut h, first, 950.0);
        finish(&mut h, second, 1_900.0);

        let v = h.cloud.get(vm).unwrap();
        // 0 -> 950 fits one period.
        assert_eq!(realized_cost(v, h.jobs.get(first).unwrap(), &h.environment), 1.0);
        // 950 -> 1900 on its own also fits one.
        assert_eq!(realized_cost(v, h.jobs.get(second).unwrap(), &h.environment), 1.0);

        h.jobs.get_mut(first).unwrap().finish_time = 1_050.0;
        let v = h.cloud.get(vm).unwrap();
        assert_eq!(realized_cost(v, h.jobs.get(first).unwrap(), &h.environment), 2.0);
    }
}
