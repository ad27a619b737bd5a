// src/algorithm/dynamic.rs

//! Budget-driven dynamic scheduling shared by EBPSM and MSLBL.
//!
//! Each DAG gets a budget split over its tasks the first time one of its jobs
//! is placed. Every pass orders the released jobs by priority and places each
//! one on the fastest free VM its task budget affords, or leases a new VM of
//! the best affordable type and parks the job until the VM is up.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::algorithm::ranking::DagAnalysis;
use crate::algorithm::{ebpsm, mslbl, SchedulingPolicy};
use crate::budget::{distribution, BudgetDistribution};
use crate::cloud::{Environment, VmType};
use crate::dag::{Dag, DagJob, TaskId};
use crate::engine::PolicyContext;
use crate::errors::{Result, SimError};
use crate::provisioner::Provisioner;
use crate::types::{DagJobId, JobId, VmId};

/// Which variant of the shared loop to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    /// EFT priority, tiered matching, budget redistribution on completion.
    Ebpsm,
    /// EST priority, single-tier matching, fixed budgets.
    Mslbl,
}

impl Flavour {
    fn priority(self, analysis: &DagAnalysis, task: TaskId) -> f64 {
        match self {
            Flavour::Ebpsm => analysis.annotations.earliest_finish(task),
            Flavour::Mslbl => analysis.annotations.earliest_start(task),
        }
    }

    fn budget_order(self, analysis: &DagAnalysis, tasks: &[TaskId]) -> Vec<TaskId> {
        match self {
            Flavour::Ebpsm => analysis.by_earliest_finish(tasks),
            Flavour::Mslbl => analysis.by_descending_rank(tasks),
        }
    }

    fn distribution(self) -> BudgetDistribution {
        match self {
            Flavour::Ebpsm => BudgetDistribution::TopDownCheapest,
            Flavour::Mslbl => BudgetDistribution::Mslbl,
        }
    }

    fn redistributes(self) -> bool {
        matches!(self, Flavour::Ebpsm)
    }
}

#[derive(Debug)]
struct DagPlan {
    dag: Arc<Dag>,
    analysis: DagAnalysis,
    /// Tasks not yet placed, in topological order.
    unscheduled: Vec<TaskId>,
    unfinished: BTreeSet<TaskId>,
    /// Budget each task was (or will be) placed with.
    allocated: BTreeMap<TaskId, f64>,
    /// Latest split over the unscheduled tasks.
    remaining: BTreeMap<TaskId, f64>,
    budgets_built: bool,
}

impl DagPlan {
    fn missing_budget(&self, task: TaskId) -> SimError {
        SimError::MissingBudget {
            dag: self.dag.name().to_string(),
            task: self.dag.task(task).name.clone(),
        }
    }

    fn build_budgets(&mut self, flavour: Flavour, env: &Environment) {
        let ordered = flavour.budget_order(&self.analysis, &self.unscheduled);
        let budgets = flavour
            .distribution()
            .distribute(&ordered, &self.dag, self.dag.budget(), env);
        info!(
            dag = self.dag.name(),
            budget = self.dag.budget(),
            allocated = distribution::total(&budgets),
            "distributed dag budget"
        );
        self.record(&budgets);
        self.allocated = budgets.clone();
        self.remaining = budgets;
        self.budgets_built = true;
    }

    /// The unscheduled split first; retries of already placed tasks fall
    /// back to what the task was placed with.
    fn task_budget(&self, task: TaskId) -> Result<f64> {
        self.remaining
            .get(&task)
            .or_else(|| self.allocated.get(&task))
            .copied()
            .ok_or_else(|| self.missing_budget(task))
    }

    fn record(&mut self, budgets: &BTreeMap<TaskId, f64>) {
        for (task, budget) in budgets {
            if let Some(a) = self.analysis.annotations.get_mut(*task) {
                a.budget = *budget;
            }
        }
    }
}

#[derive(Debug)]
pub struct BudgetScheduler {
    flavour: Flavour,
    provisioner: Provisioner,
    plans: BTreeMap<DagJobId, DagPlan>,
    /// Jobs waiting for the VM leased for them to boot.
    pending: BTreeMap<VmId, JobId>,
    /// Affinity tag of the workflow each VM last served.
    affinity: BTreeMap<VmId, String>,
    finished_dags: usize,
}

impl BudgetScheduler {
    pub fn new(flavour: Flavour, provisioner: Provisioner) -> Self {
        Self {
            flavour,
            provisioner,
            plans: BTreeMap::new(),
            pending: BTreeMap::new(),
            affinity: BTreeMap::new(),
            finished_dags: 0,
        }
    }

    pub fn flavour(&self) -> Flavour {
        self.flavour
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn pending_job(&self, vm: VmId) -> Option<JobId> {
        self.pending.get(&vm).copied()
    }

    pub fn affinity(&self, vm: VmId) -> Option<&str> {
        self.affinity.get(&vm).map(String::as_str)
    }

    pub fn finished_dags(&self) -> usize {
        self.finished_dags
    }

    /// Budget from the current split over unscheduled tasks.
    pub fn unscheduled_budget(&self, dag_job: DagJobId, task: TaskId) -> Option<f64> {
        self.plans.get(&dag_job)?.remaining.get(&task).copied()
    }

    pub fn allocated_budget(&self, dag_job: DagJobId, task: TaskId) -> Option<f64> {
        self.plans.get(&dag_job)?.allocated.get(&task).copied()
    }

    pub fn is_unscheduled(&self, dag_job: DagJobId, task: TaskId) -> bool {
        self.plans
            .get(&dag_job)
            .map(|p| p.unscheduled.contains(&task))
            .unwrap_or(false)
    }

    fn plan_mut(&mut self, dag_job: DagJobId) -> Result<&mut DagPlan> {
        self.plans
            .get_mut(&dag_job)
            .ok_or_else(|| SimError::invalid_state(format!("{dag_job} has no scheduling plan")))
    }

    fn place(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()> {
        let (dag_job, task) = {
            let j = ctx.job(job)?;
            (j.dag_job, j.task)
        };
        let flavour = self.flavour;
        let plan = self.plan_mut(dag_job)?;
        if !plan.budgets_built {
            plan.build_budgets(flavour, ctx.environment);
        }
        let budget = plan.task_budget(task)?;
        let dag = Arc::clone(&plan.dag);
        plan.unscheduled.retain(|t| *t != task);
        let tag = dag.affinity_tag();

        debug!(
            job = %job,
            dag = dag.name(),
            task = %dag.task(task).name,
            budget,
            "placing job"
        );

        let found = match flavour {
            Flavour::Ebpsm => ebpsm::find_free_vm(ctx, &dag, task, budget, &self.affinity)?,
            Flavour::Mslbl => mslbl::find_free_vm(ctx, &dag, task, budget)?,
        };

        match found {
            Some((vm, delay)) => {
                let estimate = {
                    let v = ctx.cloud.get(vm)?;
                    ctx.environment
                        .predicted_runtime_on_vm(vm, v.vm_type(), &dag, task)
                };
                ctx.jobs.get_mut(job)?.estimated_runtime = estimate;
                ctx.submit(job, vm, delay)?;
                self.affinity.insert(vm, tag);
            }
            None => {
                let vm_type = select_vm_type(ctx.environment, &dag, task, budget).clone();
                let vm = self.provisioner.provision_resource(ctx, &vm_type)?;
                self.affinity.insert(vm, tag);
                if let Some(existing) = self.pending.get(&vm) {
                    warn!(
                        vm = %vm,
                        pending = %existing,
                        job = %job,
                        "vm already has a pending job; leaving job queued"
                    );
                } else {
                    ctx.engine.remove_queued(job);
                    self.pending.insert(vm, job);
                }
            }
        }
        Ok(())
    }

    /// Fold the finished job's unspent (or overspent) budget back into the
    /// tasks not yet placed and split again.
    fn redistribute(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()> {
        let j = ctx.job(job)?;
        let vm_id = j
            .vm
            .ok_or_else(|| SimError::invalid_state(format!("{job} finished without a vm")))?;
        let cost = ebpsm::realized_cost(ctx.vm(vm_id)?, j, ctx.environment);
        let (dag_job, task) = (j.dag_job, j.task);

        let flavour = self.flavour;
        let plan = self.plan_mut(dag_job)?;
        let allocated = plan
            .allocated
            .get(&task)
            .copied()
            .ok_or_else(|| plan.missing_budget(task))?;
        let mut pool = allocated - cost;
        for t in &plan.unscheduled {
            pool += plan
                .remaining
                .get(t)
                .copied()
                .ok_or_else(|| plan.missing_budget(*t))?;
        }

        let ordered = flavour.budget_order(&plan.analysis, &plan.unscheduled);
        let fresh = flavour
            .distribution()
            .distribute(&ordered, &plan.dag, pool, ctx.environment);
        for (t, b) in &fresh {
            if plan.unfinished.contains(t) {
                plan.allocated.insert(*t, *b);
            }
        }
        plan.record(&fresh);
        debug!(
            job = %job,
            cost,
            spare = allocated - cost,
            pool,
            unscheduled = plan.unscheduled.len(),
            "redistributed budget"
        );
        plan.remaining = fresh;
        Ok(())
    }
}

/// The fastest candidate whose predicted cost fits `budget`. Ties keep the
/// first candidate.
pub(crate) fn fastest_affordable<F>(
    ctx: &PolicyContext<'_>,
    candidates: &[VmId],
    budget: f64,
    runtime: F,
) -> Result<Option<VmId>>
where
    F: Fn(&VmType) -> f64,
{
    let mut best: Option<(f64, VmId)> = None;
    for id in candidates {
        let vm_type = ctx.vm(*id)?.vm_type();
        let cost = ctx.environment.cost(runtime(vm_type), vm_type);
        if cost <= budget && best.map_or(true, |(mips, _)| vm_type.mips > mips) {
            best = Some((vm_type.mips, *id));
        }
    }
    Ok(best.map(|(_, id)| id))
}

/// Type for a new VM: walking the catalog by ascending price, the last type
/// whose cost (with expected boot time) is the largest seen so far and still
/// within budget. Falls back to the cheapest type.
pub(crate) fn select_vm_type<'e>(
    env: &'e Environment,
    dag: &Dag,
    task: TaskId,
    budget: f64,
) -> &'e VmType {
    let mut largest = 0.0;
    let mut suitable = None;
    for vm_type in env.types_by_price() {
        let runtime = env.predicted_runtime(vm_type, dag, task) + vm_type.provisioning_delay.mean();
        let cost = env.cost(runtime, vm_type);
        if cost >= largest {
            largest = cost;
            if largest <= budget {
                suitable = Some(vm_type);
            }
        }
    }
    suitable.unwrap_or_else(|| env.cheapest_vm_type())
}

impl SchedulingPolicy for BudgetScheduler {
    fn dag_submitted(&mut self, ctx: &mut PolicyContext<'_>, dag_job: DagJobId) -> Result<()> {
        let dag = Arc::clone(ctx.dag_job(dag_job)?.dag());
        let analysis = DagAnalysis::new(&dag, ctx.environment, ctx.now)?;
        info!(
            dag_job = %dag_job,
            dag = dag.name(),
            tasks = dag.len(),
            budget = dag.budget(),
            deadline = dag.deadline(),
            "planning dag"
        );

        let plan = DagPlan {
            unscheduled: analysis.order.clone(),
            unfinished: analysis.order.iter().copied().collect(),
            dag,
            analysis,
            allocated: BTreeMap::new(),
            remaining: BTreeMap::new(),
            budgets_built: false,
        };
        self.plans.insert(dag_job, plan);
        self.schedule_queued_jobs(ctx)
    }

    fn schedule_queued_jobs(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        let mut ordered = Vec::new();
        for id in ctx.queued_jobs() {
            let job = ctx.job(id)?;
            let plan = self.plans.get(&job.dag_job).ok_or_else(|| {
                SimError::invalid_state(format!("{} has no scheduling plan", job.dag_job))
            })?;
            ordered.push((self.flavour.priority(&plan.analysis, job.task), id));
        }
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, job) in ordered {
            self.place(ctx, job)?;
        }
        Ok(())
    }

    fn job_finished(&mut self, ctx: &mut PolicyContext<'_>, job: JobId) -> Result<()> {
        let (dag_job, task) = {
            let j = ctx.job(job)?;
            (j.dag_job, j.task)
        };
        self.plan_mut(dag_job)?.unfinished.remove(&task);
        if self.flavour.redistributes() {
            self.redistribute(ctx, job)?;
        }
        Ok(())
    }

    fn dag_finished(&mut self, ctx: &mut PolicyContext<'_>, dag_job: &DagJob) -> Result<()> {
        self.plans.remove(&dag_job.id());
        self.finished_dags += 1;
        info!(
            dag_job = %dag_job.id(),
            dag = dag_job.dag().name(),
            finished = self.finished_dags,
            time = ctx.now,
            "dag finished"
        );
        if !ctx.engine.has_active_dags() {
            self.provisioner.deprovision_resources(ctx)?;
        }
        Ok(())
    }

    fn vm_launched(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        let Some(job) = self.pending.remove(&vm) else {
            warn!(vm = %vm, "vm launched without a pending job");
            return Ok(());
        };
        let estimate = {
            let j = ctx.job(job)?;
            let dag = ctx.dag_job(j.dag_job)?.dag();
            ctx.environment
                .predicted_runtime(ctx.vm(vm)?.vm_type(), dag, j.task)
        };
        ctx.jobs.get_mut(job)?.estimated_runtime = estimate;
        ctx.submit(job, vm, 0.0)
    }

    /// Forget the VM. A job still parked on it goes back to the queue.
    fn vm_terminated(&mut self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        self.affinity.remove(&vm);
        if let Some(job) = self.pending.remove(&vm) {
            warn!(vm = %vm, job = %job, "vm terminated before its pending job was submitted");
            ctx.engine.release(job);
        }
        Ok(())
    }

    fn provision_resources(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        self.provisioner.provision_resources(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Harness;
    use crate::engine::{CoreCommand, Event};

    /// slow: 1 mips @ 1.0, fast: 10 mips @ 5.0, hourly billing.
    fn catalog() -> Vec<VmType> {
        vec![
            VmType::builder("slow").mips(1.0).price(1.0).build(),
            VmType::builder("fast").mips(10.0).price(5.0).build(),
        ]
    }

    /// a -> b, each one hour on the slow type.
    fn chain(budget: f64) -> Dag {
        let mut dag = Dag::new("0", "montage")
            .with_budget(budget)
            .with_deadline(100_000.0);
        dag.add_task("a", 3600.0, 0).unwrap();
        dag.add_task("b", 3600.0, 0).unwrap();
        dag.add_edge("a", "b").unwrap();
        dag
    }

    fn ebpsm() -> BudgetScheduler {
        BudgetScheduler::new(Flavour::Ebpsm, Provisioner::BillingAware)
    }

    #[test]
    fn leases_best_affordable_type_and_parks_job() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(chain(10.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();

        // Budget 10 covers both tasks on the fast type.
        assert_eq!(s.allocated_budget(id, TaskId(0)), Some(5.0));
        assert_eq!(h.cloud.len(), 1);
        let vm = h.cloud.iter().next().unwrap();
        assert_eq!(vm.vm_type().name, "fast");

        let job = s.pending_job(vm.id()).expect("parked job");
        assert!(h.engine.queued_jobs().is_empty());
        assert!(!s.is_unscheduled(id, TaskId(0)));
        assert!(h.jobs.get(job).unwrap().vm.is_none());
        assert!(matches!(
            h.commands.as_slice(),
            [CoreCommand::Schedule { event: Event::VmLaunched { .. }, .. }]
        ));
    }

    #[test]
    fn launch_submits_pending_job_without_delay() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(chain(10.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        h.commands.clear();

        let vm = h.cloud.iter().next().unwrap().id();
        h.cloud.get_mut(vm).unwrap().mark_ready(0.0);
        h.engine.vm_launched(vm);
        s.vm_launched(&mut h.ctx(0.0), vm).unwrap();

        let submits = h.drain_submits();
        assert_eq!(submits.len(), 1);
        let (job, to, delay) = submits[0];
        assert_eq!((to, delay), (vm, 0.0));
        assert_eq!(h.jobs.get(job).unwrap().estimated_runtime, 360.0);
        assert!(h.engine.busy_vms().contains(&vm));
        assert_eq!(s.pending_job(vm), None);
    }

    #[test]
    fn unrelated_free_vm_costs_a_continuation_delay() {
        let mut h = Harness::new(catalog());
        let slow = h.launched_vm(&catalog()[0], 0.0);
        let id = h.submit_dag(chain(2.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();

        let submits = h.drain_submits();
        assert_eq!(submits.len(), 1);
        assert_eq!(submits[0].1, slow);
        assert_eq!(submits[0].2, ebpsm::CONTINUATION_DELAY);
        assert_eq!(h.cloud.len(), 1);
    }

    #[test]
    fn unaffordable_budget_falls_back_to_cheapest_type() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(chain(0.5), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        assert_eq!(h.cloud.iter().next().unwrap().vm_type().name, "slow");
    }

    #[test]
    fn finished_job_returns_spare_budget_to_unscheduled_tasks() {
        let mut h = Harness::new(catalog());
        let slow = h.launched_vm(&catalog()[0], 0.0);
        // Budget 6: a gets the fast type (5), b the slow one (1).
        let id = h.submit_dag(chain(6.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        assert_eq!(s.allocated_budget(id, TaskId(0)), Some(5.0));
        assert_eq!(s.unscheduled_budget(id, TaskId(1)), Some(1.0));

        // a lands on the idle slow VM and costs one period.
        let (job, vm, _) = h.drain_submits()[0];
        assert_eq!(vm, slow);
        h.cloud
            .get_mut(vm)
            .unwrap()
            .submit(job, &mut h.jobs, 10.0)
            .unwrap();
        h.jobs.get_mut(job).unwrap().finish_time = 3_000.0;

        s.job_finished(&mut h.ctx(3_000.0), job).unwrap();
        // Spare 4 + 1 left for b: enough for the fast type now.
        assert_eq!(s.unscheduled_budget(id, TaskId(1)), Some(5.0));
        assert_eq!(s.allocated_budget(id, TaskId(1)), Some(5.0));
        assert_eq!(s.allocated_budget(id, TaskId(0)), Some(5.0));
    }

    #[test]
    fn retry_reads_the_budget_it_was_placed_with() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(chain(10.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();

        let plan = s.plans.get_mut(&id).unwrap();
        plan.remaining.remove(&TaskId(0));
        assert_eq!(plan.task_budget(TaskId(0)).unwrap(), 5.0);
        plan.allocated.remove(&TaskId(0));
        assert!(matches!(
            plan.task_budget(TaskId(0)),
            Err(SimError::MissingBudget { .. })
        ));
    }

    #[test]
    fn type_selection_walks_catalog_by_price() {
        let h = Harness::new(catalog());
        let dag = chain(0.0);
        let env = &h.environment;
        assert_eq!(select_vm_type(env, &dag, TaskId(0), 5.0).name, "fast");
        assert_eq!(select_vm_type(env, &dag, TaskId(0), 4.9).name, "slow");
        assert_eq!(select_vm_type(env, &dag, TaskId(0), 0.1).name, "slow");
    }

    #[test]
    fn terminated_vm_is_forgotten() {
        let mut h = Harness::new(catalog());
        let id = h.submit_dag(chain(10.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        let vm = h.cloud.iter().next().unwrap().id();
        let parked = s.pending_job(vm).expect("parked job");
        assert!(s.affinity(vm).is_some());

        s.vm_terminated(&mut h.ctx(50.0), vm).unwrap();
        assert_eq!(s.affinity(vm), None);
        assert_eq!(s.pending_job(vm), None);
        assert_eq!(h.engine.queued_jobs().iter().copied().collect::<Vec<_>>(), vec![parked]);
    }

    #[test]
    fn last_dag_finishing_releases_the_fleet() {
        let mut h = Harness::new(catalog());
        let slow = h.launched_vm(&catalog()[0], 0.0);
        let id = h.submit_dag(chain(2.0), 0.0);
        let mut s = ebpsm();
        s.dag_submitted(&mut h.ctx(0.0), id).unwrap();
        h.commands.clear();
        h.engine.mark_free(slow);

        let finished = h.engine.finish_dag_job(id).unwrap();
        s.dag_finished(&mut h.ctx(5.0), &finished).unwrap();
        assert_eq!(h.drain_terminated(), vec![slow]);
        assert_eq!(s.finished_dags(), 1);
    }
}
