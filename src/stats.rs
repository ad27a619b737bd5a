// src/stats.rs

//! Lifecycle notifications and the end-of-run report.
//!
//! The engine notifies every registered [`SimulationListener`] as jobs, VMs
//! and DAGs move through their lifecycles. Notifications are fire-and-forget:
//! nothing a listener does feeds back into the simulation.

use std::collections::BTreeMap;
use std::fmt;

use crate::cloud::{Cloud, Job, JobResult, Vm};
use crate::dag::DagJob;
use crate::engine::SimTime;
use crate::types::{AlgorithmKind, DagJobId};

/// Callbacks for lifecycle changes. Every method defaults to doing nothing.
pub trait SimulationListener {
    fn job_released(&mut self, _job: &Job) {}
    fn job_started(&mut self, _job: &Job) {}
    fn job_finished(&mut self, _job: &Job) {}
    fn dag_started(&mut self, _dag_job: &DagJob) {}
    fn dag_finished(&mut self, _dag_job: &DagJob, _now: SimTime) {}
    fn vm_launched(&mut self, _vm: &Vm) {}
    fn vm_terminated(&mut self, _vm: &Vm) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DagRecord {
    pub name: String,
    pub budget: f64,
    /// Absolute.
    pub deadline: f64,
    pub start: SimTime,
    pub finish: Option<SimTime>,
    pub tasks: usize,
}

impl DagRecord {
    pub fn deadline_met(&self) -> bool {
        self.finish.is_some_and(|f| f <= self.deadline)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub released: usize,
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retries: usize,
}

/// Built-in listener feeding the report.
#[derive(Debug, Default)]
pub struct Statistics {
    dags: BTreeMap<DagJobId, DagRecord>,
    jobs: JobCounts,
    vms_launched: usize,
    vms_terminated: usize,
    /// Sum of runtimes of successful jobs.
    busy_seconds: f64,
}

impl Statistics {
    pub fn dags(&self) -> impl Iterator<Item = &DagRecord> {
        self.dags.values()
    }

    pub fn jobs(&self) -> JobCounts {
        self.jobs
    }

    pub fn vms_launched(&self) -> usize {
        self.vms_launched
    }

    pub fn vms_terminated(&self) -> usize {
        self.vms_terminated
    }

    /// Finish time of the last DAG, if any finished.
    pub fn makespan(&self) -> Option<SimTime> {
        self.dags
            .values()
            .filter_map(|d| d.finish)
            .fold(None, |acc, f| Some(acc.map_or(f, |a: f64| a.max(f))))
    }
}

impl SimulationListener for Statistics {
    fn job_released(&mut self, job: &Job) {
        self.jobs.released += 1;
        if job.is_retry {
            self.jobs.retries += 1;
        }
    }

    fn job_started(&mut self, _job: &Job) {
        self.jobs.started += 1;
    }

    fn job_finished(&mut self, job: &Job) {
        match job.result() {
            JobResult::Success => {
                self.jobs.succeeded += 1;
                self.busy_seconds += job.duration();
            }
            JobResult::Failure => self.jobs.failed += 1,
            JobResult::Cancelled => self.jobs.cancelled += 1,
            JobResult::None => {}
        }
    }

    fn dag_started(&mut self, dag_job: &DagJob) {
        let dag = dag_job.dag();
        self.dags.insert(
            dag_job.id(),
            DagRecord {
                name: dag.name().to_string(),
                budget: dag.budget(),
                deadline: dag.deadline(),
                start: dag_job.start_time(),
                finish: None,
                tasks: dag.len(),
            },
        );
    }

    fn dag_finished(&mut self, dag_job: &DagJob, now: SimTime) {
        if let Some(record) = self.dags.get_mut(&dag_job.id()) {
            record.finish = Some(now);
        }
    }

    fn vm_launched(&mut self, _vm: &Vm) {
        self.vms_launched += 1;
    }

    fn vm_terminated(&mut self, _vm: &Vm) {
        self.vms_terminated += 1;
    }
}

/// The built-in statistics plus any listeners added by the caller.
#[derive(Default)]
pub struct ListenerSet {
    statistics: Statistics,
    extra: Vec<Box<dyn SimulationListener>>,
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("statistics", &self.statistics)
            .field("extra", &self.extra.len())
            .finish()
    }
}

impl ListenerSet {
    pub fn add(&mut self, listener: Box<dyn SimulationListener>) {
        self.extra.push(listener);
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    fn each(&mut self, mut f: impl FnMut(&mut dyn SimulationListener)) {
        f(&mut self.statistics);
        for l in &mut self.extra {
            f(l.as_mut());
        }
    }
}

impl SimulationListener for ListenerSet {
    fn job_released(&mut self, job: &Job) {
        self.each(|l| l.job_released(job));
    }

    fn job_started(&mut self, job: &Job) {
        self.each(|l| l.job_started(job));
    }

    fn job_finished(&mut self, job: &Job) {
        self.each(|l| l.job_finished(job));
    }

    fn dag_started(&mut self, dag_job: &DagJob) {
        self.each(|l| l.dag_started(dag_job));
    }

    fn dag_finished(&mut self, dag_job: &DagJob, now: SimTime) {
        self.each(|l| l.dag_finished(dag_job, now));
    }

    fn vm_launched(&mut self, vm: &Vm) {
        self.each(|l| l.vm_launched(vm));
    }

    fn vm_terminated(&mut self, vm: &Vm) {
        self.each(|l| l.vm_terminated(vm));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub algorithm: AlgorithmKind,
    pub provisioner: String,
    pub end_time: SimTime,
    /// Every DAG finished before the run stopped.
    pub complete: bool,
    pub total_cost: f64,
    pub total_budget: f64,
    pub makespan: Option<SimTime>,
    pub dags: Vec<DagRecord>,
    pub jobs: JobCounts,
    /// VMs ever leased, by type name.
    pub vms_by_type: BTreeMap<String, usize>,
    pub mean_utilization: f64,
}

impl SimulationReport {
    pub fn build(
        algorithm: AlgorithmKind,
        provisioner: String,
        statistics: &Statistics,
        cloud: &Cloud,
        end_time: SimTime,
    ) -> Self {
        let dags: Vec<DagRecord> = statistics.dags().cloned().collect();
        let mut vms_by_type = BTreeMap::new();
        for vm in cloud.iter() {
            *vms_by_type.entry(vm.vm_type().name.clone()).or_insert(0) += 1;
        }
        let launched: Vec<&Vm> = cloud.iter().filter(|vm| vm.is_launched()).collect();
        let mean_utilization = if launched.is_empty() {
            0.0
        } else {
            launched.iter().map(|vm| vm.utilization(end_time)).sum::<f64>() / launched.len() as f64
        };

        Self {
            algorithm,
            provisioner,
            end_time,
            complete: dags.iter().all(|d| d.finish.is_some()),
            total_cost: cloud.iter().map(|vm| vm.cost(end_time)).sum(),
            total_budget: dags.iter().map(|d| d.budget).sum(),
            makespan: statistics.makespan(),
            dags,
            jobs: statistics.jobs(),
            vms_by_type,
            mean_utilization,
        }
    }

    pub fn within_budget(&self) -> bool {
        self.total_cost <= self.total_budget + 1e-9
    }

    pub fn deadlines_met(&self) -> usize {
        self.dags.iter().filter(|d| d.deadline_met()).count()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cloudsched report")?;
        writeln!(f, "  algorithm   = {} ({})", self.algorithm, self.provisioner)?;
        writeln!(f, "  end time    = {:.2}", self.end_time)?;
        match self.makespan {
            Some(m) => writeln!(f, "  makespan    = {m:.2}")?,
            None => writeln!(f, "  makespan    = n/a")?,
        }
        writeln!(
            f,
            "  total cost  = {:.2} (budget {:.2}, {})",
            self.total_cost,
            self.total_budget,
            if self.within_budget() { "met" } else { "exceeded" }
        )?;
        writeln!(
            f,
            "  deadlines   = {}/{} met",
            self.deadlines_met(),
            self.dags.len()
        )?;
        if !self.complete {
            writeln!(f, "  WARNING: run stopped before every DAG finished")?;
        }
        writeln!(f)?;

        writeln!(f, "dags ({}):", self.dags.len())?;
        for d in &self.dags {
            let finish = d
                .finish
                .map(|t| format!("{t:.2}"))
                .unwrap_or_else(|| "unfinished".to_string());
            writeln!(
                f,
                "  - {} tasks={} start={:.2} finish={} deadline={:.2} budget={:.2}{}",
                d.name,
                d.tasks,
                d.start,
                finish,
                d.deadline,
                d.budget,
                if d.deadline_met() { "" } else { " LATE" }
            )?;
        }
        writeln!(f)?;

        let j = &self.jobs;
        writeln!(
            f,
            "jobs: released={} started={} succeeded={} failed={} cancelled={} retries={}",
            j.released, j.started, j.succeeded, j.failed, j.cancelled, j.retries
        )?;
        writeln!(f, "vms (mean utilization {:.3}):", self.mean_utilization)?;
        for (name, count) in &self.vms_by_type {
            writeln!(f, "  - {name}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dag::Dag;

    fn dag_job(id: usize, deadline: f64) -> DagJob {
        let mut dag = Dag::new(id.to_string(), format!("wf{id}"))
            .with_budget(2.0)
            .with_deadline(deadline);
        dag.add_task("a", 1.0, 0).unwrap();
        DagJob::new(DagJobId(id), Arc::new(dag), 0.0)
    }

    #[test]
    fn makespan_is_last_dag_finish() {
        let mut s = Statistics::default();
        let (a, b) = (dag_job(0, 50.0), dag_job(1, 50.0));
        s.dag_started(&a);
        s.dag_started(&b);
        assert_eq!(s.makespan(), None);
        s.dag_finished(&b, 40.0);
        s.dag_finished(&a, 70.0);
        assert_eq!(s.makespan(), Some(70.0));

        let met: Vec<bool> = s.dags().map(DagRecord::deadline_met).collect();
        assert_eq!(met, vec![false, true]);
    }

    struct Counter(std::rc::Rc<std::cell::Cell<usize>>);

    impl SimulationListener for Counter {
        fn dag_started(&mut self, _dag_job: &DagJob) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn listener_set_fans_out() {
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut set = ListenerSet::default();
        set.add(Box::new(Counter(seen.clone())));
        set.dag_started(&dag_job(0, 10.0));
        assert_eq!(seen.get(), 1);
        assert_eq!(set.statistics().dags().count(), 1);
    }

    #[test]
    fn empty_report_renders() {
        let report = SimulationReport::build(
            AlgorithmKind::Ebpsm,
            "idle_threshold".into(),
            &Statistics::default(),
            &Cloud::new(),
            0.0,
        );
        assert!(report.complete);
        assert!(report.within_budget());
        let text = report.to_string();
        assert!(text.contains("algorithm   = ebpsm (idle_threshold)"));
        assert!(text.contains("makespan    = n/a"));
    }
}
