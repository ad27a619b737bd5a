// src/algorithm/ranking.rs

//! Per-DAG timing estimates used to prioritise jobs.
//!
//! - earliest start/finish from a forward pass with runtimes on the fastest
//!   type, never earlier than the submission time;
//! - upward rank from a reverse pass with runtimes averaged over the catalog;
//! - proportional deadlines spreading the DAG's slack.

use std::cmp::Ordering;

use crate::budget::assign_deadlines;
use crate::cloud::Environment;
use crate::dag::{reverse_topological_order, topological_order, Annotations, Dag, TaskId};
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct DagAnalysis {
    pub order: Vec<TaskId>,
    pub annotations: Annotations,
}

impl DagAnalysis {
    pub fn new(dag: &Dag, env: &Environment, now: f64) -> Result<Self> {
        let order = topological_order(dag)?;
        let mut annotations = Annotations::for_dag(dag);

        let fastest = env.fastest_vm_type();
        let runtimes: Vec<f64> = dag
            .task_ids()
            .map(|t| env.predicted_runtime(fastest, dag, t))
            .collect();

        let mut est = vec![0.0f64; dag.len()];
        for t in &order {
            let start = dag
                .task(*t)
                .parents
                .iter()
                .map(|p| est[p.0] + runtimes[p.0])
                .fold(now, f64::max);
            est[t.0] = start;
            if let Some(a) = annotations.get_mut(*t) {
                a.earliest_start = start;
                a.earliest_finish = start + runtimes[t.0];
            }
        }

        let types = env.vm_types();
        let average: Vec<f64> = dag
            .task_ids()
            .map(|t| {
                types
                    .iter()
                    .map(|vt| env.predicted_runtime(vt, dag, t))
                    .sum::<f64>()
                    / types.len() as f64
            })
            .collect();

        let mut rank = vec![0.0f64; dag.len()];
        for t in reverse_topological_order(dag)? {
            let own = average[t.0];
            rank[t.0] = dag
                .task(t)
                .children
                .iter()
                .map(|c| (rank[c.0] + own).ceil())
                .fold(own.ceil(), f64::max);
            if let Some(a) = annotations.get_mut(t) {
                a.rank = rank[t.0];
            }
        }

        for (t, deadline) in assign_deadlines(dag, &order, &runtimes, now) {
            if let Some(a) = annotations.get_mut(t) {
                a.deadline = deadline;
            }
        }

        Ok(Self { order, annotations })
    }

    /// `tasks` sorted by ascending earliest finish; ties by task id.
    pub fn by_earliest_finish(&self, tasks: &[TaskId]) -> Vec<TaskId> {
        let mut out = tasks.to_vec();
        out.sort_by(|a, b| {
            self.annotations
                .earliest_finish(*a)
                .total_cmp(&self.annotations.earliest_finish(*b))
                .then(a.cmp(b))
        });
        out
    }

    /// `tasks` sorted by descending upward rank; ties by task id.
    pub fn by_descending_rank(&self, tasks: &[TaskId]) -> Vec<TaskId> {
        let mut out = tasks.to_vec();
        out.sort_by(|a, b| match self
            .annotations
            .rank(*b)
            .total_cmp(&self.annotations.rank(*a))
        {
            Ordering::Equal => a.cmp(b),
            other => other,
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{StorageParams, VmType};

    fn env() -> Environment {
        let types = vec![
            VmType::builder("slow").mips(1.0).price(1.0).build(),
            VmType::builder("fast").mips(2.0).price(2.0).build(),
        ];
        Environment::new(types, StorageParams::default(), false).unwrap()
    }

    /// a(20) -> b(40), a -> c(10)
    fn dag() -> Dag {
        let mut dag = Dag::new("0", "wf").with_deadline(1_000.0);
        dag.add_task("a", 20.0, 0).unwrap();
        dag.add_task("b", 40.0, 0).unwrap();
        dag.add_task("c", 10.0, 0).unwrap();
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag
    }

    #[test]
    fn earliest_times_use_fastest_type_and_now() {
        let d = dag();
        let a = DagAnalysis::new(&d, &env(), 100.0).unwrap();
        let ann = &a.annotations;
        assert_eq!(ann.earliest_start(TaskId(0)), 100.0);
        assert_eq!(ann.earliest_finish(TaskId(0)), 110.0);
        assert_eq!(ann.earliest_start(TaskId(1)), 110.0);
        assert_eq!(ann.earliest_finish(TaskId(1)), 130.0);
        assert_eq!(ann.earliest_finish(TaskId(2)), 115.0);
    }

    #[test]
    fn upward_rank_averages_over_catalog() {
        let d = dag();
        let a = DagAnalysis::new(&d, &env(), 0.0).unwrap();
        // average runtimes: a = 15, b = 30, c = 7.5
        assert_eq!(a.annotations.rank(TaskId(1)), 30.0);
        assert_eq!(a.annotations.rank(TaskId(2)), 8.0);
        assert_eq!(a.annotations.rank(TaskId(0)), 45.0);
    }

    #[test]
    fn priority_orders_are_deterministic() {
        let d = dag();
        let a = DagAnalysis::new(&d, &env(), 0.0).unwrap();
        let all: Vec<TaskId> = d.task_ids().collect();
        assert_eq!(
            a.by_earliest_finish(&all),
            vec![TaskId(0), TaskId(2), TaskId(1)]
        );
        assert_eq!(
            a.by_descending_rank(&all),
            vec![TaskId(0), TaskId(1), TaskId(2)]
        );
    }

    #[test]
    fn deadlines_are_annotated() {
        let d = dag();
        let a = DagAnalysis::new(&d, &env(), 0.0).unwrap();
        let root = a.annotations.get(TaskId(0)).unwrap().deadline;
        let leaf = a.annotations.get(TaskId(1)).unwrap().deadline;
        assert!(root > 10.0);
        assert!(leaf > root);
        assert!(leaf <= 1_000.0 + 1e-9);
    }
}
