// src/budget/deadline.rs

//! Proportional per-task deadlines.
//!
//! The slack between the DAG deadline and its critical path is shared out in
//! proportion to each task's runtime:
//! `deadline(t) = max(latest parent deadline, start) + rt(t) + rt(t)/Σrt * share`.

use std::collections::BTreeMap;

use crate::dag::{Dag, TaskId};

/// Length of the longest runtime-weighted path, `runtimes` indexed by task id.
pub fn critical_path(dag: &Dag, order: &[TaskId], runtimes: &[f64]) -> f64 {
    let mut finish = vec![0.0f64; dag.len()];
    let mut longest = 0.0f64;
    for t in order {
        let start = dag
            .task(*t)
            .parents
            .iter()
            .map(|p| finish[p.0])
            .fold(0.0, f64::max);
        finish[t.0] = start + runtimes[t.0];
        longest = longest.max(finish[t.0]);
    }
    longest
}

/// Deadlines for every task in `order` given a slack `share` to spread.
pub fn deadline_distribution(
    dag: &Dag,
    order: &[TaskId],
    runtimes: &[f64],
    start: f64,
    share: f64,
) -> BTreeMap<TaskId, f64> {
    let total: f64 = order.iter().map(|t| runtimes[t.0]).sum();
    let mut deadlines: BTreeMap<TaskId, f64> = BTreeMap::new();

    for t in order {
        let rt = runtimes[t.0];
        let excess = if total > 0.0 { rt / total * share } else { 0.0 };
        let latest_parent = dag
            .task(*t)
            .parents
            .iter()
            .filter_map(|p| deadlines.get(p).copied())
            .fold(start, f64::max);
        deadlines.insert(*t, latest_parent + rt + excess);
    }
    deadlines
}

/// Spread whatever slack the DAG deadline leaves after its critical path.
/// A deadline tighter than the critical path leaves no slack.
pub fn assign_deadlines(
    dag: &Dag,
    order: &[TaskId],
    runtimes: &[f64],
    start: f64,
) -> BTreeMap<TaskId, f64> {
    let share = (dag.deadline() - start - critical_path(dag, order, runtimes)).max(0.0);
    deadline_distribution(dag, order, runtimes, start, share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::topological_order;

    fn fork() -> Dag {
        // a -> {b, c}
        let mut dag = Dag::new("0", "fork").with_deadline(100.0);
        dag.add_task("a", 1.0, 0).unwrap();
        dag.add_task("b", 1.0, 0).unwrap();
        dag.add_task("c", 1.0, 0).unwrap();
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag
    }

    #[test]
    fn critical_path_follows_longest_branch() {
        let dag = fork();
        let order = topological_order(&dag).unwrap();
        assert_eq!(critical_path(&dag, &order, &[10.0, 20.0, 30.0]), 40.0);
    }

    #[test]
    fn slack_is_shared_by_runtime() {
        let dag = fork();
        let order = topological_order(&dag).unwrap();
        let runtimes = [10.0, 20.0, 30.0];
        // slack = 100 - 40 = 60, total runtime 60: excess equals runtime.
        let d = assign_deadlines(&dag, &order, &runtimes, 0.0);
        assert_eq!(d[&TaskId(0)], 20.0);
        assert_eq!(d[&TaskId(1)], 60.0);
        assert_eq!(d[&TaskId(2)], 80.0);
    }

    #[test]
    fn tight_deadline_leaves_no_slack() {
        let dag = fork().with_deadline(5.0);
        let order = topological_order(&dag).unwrap();
        let d = assign_deadlines(&dag, &order, &[10.0, 20.0, 30.0], 0.0);
        assert_eq!(d[&TaskId(2)], 40.0);
    }

    #[test]
    fn deadlines_respect_start_time() {
        let dag = fork();
        let order = topological_order(&dag).unwrap();
        let d = deadline_distribution(&dag, &order, &[1.0, 1.0, 1.0], 50.0, 0.0);
        assert_eq!(d[&TaskId(0)], 51.0);
        assert_eq!(d[&TaskId(1)], 52.0);
    }
}
