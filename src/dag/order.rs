// src/dag/order.rs

//! Topological orders and levels over a [`Dag`].

use std::collections::{BTreeMap, VecDeque};

use crate::dag::graph::{Dag, TaskId};
use crate::errors::{Result, SimError};

/// Kahn's algorithm; roots come out in id order and ties stay FIFO, so the
/// order is deterministic for a given DAG.
pub fn topological_order(dag: &Dag) -> Result<Vec<TaskId>> {
    let mut indegree: Vec<usize> = dag.tasks().map(|t| t.parents.len()).collect();
    let mut ready: VecDeque<TaskId> = dag.roots().collect();
    let mut order = Vec::with_capacity(dag.len());

    while let Some(id) = ready.pop_front() {
        order.push(id);
        for child in &dag.task(id).children {
            indegree[child.0] -= 1;
            if indegree[child.0] == 0 {
                ready.push_back(*child);
            }
        }
    }

    if order.len() != dag.len() {
        let stuck = dag
            .tasks()
            .find(|t| indegree[t.id.0] > 0)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        return Err(SimError::DagCycle(format!(
            "cycle detected in DAG '{}' involving task '{}'",
            dag.name(),
            stuck
        )));
    }

    Ok(order)
}

/// Children before parents.
pub fn reverse_topological_order(dag: &Dag) -> Result<Vec<TaskId>> {
    let mut order = topological_order(dag)?;
    order.reverse();
    Ok(order)
}

/// `level(root) = 0`, `level(t) = max(level(parent)) + 1`. Indexed by task id.
pub fn levels(dag: &Dag, order: &[TaskId]) -> Vec<usize> {
    let mut level = vec![0usize; dag.len()];
    for id in order {
        let l = dag
            .task(*id)
            .parents
            .iter()
            .map(|p| level[p.0] + 1)
            .max()
            .unwrap_or(0);
        level[id.0] = l;
    }
    level
}

/// Group `order` by `level`, keeping each level's tasks in `order` sequence.
/// Only tasks present in `order` are grouped, so this also works on subsets.
pub fn tasks_by_level(level: &[usize], order: &[TaskId]) -> BTreeMap<usize, Vec<TaskId>> {
    let mut grouped: BTreeMap<usize, Vec<TaskId>> = BTreeMap::new();
    for id in order {
        grouped.entry(level[id.0]).or_default().push(*id);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with_branch() -> Dag {
        // a -> b -> d, a -> c
        let mut dag = Dag::new("0", "w");
        for name in ["a", "b", "c", "d"] {
            dag.add_task(name, 1.0, 0).unwrap();
        }
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "d").unwrap();
        dag
    }

    #[test]
    fn order_respects_edges() {
        let dag = chain_with_branch();
        let order = topological_order(&dag).unwrap();
        let pos = |n: &str| order.iter().position(|t| *t == dag.task_id(n).unwrap()).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
    }

    #[test]
    fn levels_are_longest_path_from_roots() {
        let dag = chain_with_branch();
        let order = topological_order(&dag).unwrap();
        let level = levels(&dag, &order);
        assert_eq!(level, vec![0, 1, 1, 2]);
        let grouped = tasks_by_level(&level, &order);
        assert_eq!(grouped[&1].len(), 2);
    }

    #[test]
    fn cycle_is_reported() {
        let mut dag = chain_with_branch();
        dag.add_edge("d", "a").unwrap();
        assert!(matches!(topological_order(&dag), Err(SimError::DagCycle(_))));
    }
}
