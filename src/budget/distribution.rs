// src/budget/distribution.rs

//! Splitting a DAG budget into per-task budgets.
//!
//! Every variant takes the tasks to cover (in the caller's priority order),
//! the budget to split and the prediction environment, and returns one
//! allocation per input task. Allocations are never negative and never sum
//! to more than the budget.

use std::collections::BTreeMap;

use crate::cloud::{Environment, VmType};
use crate::dag::{Dag, TaskId};

/// Weight of the task-count share in the level-based split.
pub const DEFAULT_LEVEL_ALPHA: f64 = 0.5;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetDistribution {
    TopDownCheapest,
    TopDownFastest,
    LevelCheapest { alpha: f64 },
    LevelFastest { alpha: f64 },
    Mslbl,
}

impl BudgetDistribution {
    pub fn distribute(
        &self,
        tasks: &[TaskId],
        dag: &Dag,
        budget: f64,
        env: &Environment,
    ) -> BTreeMap<TaskId, f64> {
        let raw = match self {
            BudgetDistribution::TopDownCheapest => top_down_cheapest(tasks, dag, budget, env),
            BudgetDistribution::TopDownFastest => top_down_fastest(tasks, dag, budget, env),
            BudgetDistribution::LevelCheapest { alpha } => {
                level_based(tasks, dag, budget, env, *alpha, LevelFill::Cheapest)
            }
            BudgetDistribution::LevelFastest { alpha } => {
                level_based(tasks, dag, budget, env, *alpha, LevelFill::Fastest)
            }
            BudgetDistribution::Mslbl => mslbl(tasks, dag, budget, env),
        };
        clamp_to_budget(raw, budget)
    }
}

/// Levels relative to the given task list: parents outside the list do not
/// count. Aligned with `tasks`.
fn list_levels(tasks: &[TaskId], dag: &Dag) -> Vec<usize> {
    let mut by_task: BTreeMap<TaskId, usize> = tasks.iter().map(|t| (*t, 0)).collect();
    let mut out = Vec::with_capacity(tasks.len());
    for t in tasks {
        let level = dag
            .task(*t)
            .parents
            .iter()
            .filter_map(|p| by_task.get(p).map(|l| l + 1))
            .max()
            .unwrap_or(0);
        by_task.insert(*t, level);
        out.push(level);
    }
    out
}

fn level_count(levels: &[usize]) -> usize {
    levels.iter().max().map(|l| l + 1).unwrap_or(0)
}

/// Cost of a fresh VM of `vm_type` running `runtime`, counting its expected
/// boot time.
fn cost_with_boot(env: &Environment, vm_type: &VmType, runtime: f64) -> f64 {
    env.cost(runtime + vm_type.provisioning_delay.mean(), vm_type)
}

/// Upgrade tasks type by type (cheapest first), level by level, keeping an
/// upgrade only while the total stays within budget.
pub fn top_down_cheapest(
    tasks: &[TaskId],
    dag: &Dag,
    budget: f64,
    env: &Environment,
) -> BTreeMap<TaskId, f64> {
    let levels = list_levels(tasks, dag);
    let mut budgets: BTreeMap<TaskId, f64> = tasks.iter().map(|t| (*t, 0.0)).collect();
    let mut assigned = 0.0;

    for vm_type in env.types_by_price() {
        for level in 0..level_count(&levels) {
            for (task, _) in tasks.iter().zip(&levels).filter(|(_, l)| **l == level) {
                let runtime = env.predicted_runtime(vm_type, dag, *task);
                let cost = cost_with_boot(env, vm_type, runtime);
                let current = budgets.get(task).copied().unwrap_or(0.0);
                let tentative = assigned - current + cost;
                if tentative <= budget + EPSILON {
                    budgets.insert(*task, cost);
                    assigned = tentative;
                }
            }
        }
    }
    budgets
}

/// One pass in level order with a single decreasing counter: each task
/// takes the first (most expensive) type that fits, or whatever is left.
pub fn top_down_fastest(
    tasks: &[TaskId],
    dag: &Dag,
    budget: f64,
    env: &Environment,
) -> BTreeMap<TaskId, f64> {
    let levels = list_levels(tasks, dag);
    let types = env.types_by_price_descending();
    let mut budgets: BTreeMap<TaskId, f64> = tasks.iter().map(|t| (*t, 0.0)).collect();
    let mut remaining = budget.max(0.0);

    for level in 0..level_count(&levels) {
        for (task, _) in tasks.iter().zip(&levels).filter(|(_, l)| **l == level) {
            let fit = types.iter().find_map(|vm_type| {
                let runtime = env.predicted_runtime_with_degradation(vm_type, dag, *task);
                let cost = cost_with_boot(env, vm_type, runtime);
                (cost <= remaining).then_some(cost)
            });
            let allocation = fit.unwrap_or(remaining);
            budgets.insert(*task, allocation);
            remaining -= allocation;
        }
    }
    budgets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelFill {
    Cheapest,
    Fastest,
}

/// Per-level budgets proportional to task count, runtime and level rank.
/// The last level absorbs the rounding remainder.
pub fn level_budgets(
    tasks: &[TaskId],
    dag: &Dag,
    budget: f64,
    env: &Environment,
    alpha: f64,
) -> Vec<f64> {
    let levels = list_levels(tasks, dag);
    let count = level_count(&levels);
    if count == 0 {
        return Vec::new();
    }

    let fastest = env.fastest_vm_type();
    let mut tasks_by_level = vec![0.0; count];
    let mut runtime_by_level = vec![0.0; count];
    for (task, level) in tasks.iter().zip(&levels) {
        tasks_by_level[*level] += 1.0;
        runtime_by_level[*level] += env.predicted_runtime(fastest, dag, *task);
    }
    let total_tasks: f64 = tasks_by_level.iter().sum();
    let total_runtime: f64 = runtime_by_level.iter().sum();
    let rank_sum = match (0..count).sum::<usize>() {
        0 => 1.0,
        s => s as f64,
    };

    let mut out = vec![0.0; count];
    let mut left = budget;
    for i in 0..count {
        if i == count - 1 {
            out[i] = left;
            break;
        }
        let task_part = alpha * (tasks_by_level[i] / total_tasks);
        let runtime_part = if total_runtime > 0.0 {
            (1.0 - alpha) * (runtime_by_level[i] / total_runtime)
        } else {
            0.0
        };
        let rank_part = (count - i) as f64 / rank_sum;
        out[i] = ((task_part + runtime_part + rank_part) * budget).round();
        left -= out[i];
    }
    out
}

fn level_based(
    tasks: &[TaskId],
    dag: &Dag,
    budget: f64,
    env: &Environment,
    alpha: f64,
    fill: LevelFill,
) -> BTreeMap<TaskId, f64> {
    let levels = list_levels(tasks, dag);
    let level_budget = level_budgets(tasks, dag, budget, env, alpha);
    let mut budgets: BTreeMap<TaskId, f64> = tasks.iter().map(|t| (*t, 0.0)).collect();
    let mut spent = 0.0;
    let mut carry = 0.0;

    for (level, share) in level_budget.iter().enumerate() {
        // The rank term can over-commit early levels; never hand out more
        // than what is left of the DAG budget.
        let pool = (share + carry).min(budget - spent).max(0.0);
        let members: Vec<TaskId> = tasks
            .iter()
            .zip(&levels)
            .filter(|(_, l)| **l == level)
            .map(|(t, _)| *t)
            .collect();

        let mut left = pool;
        match fill {
            LevelFill::Cheapest => {
                for vm_type in env.types_by_price() {
                    for task in &members {
                        let cost = env.cost(env.predicted_runtime(vm_type, dag, *task), vm_type);
                        let current = budgets.get(task).copied().unwrap_or(0.0);
                        if left + current - cost >= -EPSILON {
                            left = left + current - cost;
                            budgets.insert(*task, cost);
                        }
                    }
                }
            }
            LevelFill::Fastest => {
                let types = env.types_by_price_descending();
                for task in &members {
                    let fit = types.iter().find_map(|vm_type| {
                        let cost = env.cost(env.predicted_runtime(vm_type, dag, *task), vm_type);
                        (cost <= left + EPSILON).then_some(cost)
                    });
                    if let Some(cost) = fit {
                        left -= cost;
                        budgets.insert(*task, cost);
                    }
                }
            }
        }

        spent += pool - left;
        carry = left;
    }
    budgets
}

/// Uniform fraction between each task's cost on the cheapest type and its
/// cost on the fastest type.
pub fn mslbl(
    tasks: &[TaskId],
    dag: &Dag,
    budget: f64,
    env: &Environment,
) -> BTreeMap<TaskId, f64> {
    let cheapest = env.cheapest_vm_type();
    let fastest = env.fastest_vm_type();
    let bounds: Vec<(TaskId, f64, f64)> = tasks
        .iter()
        .map(|t| {
            let min = env.cost(env.predicted_runtime_no_transfer(cheapest, dag, *t), cheapest);
            let max = env.cost(env.predicted_runtime_no_transfer(fastest, dag, *t), fastest);
            (*t, min, max)
        })
        .collect();
    let min_cost: f64 = bounds.iter().map(|(_, min, _)| min).sum();
    let max_cost: f64 = bounds.iter().map(|(_, _, max)| max).sum();

    if (max_cost - min_cost).abs() < EPSILON {
        let surplus = if bounds.is_empty() {
            0.0
        } else {
            (budget - min_cost) / bounds.len() as f64
        };
        return bounds.into_iter().map(|(t, min, _)| (t, min + surplus)).collect();
    }

    let fraction = (budget - min_cost) / (max_cost - min_cost);
    bounds
        .into_iter()
        .map(|(t, min, max)| (t, min + (max - min) * fraction))
        .collect()
}

/// Clamp negatives to zero and, if that pushes the total over `budget`,
/// scale everything down proportionally.
fn clamp_to_budget(mut budgets: BTreeMap<TaskId, f64>, budget: f64) -> BTreeMap<TaskId, f64> {
    for v in budgets.values_mut() {
        if !(*v > 0.0) {
            *v = 0.0;
        }
    }
    let total: f64 = budgets.values().sum();
    let limit = budget.max(0.0);
    if total > limit && total > 0.0 {
        let scale = limit / total;
        for v in budgets.values_mut() {
            *v *= scale;
        }
    }
    budgets
}

/// Sum of allocations, for logging and assertions.
pub fn total(budgets: &BTreeMap<TaskId, f64>) -> f64 {
    budgets.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::StorageParams;
    use crate::dag::topological_order;

    /// slow: 1 mips @ 1.0, fast: 10 mips @ 5.0, hourly billing.
    fn env() -> Environment {
        let types = vec![
            VmType::builder("slow").mips(1.0).price(1.0).build(),
            VmType::builder("fast").mips(10.0).price(5.0).build(),
        ];
        Environment::new(types, StorageParams::default(), false).unwrap()
    }

    /// a -> b -> c, each 3600 MI (one hour on the slow type).
    fn chain() -> Dag {
        let mut dag = Dag::new("0", "chain").with_budget(10.0);
        for name in ["a", "b", "c"] {
            dag.add_task(name, 3600.0, 0).unwrap();
        }
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("b", "c").unwrap();
        dag
    }

    fn order(dag: &Dag) -> Vec<TaskId> {
        topological_order(dag).unwrap()
    }

    #[test]
    fn top_down_cheapest_upgrades_early_levels_first() {
        let dag = chain();
        let tasks = order(&dag);
        let env = env();

        // Cheapest everywhere costs 3; upgrading one task costs +4, so with
        // a budget of 7 only the first level gets the fast type.
        let b = top_down_cheapest(&tasks, &dag, 7.0, &env);
        assert_eq!(b[&tasks[0]], 5.0);
        assert_eq!(b[&tasks[1]], 1.0);
        assert_eq!(b[&tasks[2]], 1.0);

        let b = top_down_cheapest(&tasks, &dag, 15.0, &env);
        assert!(b.values().all(|v| *v == 5.0));
    }

    #[test]
    fn top_down_cheapest_leaves_zero_when_nothing_fits() {
        let dag = chain();
        let tasks = order(&dag);
        let b = top_down_cheapest(&tasks, &dag, 2.0, &env());
        assert_eq!(b[&tasks[0]], 1.0);
        assert_eq!(b[&tasks[1]], 1.0);
        assert_eq!(b[&tasks[2]], 0.0);
    }

    #[test]
    fn top_down_fastest_exhausts_budget_in_order() {
        let dag = chain();
        let tasks = order(&dag);
        let b = top_down_fastest(&tasks, &dag, 11.0, &env());
        assert_eq!(b[&tasks[0]], 5.0);
        assert_eq!(b[&tasks[1]], 5.0);
        // Degraded slow runtime spills into two hours, so nothing fits the
        // 1.0 left and c takes the remainder.
        assert_eq!(b[&tasks[2]], 1.0);

        let b = top_down_fastest(&tasks, &dag, 5.5, &env());
        assert_eq!(b[&tasks[0]], 5.0);
        assert!((b[&tasks[1]] - 0.5).abs() < 1e-9);
        assert_eq!(b[&tasks[2]], 0.0);
    }

    #[test]
    fn mslbl_interpolates_between_min_and_max() {
        let dag = chain();
        let tasks = order(&dag);
        let env = env();
        // min cost 3 (slow), max cost 15 (fast): 9 is halfway.
        let b = BudgetDistribution::Mslbl.distribute(&tasks, &dag, 9.0, &env);
        for t in &tasks {
            assert!((b[t] - 3.0).abs() < 1e-9);
        }
        let b = BudgetDistribution::Mslbl.distribute(&tasks, &dag, 3.0, &env);
        for t in &tasks {
            assert!((b[t] - 1.0).abs() < 1e-9);
        }
        let b = BudgetDistribution::Mslbl.distribute(&tasks, &dag, 15.0, &env);
        for t in &tasks {
            assert!((b[t] - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mslbl_with_single_type_does_not_divide_by_zero() {
        let types = vec![VmType::builder("only").mips(1.0).price(1.0).build()];
        let env = Environment::new(types, StorageParams::default(), false).unwrap();
        let dag = chain();
        let tasks = order(&dag);
        let b = BudgetDistribution::Mslbl.distribute(&tasks, &dag, 6.0, &env);
        for t in &tasks {
            assert!((b[t] - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mslbl_below_minimum_stays_within_budget() {
        let dag = chain();
        let tasks = order(&dag);
        let b = BudgetDistribution::Mslbl.distribute(&tasks, &dag, 1.5, &env());
        assert!(b.values().all(|v| *v >= 0.0));
        assert!(total(&b) <= 1.5 + 1e-9);
    }

    #[test]
    fn level_budgets_absorb_remainder_in_last_level() {
        let dag = chain();
        let tasks = order(&dag);
        let shares = level_budgets(&tasks, &dag, 10.0, &env(), DEFAULT_LEVEL_ALPHA);
        assert_eq!(shares.len(), 3);
        assert!((shares.iter().sum::<f64>() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn level_variants_never_exceed_budget() {
        let dag = chain();
        let tasks = order(&dag);
        let env = env();
        for budget in [0.0, 1.0, 3.0, 7.5, 20.0] {
            for kind in [
                BudgetDistribution::LevelCheapest { alpha: 0.3 },
                BudgetDistribution::LevelFastest { alpha: 0.7 },
            ] {
                let b = kind.distribute(&tasks, &dag, budget, &env);
                assert_eq!(b.len(), tasks.len());
                assert!(total(&b) <= budget + 1e-6, "{kind:?} with {budget}");
            }
        }
    }

    #[test]
    fn partial_task_list_ignores_outside_parents() {
        let dag = chain();
        let tasks = order(&dag);
        // Only b and c remain: b is level 0 of the sub-list.
        let rest = &tasks[1..];
        let b = top_down_cheapest(rest, &dag, 6.0, &env());
        assert_eq!(b.len(), 2);
        assert_eq!(b[&tasks[1]], 5.0);
        assert_eq!(b[&tasks[2]], 1.0);
    }

    #[test]
    fn expected_boot_time_enters_cost() {
        let slow = VmType::builder("slow")
            .mips(1.0)
            .price(1.0)
            .provisioning_delay(crate::cloud::DelayDistribution::constant(1.0))
            .build();
        let env = Environment::new(vec![slow], StorageParams::default(), false).unwrap();
        let dag = chain();
        let tasks = order(&dag);
        // 3600 s of work plus 1 s of boot spills into a second hour.
        let b = top_down_cheapest(&tasks, &dag, 100.0, &env);
        assert_eq!(b[&tasks[0]], 2.0);
    }
}
