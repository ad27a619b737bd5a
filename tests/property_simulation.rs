// tests/property_simulation.rs

mod common;

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use cloudsched::budget::BudgetDistribution;
use cloudsched::cloud::{JobResult, Vm, VmBehaviour};
use cloudsched::dag::{topological_order, Dag, TaskId};
use cloudsched::sim::Simulation;
use cloudsched::types::{AlgorithmKind, VmId};

use common::*;

// Strategy to generate a valid DAG.
// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Dag> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..3),
            num_tasks,
        );
        let sizes = proptest::collection::vec(1.0f64..5000.0, num_tasks);
        (deps, sizes, 0.5f64..50.0).prop_map(move |(raw_deps, sizes, budget)| {
            let mut builder = DagBuilder::new("random").budget(budget).deadline(1e6);
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let name = format!("task_{i}");
                let parents: HashSet<String> = if i == 0 {
                    HashSet::new()
                } else {
                    potential.iter().map(|d| format!("task_{}", d % i)).collect()
                };
                let refs: Vec<&str> = parents.iter().map(String::as_str).collect();
                builder = builder.task_after(&name, sizes[i], &refs);
            }
            builder.build()
        })
    })
}

fn algorithm_strategy() -> impl Strategy<Value = AlgorithmKind> {
    prop_oneof![
        Just(AlgorithmKind::Ebpsm),
        Just(AlgorithmKind::Mslbl),
        Just(AlgorithmKind::Fastest),
    ]
}

fn distribution_strategy() -> impl Strategy<Value = BudgetDistribution> {
    prop_oneof![
        Just(BudgetDistribution::TopDownCheapest),
        Just(BudgetDistribution::TopDownFastest),
        (0.0f64..=1.0).prop_map(|alpha| BudgetDistribution::LevelCheapest { alpha }),
        (0.0f64..=1.0).prop_map(|alpha| BudgetDistribution::LevelFastest { alpha }),
        Just(BudgetDistribution::Mslbl),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tasks_are_released_only_after_all_parents_complete(
        dag in dag_strategy(8),
        algorithm in algorithm_strategy(),
    ) {
        let tasks = dag.len();
        let parents: BTreeMap<TaskId, Vec<TaskId>> =
            dag.tasks().map(|t| (t.id, t.parents.clone())).collect();

        let (report, recorder) = run_recorded(
            Simulation::new(environment(two_type_catalog()))
                .algorithm(algorithm)
                .max_time(1e6)
                .workflow(dag),
        );

        prop_assert!(report.complete);
        prop_assert_eq!(report.jobs.succeeded, tasks);

        // Completion time of every task; each completes exactly once.
        let mut done: BTreeMap<TaskId, f64> = BTreeMap::new();
        for (_, task, result, at) in recorder.finished() {
            if result == JobResult::Success {
                prop_assert!(done.insert(task, at).is_none(), "{task} completed twice");
            }
        }
        prop_assert_eq!(done.len(), tasks);

        let released = recorder.released();
        prop_assert_eq!(released.len(), tasks);
        for (_, task, at, _) in released {
            for parent in &parents[&task] {
                let finished = done.get(parent).copied();
                prop_assert!(
                    finished.is_some_and(|f| f <= at),
                    "{task} released at {at} before parent {parent} finished ({finished:?})"
                );
            }
        }
    }

    #[test]
    fn distributions_never_exceed_the_budget(
        dag in dag_strategy(10),
        budget in 0.0f64..200.0,
        distribution in distribution_strategy(),
    ) {
        let env = environment(two_type_catalog());
        let order = topological_order(&dag).unwrap();
        let budgets = distribution.distribute(&order, &dag, budget, &env);

        prop_assert!(budgets.values().all(|b| *b >= -1e-6));
        let total: f64 = budgets.values().sum();
        prop_assert!(total <= budget + 1e-6, "{total} > {budget} with {distribution:?}");
    }

    #[test]
    fn vm_cost_is_monotone_and_a_multiple_of_the_price(
        price in 0.01f64..10.0,
        period in 1.0f64..7200.0,
        times in proptest::collection::vec(0.0f64..100_000.0, 1..20),
    ) {
        let vm_type = cloudsched::cloud::VmType::builder("p")
            .price(price)
            .billing_period(period)
            .build();
        let mut vm = Vm::new(VmId(0), vm_type, VmBehaviour::default());
        vm.launch(0.0).unwrap();

        let mut times = times;
        times.sort_by(f64::total_cmp);
        let mut last = 0.0;
        for t in times {
            let cost = vm.cost(t);
            prop_assert!(cost >= last);
            let units = cost / price;
            prop_assert!((units - units.round()).abs() < 1e-6);
            prop_assert!(units >= 1.0);
            last = cost;
        }
    }
}
