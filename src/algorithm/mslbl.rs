// src/algorithm/mslbl.rs

//! Multi-stage, level-budgeted scheduling.
//!
//! Jobs go in ascending earliest-start order. Each task gets the same
//! fraction of the way from its cheapest to its fastest cost; budgets are
//! fixed once split.

use crate::algorithm::dynamic::{fastest_affordable, BudgetScheduler, Flavour};
use crate::dag::{Dag, TaskId};
use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::provisioner::Provisioner;
use crate::types::VmId;

pub fn scheduler(provisioner: Option<Provisioner>) -> BudgetScheduler {
    BudgetScheduler::new(
        Flavour::Mslbl,
        provisioner.unwrap_or(Provisioner::BillingAware),
    )
}

/// Fastest affordable really-free VM, submitted without delay.
pub(crate) fn find_free_vm(
    ctx: &PolicyContext<'_>,
    dag: &Dag,
    task: TaskId,
    budget: f64,
) -> Result<Option<(VmId, f64)>> {
    let env = ctx.environment;
    let free = ctx.really_free_vms();
    Ok(
        fastest_affordable(ctx, &free, budget, |t| env.predicted_runtime(t, dag, task))?
            .map(|vm| (vm, 0.0)),
    )
}
