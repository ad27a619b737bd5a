// src/provisioner/billing.rs

//! Billing-period aware termination of idle VMs.

use tracing::debug;

use crate::cloud::Vm;
use crate::engine::{PolicyContext, SimTime, PROVISIONING_INTERVAL};
use crate::errors::Result;
use crate::types::VmId;

/// Fleet utilization below which the utilization-gated policy releases VMs.
pub const UTILIZATION_THRESHOLD: f64 = 0.85;

/// Seconds left in the VM's current billing period.
pub fn seconds_to_period_end(vm: &Vm, now: SimTime) -> f64 {
    let runtime = vm.runtime(now);
    vm.vm_type().billing_units(runtime) * vm.vm_type().billing_period - runtime
}

/// True when terminating now still finishes teardown inside the paid
/// period, and waiting for the next tick would not.
pub fn is_completing_period(vm: &Vm, now: SimTime) -> bool {
    let slack = seconds_to_period_end(vm, now) - vm.vm_type().deprovisioning_delay.mean();
    (0.0..PROVISIONING_INTERVAL).contains(&slack)
}

/// Really-free VMs about to roll into a new billing period.
fn completing_vms(ctx: &PolicyContext<'_>) -> Vec<VmId> {
    ctx.really_free_vms()
        .into_iter()
        .filter(|id| {
            ctx.vm(*id)
                .map(|vm| is_completing_period(vm, ctx.now))
                .unwrap_or(false)
        })
        .collect()
}

pub(crate) fn release_completing(ctx: &mut PolicyContext<'_>) -> Result<()> {
    for vm in completing_vms(ctx) {
        debug!(vm = %vm, time = ctx.now, "releasing idle vm before next billing period");
        ctx.terminate(vm)?;
    }
    Ok(())
}

pub(crate) fn release_completing_if_underused(ctx: &mut PolicyContext<'_>) -> Result<()> {
    let Some(utilization) = ctx.engine.fleet_utilization() else {
        return Ok(());
    };
    debug!(utilization, time = ctx.now, "fleet utilization");
    if utilization < UTILIZATION_THRESHOLD {
        release_completing(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{DelayDistribution, VmType};
    use crate::engine::testing::Harness;

    fn hourly() -> VmType {
        VmType::builder("m")
            .billing_period(100.0)
            .deprovisioning_delay(DelayDistribution::constant(10.0))
            .build()
    }

    #[test]
    fn period_end_accounts_for_whole_units() {
        let mut h = Harness::new(vec![hourly()]);
        let id = h.launched_vm(&hourly(), 0.0);
        let vm = h.cloud.get(id).unwrap();
        assert_eq!(seconds_to_period_end(vm, 0.0), 100.0);
        assert_eq!(seconds_to_period_end(vm, 30.0), 70.0);
        assert_eq!(seconds_to_period_end(vm, 130.0), 70.0);
    }

    #[test]
    fn completes_only_inside_the_last_tick_before_teardown() {
        let mut h = Harness::new(vec![hourly()]);
        let id = h.launched_vm(&hourly(), 0.0);
        let vm = h.cloud.get(id).unwrap();
        assert!(!is_completing_period(vm, 80.0));
        assert!(is_completing_period(vm, 90.0));
        assert!(is_completing_period(vm, 89.5));
        // Too late: teardown would cross the boundary.
        assert!(!is_completing_period(vm, 95.0));
    }

    #[test]
    fn releases_idle_vm_at_period_end() {
        let mut h = Harness::new(vec![hourly()]);
        let id = h.launched_vm(&hourly(), 0.0);

        release_completing(&mut h.ctx(50.0)).unwrap();
        assert!(h.drain_terminated().is_empty());

        release_completing(&mut h.ctx(90.0)).unwrap();
        assert_eq!(h.drain_terminated(), vec![id]);
        assert!(h.cloud.get(id).unwrap().is_terminated());
        // Billed for exactly one period.
        assert_eq!(h.cloud.get(id).unwrap().cost(1_000.0), 1.0);
    }

    #[test]
    fn busy_fleet_keeps_its_vms() {
        let mut h = Harness::new(vec![hourly()]);
        let idle = h.launched_vm(&hourly(), 0.0);
        let busy = h.launched_vm(&hourly(), 0.0);
        h.engine.mark_busy(busy);
        let third = h.launched_vm(&hourly(), 0.0);
        h.engine.mark_busy(third);

        // 2 of 3 busy is below the threshold: the idle one goes.
        release_completing_if_underused(&mut h.ctx(90.0)).unwrap();
        assert_eq!(h.drain_terminated(), vec![idle]);

        // Now 2 of 2 busy: nothing to release.
        release_completing_if_underused(&mut h.ctx(90.0)).unwrap();
        assert!(h.drain_terminated().is_empty());
    }
}
