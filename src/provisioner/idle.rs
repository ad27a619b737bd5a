// src/provisioner/idle.rs

//! Idle-tick counting: a free VM that stays unused for enough consecutive
//! ticks is released regardless of where it is in its billing period.

use tracing::debug;

use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::types::VmId;

pub const DEFAULT_IDLE_THRESHOLD: u32 = 20;

pub(crate) fn release_idle(ctx: &mut PolicyContext<'_>, threshold: u32) -> Result<()> {
    let free: Vec<VmId> = ctx.engine.free_vms().iter().copied().collect();
    let mut expired = Vec::new();

    for id in free {
        let vm = ctx.cloud.get_mut(id)?;
        if vm.idle_ticks() >= threshold {
            if vm.is_really_free() {
                expired.push(id);
            }
        } else {
            vm.increment_idle_ticks();
        }
    }

    for id in expired {
        debug!(vm = %id, threshold, time = ctx.now, "releasing vm after idle ticks");
        ctx.terminate(id)?;
    }
    Ok(())
}
