// src/provisioner/mod.rs

//! VM lifecycle policies.
//!
//! A provisioner runs on every provisioning tick and decides which VMs to
//! release. Leasing VMs for specific jobs is done by the algorithms through
//! [`Provisioner::provision_resource`].

pub mod billing;
pub mod idle;

use std::fmt;

use serde::Deserialize;
use tracing::{info, warn};

use crate::cloud::VmType;
use crate::engine::PolicyContext;
use crate::errors::Result;
use crate::types::VmId;

pub use billing::{is_completing_period, seconds_to_period_end, UTILIZATION_THRESHOLD};
pub use idle::DEFAULT_IDLE_THRESHOLD;

/// Which policy to run, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerKind {
    BillingAware,
    UtilizationAware,
    IdleThreshold,
    OneTaskOneVm,
    SingleVm,
}

impl fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionerKind::BillingAware => "billing_aware",
            ProvisionerKind::UtilizationAware => "utilization_aware",
            ProvisionerKind::IdleThreshold => "idle_threshold",
            ProvisionerKind::OneTaskOneVm => "one_task_one_vm",
            ProvisionerKind::SingleVm => "single_vm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Provisioner {
    /// Release idle VMs just before they start a new billing period.
    BillingAware,
    /// Same check, only while the fleet is underused.
    UtilizationAware,
    /// Release VMs that stayed free for `threshold` ticks.
    IdleThreshold { threshold: u32 },
    /// Algorithms lease and release one VM per job; the tick does nothing.
    OneTaskOneVm,
    /// One VM of the slowest type for the whole run.
    SingleVm { provisioned: Option<VmId> },
}

impl Provisioner {
    pub fn from_kind(kind: ProvisionerKind) -> Self {
        match kind {
            ProvisionerKind::BillingAware => Provisioner::BillingAware,
            ProvisionerKind::UtilizationAware => Provisioner::UtilizationAware,
            ProvisionerKind::IdleThreshold => Provisioner::IdleThreshold {
                threshold: DEFAULT_IDLE_THRESHOLD,
            },
            ProvisionerKind::OneTaskOneVm => Provisioner::OneTaskOneVm,
            ProvisionerKind::SingleVm => Provisioner::SingleVm { provisioned: None },
        }
    }

    pub fn kind(&self) -> ProvisionerKind {
        match self {
            Provisioner::BillingAware => ProvisionerKind::BillingAware,
            Provisioner::UtilizationAware => ProvisionerKind::UtilizationAware,
            Provisioner::IdleThreshold { .. } => ProvisionerKind::IdleThreshold,
            Provisioner::OneTaskOneVm => ProvisionerKind::OneTaskOneVm,
            Provisioner::SingleVm { .. } => ProvisionerKind::SingleVm,
        }
    }

    /// Body of one provisioning tick.
    pub fn provision_resources(&mut self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        match self {
            Provisioner::BillingAware => billing::release_completing(ctx),
            Provisioner::UtilizationAware => billing::release_completing_if_underused(ctx),
            Provisioner::IdleThreshold { threshold } => idle::release_idle(ctx, *threshold),
            Provisioner::OneTaskOneVm => Ok(()),
            Provisioner::SingleVm { provisioned } => {
                if provisioned.is_none() {
                    let slowest = ctx.environment.slowest_vm_type().clone();
                    *provisioned = Some(ctx.provision(&slowest)?);
                }
                Ok(())
            }
        }
    }

    pub fn provision_resource(
        &self,
        ctx: &mut PolicyContext<'_>,
        vm_type: &VmType,
    ) -> Result<VmId> {
        ctx.provision(vm_type)
    }

    pub fn deprovision_resource(&self, ctx: &mut PolicyContext<'_>, vm: VmId) -> Result<()> {
        ctx.terminate(vm)
    }

    /// Release the fleet once no DAG is left. The single-VM policy only
    /// releases free VMs; the others also stop busy ones.
    pub fn deprovision_resources(&self, ctx: &mut PolicyContext<'_>) -> Result<()> {
        let free: Vec<VmId> = ctx.engine.free_vms().iter().copied().collect();
        let busy: Vec<VmId> = ctx.engine.busy_vms().iter().copied().collect();
        info!(
            free = free.len(),
            busy = busy.len(),
            time = ctx.now,
            "deprovisioning fleet"
        );

        for vm in free {
            ctx.terminate(vm)?;
        }
        if matches!(self, Provisioner::SingleVm { .. }) {
            return Ok(());
        }
        for vm in busy {
            warn!(vm = %vm, "deprovisioning busy vm");
            ctx.terminate(vm)?;
        }
        Ok(())
    }
}
