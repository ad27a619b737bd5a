use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Scheduling/provisioning policy driving a simulation run.
///
/// - `Ebpsm`: budget-constrained EFT-ordered placement with budget
///   redistribution (default).
/// - `Mslbl`: EST-ordered placement with uniform fractional budgets.
/// - `Fastest`: one fastest VM per task, no budget awareness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    #[default]
    Ebpsm,
    Mslbl,
    Fastest,
}

impl FromStr for AlgorithmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ebpsm" => Ok(AlgorithmKind::Ebpsm),
            "mslbl" => Ok(AlgorithmKind::Mslbl),
            "fastest" => Ok(AlgorithmKind::Fastest),
            other => Err(format!(
                "invalid algorithm: {other} (expected \"ebpsm\", \"mslbl\" or \"fastest\")"
            )),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::Ebpsm => "ebpsm",
            AlgorithmKind::Mslbl => "mslbl",
            AlgorithmKind::Fastest => "fastest",
        };
        f.write_str(name)
    }
}

/// Where task input/output files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Transfers take no time.
    #[default]
    Void,
    /// A shared store reached with fixed read/write bandwidth.
    Global,
}

/// Per-VM file cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Every file read or written by a VM stays cached on it.
    #[default]
    Unlimited,
    /// Nothing is ever cached.
    Void,
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Monotonic per simulation; a retry is a new job with a new id.
    JobId,
    "job"
);
id_type!(VmId, "vm");
id_type!(
    /// One live execution instance of a DAG.
    DagJobId,
    "dagjob"
);
