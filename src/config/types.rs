//! Configuration type definitions.
//!
//! This module contains the type definitions for the YAML configuration:
//! executor sizing, the provisioning plugin's machine shape and the capacity
//! notation shared by both.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration (machina.yaml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachinaConfig {
    /// Worker pool settings.
    pub executor: ExecutorSection,
    /// Provisioning plugin settings.
    pub provisioning: ProvisioningSection,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Threads driving scheduling and deadline tracking.
    pub min_threads: Option<usize>,
    /// Maximum concurrent provisioning calls (default 64).
    pub max_threads: Option<usize>,
    /// Stagger between consecutive machine starts of one request.
    pub throttling_delay_secs: Option<u64>,
}

/// Provisioning plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningSection {
    /// Capacity of one machine.
    pub single_machine_capacity: CapacityConfig,
    /// Capacity on each machine that is not available to the grid.
    pub reserved_capacity_per_machine: CapacityConfig,
    /// Default placement zones.
    pub zones: Vec<String>,
    /// Whether machines may be started and stopped.
    pub start_machine_supported: bool,
    /// Simulated duration of a machine start, for dry runs.
    pub simulated_start_delay_ms: Option<u64>,
}

impl Default for ProvisioningSection {
    fn default() -> Self {
        Self {
            single_machine_capacity: CapacityConfig::default(),
            reserved_capacity_per_machine: CapacityConfig::default(),
            zones: Vec::new(),
            start_machine_supported: true,
            simulated_start_delay_ms: None,
        }
    }
}

/// Capacity notation.
///
/// ```yaml
/// memory_mb: 2048
/// cpu_cores: 1.5
/// machines: 2
/// drives:
///   /data: 10240
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityConfig {
    /// Memory in megabytes.
    pub memory_mb: Option<u64>,
    /// CPU cores, fractional values allowed down to millicores.
    pub cpu_cores: Option<f64>,
    /// Number of machines.
    pub machines: Option<u64>,
    /// Disk space in megabytes per drive or mount path.
    pub drives: BTreeMap<String, u64>,
}
