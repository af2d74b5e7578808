//! Runtime configuration from YAML configuration.
//!
//! This module converts the parsed configuration sections into the types the
//! executor and the provisioning adapter run with.

use std::time::Duration;

use crate::core::requirement::{CapacityRequirement, MILLICORES_PER_CORE};
use crate::core::requirements::CapacityRequirements;
use crate::core::types::ZonesConfig;
use crate::execution::ExecutorConfig;
use crate::provisioning::ProvisioningConfig;

use super::error::ConfigError;
use super::types::{CapacityConfig, ExecutorSection, ProvisioningSection};

/// Builder for runtime configuration.
pub struct MachinaConfigBuilder;

impl MachinaConfigBuilder {
    /// Build the executor configuration, falling back to defaults.
    pub fn executor_config(section: &ExecutorSection) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            min_threads: section.min_threads.unwrap_or(defaults.min_threads),
            max_threads: section.max_threads.unwrap_or(defaults.max_threads),
            throttling_delay: section
                .throttling_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.throttling_delay),
        }
    }

    /// Build the provisioning plugin configuration.
    pub fn provisioning_config(
        section: &ProvisioningSection,
    ) -> Result<ProvisioningConfig, ConfigError> {
        let reserved = Self::capacity(&section.reserved_capacity_per_machine)?;
        Ok(ProvisioningConfig::new()
            .with_reserved_capacity(reserved)
            .with_zones(ZonesConfig::new(section.zones.iter().cloned())))
    }

    /// Build a capacity from its configuration notation.
    pub fn capacity(config: &CapacityConfig) -> Result<CapacityRequirements, ConfigError> {
        let mut requirements = Vec::new();

        if let Some(memory_mb) = config.memory_mb {
            requirements.push(CapacityRequirement::memory_mb(memory_mb));
        }
        if let Some(cores) = config.cpu_cores {
            requirements.push(CapacityRequirement::cpu_millicores(Self::millicores(cores)?));
        }
        if let Some(machines) = config.machines {
            requirements.push(CapacityRequirement::machines(machines));
        }
        for (path, megabytes) in &config.drives {
            if path.trim().is_empty() {
                return Err(ConfigError::InvalidConfig("drive path must not be empty".into()));
            }
            requirements.push(CapacityRequirement::drive_mb(path.clone(), *megabytes));
        }

        Ok(CapacityRequirements::new(requirements)?)
    }

    /// Convert fractional cores to millicores.
    fn millicores(cores: f64) -> Result<u64, ConfigError> {
        if !cores.is_finite() || cores < 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "cpu_cores must be a non-negative number, got {}",
                cores
            )));
        }
        let millicores = (cores * MILLICORES_PER_CORE as f64).round();
        if millicores > u64::MAX as f64 {
            return Err(ConfigError::InvalidConfig(format!(
                "cpu_cores is too large: {}",
                cores
            )));
        }
        Ok(millicores as u64)
    }
}
