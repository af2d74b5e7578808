//! YAML configuration parsing.
//!
//! Parses the executor and provisioning configuration from YAML files and
//! applies environment overrides.

use std::path::Path;

use crate::execution::MAX_THREADS_ENV;

use super::builder::MachinaConfigBuilder;
use super::error::ConfigError;
use super::types::MachinaConfig;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load configuration from a file, applying environment overrides.
    pub fn load_config(path: impl AsRef<Path>) -> Result<MachinaConfig, ConfigError> {
        Self::load_config_with_env(path, |var| std::env::var(var).ok())
    }

    /// Load configuration from a file, reading overrides through `lookup`.
    pub fn load_config_with_env<F>(
        path: impl AsRef<Path>,
        lookup: F,
    ) -> Result<MachinaConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MachinaConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::apply_env_overrides(config, lookup)?;
        Self::validate_config(&config)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Environment overrides are not applied.
    pub fn parse_config(yaml: &str) -> Result<MachinaConfig, ConfigError> {
        let config: MachinaConfig = serde_yaml::from_str(yaml)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(
        mut config: MachinaConfig,
        lookup: F,
    ) -> Result<MachinaConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MAX_THREADS_ENV) {
            let max_threads = value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
                var: MAX_THREADS_ENV.to_string(),
                value: value.clone(),
            })?;
            tracing::debug!(max_threads, "Overriding max_threads from environment");
            config.executor.max_threads = Some(max_threads);
        }
        Ok(config)
    }

    /// Validate a configuration.
    fn validate_config(config: &MachinaConfig) -> Result<(), ConfigError> {
        let executor = &config.executor;

        if executor.max_threads == Some(0) {
            return Err(ConfigError::InvalidConfig("max_threads cannot be zero".into()));
        }
        if executor.min_threads == Some(0) {
            return Err(ConfigError::InvalidConfig("min_threads cannot be zero".into()));
        }
        if let (Some(min), Some(max)) = (executor.min_threads, executor.max_threads)
            && min > max
        {
            return Err(ConfigError::InvalidConfig(format!(
                "min_threads ({}) cannot exceed max_threads ({})",
                min, max
            )));
        }

        let provisioning = &config.provisioning;
        let single = MachinaConfigBuilder::capacity(&provisioning.single_machine_capacity)?;
        if provisioning.start_machine_supported && single.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "single_machine_capacity is required when start_machine_supported is set".into(),
            ));
        }
        MachinaConfigBuilder::capacity(&provisioning.reserved_capacity_per_machine)?;

        if provisioning.zones.iter().any(|zone| zone.trim().is_empty()) {
            return Err(ConfigError::InvalidConfig("zone names cannot be empty".into()));
        }

        Ok(())
    }
}
