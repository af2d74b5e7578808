//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the provisioning executor
//! and the provisioning plugin.

mod builder;
mod error;
mod types;
mod yaml;

pub use crate::execution::MAX_THREADS_ENV;
pub use builder::MachinaConfigBuilder;
pub use error::ConfigError;
pub use types::{CapacityConfig, ExecutorSection, MachinaConfig, ProvisioningSection};
pub use yaml::YamlLoader;
