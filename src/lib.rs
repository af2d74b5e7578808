//! machina - capacity planning and non-blocking machine provisioning.
//!
//! The [`core`] module holds the capacity algebra: typed requirements,
//! multi-dimensional capacities and capacities keyed per agent or per zone.
//! The [`provisioning`] module wraps a blocking provisioning plugin so that
//! starting and stopping machines returns pollable futures, with the work
//! running on a bounded [`ProvisioningExecutor`].

pub mod config;
pub mod core;
pub mod execution;
pub mod provisioning;
pub mod testing;

pub use config::{
    CapacityConfig, ConfigError, ExecutorSection, MachinaConfig, MachinaConfigBuilder,
    ProvisioningSection, YamlLoader,
};
pub use crate::core::error::CapacityError;
pub use crate::core::per_key::{
    CapacityKey, CapacityRequirementsPerAgent, CapacityRequirementsPerKey,
    CapacityRequirementsPerZones,
};
pub use crate::core::requirement::{CapacityRequirement, CapacityRequirementType};
pub use crate::core::requirements::CapacityRequirements;
pub use crate::core::types::{AgentUid, ReservationId, ZonesConfig};
pub use execution::{ExecutorConfig, ProvisioningExecutor};
pub use provisioning::{
    FutureCleanupCloudResources, MAX_MACHINES_PER_REQUEST, FutureError, FutureGridServiceAgent, FutureGridServiceAgents,
    FutureStoppedMachine, GridServiceAgent, MachineProvisioning,
    NonBlockingMachineProvisioningAdapter, ProvisioningConfig, ProvisioningContext,
    ProvisioningError, ProvisioningFuture, calc_number_of_machines,
};
