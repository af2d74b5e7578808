//! Machine provisioning.
//!
//! This module defines the blocking provisioning SPI, the futures handed out
//! for asynchronous operations, and the adapter that connects the two.

mod adapter;
mod agent;
mod error;
mod future;
mod spi;

pub use adapter::{
    MAX_MACHINES_PER_REQUEST, NonBlockingMachineProvisioningAdapter, calc_number_of_machines,
};
pub use agent::GridServiceAgent;
pub use error::{FutureError, ProvisioningError};
pub(crate) use future::FutureCompleter;
pub use future::{
    FutureCleanupCloudResources, FutureGridServiceAgent, FutureGridServiceAgents,
    FutureStoppedMachine, ProvisioningFuture,
};
pub use spi::{MachineProvisioning, ProvisioningConfig, ProvisioningContext};
