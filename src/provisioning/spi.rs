//! The blocking machine provisioning SPI.
//!
//! A [`MachineProvisioning`] implementation talks to whatever actually creates
//! machines (a cloud API, a bare-metal pool, a test double). Its calls may be
//! slow and are allowed to block; the
//! [`NonBlockingMachineProvisioningAdapter`](super::NonBlockingMachineProvisioningAdapter)
//! runs them on a dedicated worker pool.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::core::requirements::CapacityRequirements;
use crate::core::types::{ReservationId, ZonesConfig};

use super::agent::GridServiceAgent;
use super::error::ProvisioningError;

/// Static configuration of a provisioning plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Capacity on every machine that is not available to grid containers
    /// (operating system, agent overhead).
    pub reserved_capacity_per_machine: CapacityRequirements,
    /// Zones used when a start request does not name any.
    pub zones: ZonesConfig,
}

impl ProvisioningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the reserved capacity per machine.
    pub fn with_reserved_capacity(mut self, reserved: CapacityRequirements) -> Self {
        self.reserved_capacity_per_machine = reserved;
        self
    }

    /// Builder: set the default zones.
    pub fn with_zones(mut self, zones: ZonesConfig) -> Self {
        self.zones = zones;
        self
    }
}

/// Per-call context handed to the provisioning plugin.
///
/// The cancellation token fires when the caller's deadline passes or the
/// executor shuts down. Plugins that poll it can abandon slow calls early;
/// plugins that ignore it keep running until the underlying call returns.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    timeout: Duration,
    deadline: Instant,
    cancellation: CancellationToken,
}

impl ProvisioningContext {
    /// Context for a call that must finish within `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self::with_deadline(timeout, Instant::now() + timeout, CancellationToken::new())
    }

    pub(crate) fn with_deadline(
        timeout: Duration,
        deadline: Instant,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            timeout,
            deadline,
            cancellation,
        }
    }

    /// The timeout requested by the caller.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The instant after which the caller stops waiting.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Check if the caller no longer needs the result.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Blocking machine provisioning plugin.
///
/// Implementations are invoked concurrently from several worker threads and
/// must therefore be stateless or internally synchronized.
pub trait MachineProvisioning: Send + Sync {
    /// Start a machine with a grid service agent on it.
    ///
    /// All machines started by one request share `reservation_id`, so they
    /// can be correlated and torn down together.
    fn start_machine(
        &self,
        ctx: &ProvisioningContext,
        zones: &ZonesConfig,
        reservation_id: ReservationId,
    ) -> Result<GridServiceAgent, ProvisioningError>;

    /// Stop the machine the agent runs on. Returns `false` if the machine
    /// was not found.
    fn stop_machine(
        &self,
        ctx: &ProvisioningContext,
        agent: &GridServiceAgent,
    ) -> Result<bool, ProvisioningError>;

    /// Agents on machines the plugin already knows about.
    fn discovered_machines(
        &self,
        ctx: &ProvisioningContext,
    ) -> Result<Vec<GridServiceAgent>, ProvisioningError>;

    /// Capacity of one machine started by this plugin.
    fn capacity_of_single_machine(&self) -> CapacityRequirements;

    /// Check if the plugin can start and stop machines at all.
    fn is_start_machine_supported(&self) -> bool;

    fn config(&self) -> &ProvisioningConfig;

    /// Release provider-side resources (security groups, key pairs, volumes)
    /// left behind by this plugin.
    fn cleanup_cloud_resources(&self, _ctx: &ProvisioningContext) -> Result<(), ProvisioningError> {
        Ok(())
    }
}
