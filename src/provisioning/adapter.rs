//! Non-blocking facade over a blocking [`MachineProvisioning`] plugin.
//!
//! Every operation returns immediately. The blocking plugin call runs on the
//! [`ProvisioningExecutor`] and its outcome is published through a
//! [`ProvisioningFuture`](super::ProvisioningFuture) that the caller polls.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::CapacityError;
use crate::core::per_key::CapacityRequirementsPerZones;
use crate::core::requirement::CapacityRequirementType;
use crate::core::requirements::CapacityRequirements;
use crate::core::types::{ReservationId, ZonesConfig};
use crate::execution::ProvisioningExecutor;
use crate::execution::executor::panic_message;

use super::agent::GridServiceAgent;
use super::error::ProvisioningError;
use super::future::{
    FutureCleanupCloudResources, FutureGridServiceAgent, FutureGridServiceAgents,
    FutureStoppedMachine,
};
use super::spi::{MachineProvisioning, ProvisioningConfig};

/// Most machines a single start request may ask for.
pub const MAX_MACHINES_PER_REQUEST: u64 = 10_000;

/// Number of machines needed to provide `required` capacity.
///
/// Starts from the requested number of machines (at least one), then raises
/// the count until every other requested dimension is covered by the net
/// capacity of that many machines. The net capacity of a machine is its
/// capacity minus `reserved` per machine. Dimensions a machine does not
/// provide at all are ignored.
///
/// Counts above [`MAX_MACHINES_PER_REQUEST`] are rejected with
/// [`CapacityError::TooManyMachines`].
pub fn calc_number_of_machines(
    required: &CapacityRequirements,
    single_machine: &CapacityRequirements,
    reserved: &CapacityRequirements,
) -> Result<u64, CapacityError> {
    let net = single_machine.subtract_or_zero(reserved);
    let mut machines = required
        .requirement(&CapacityRequirementType::NumberOfMachines)
        .amount()
        .max(1);

    for requirement in required.requirements() {
        if requirement.requirement_type() == &CapacityRequirementType::NumberOfMachines {
            continue;
        }
        let per_machine = net.requirement(requirement.requirement_type());
        if per_machine.is_zero() {
            tracing::debug!(
                requirement = %requirement,
                "Single machine provides no net capacity of this type, ignoring"
            );
            continue;
        }
        machines = machines.max(requirement.div_ceil(&per_machine)?);
    }

    if machines > MAX_MACHINES_PER_REQUEST {
        return Err(CapacityError::TooManyMachines {
            required: machines,
            limit: MAX_MACHINES_PER_REQUEST,
        });
    }
    Ok(machines)
}

/// Turns a blocking provisioning plugin into future-returning operations.
pub struct NonBlockingMachineProvisioningAdapter {
    provisioning: Arc<dyn MachineProvisioning>,
    executor: Arc<ProvisioningExecutor>,
}

impl NonBlockingMachineProvisioningAdapter {
    pub fn new(
        provisioning: Arc<dyn MachineProvisioning>,
        executor: Arc<ProvisioningExecutor>,
    ) -> Self {
        Self {
            provisioning,
            executor,
        }
    }

    /// Check if the plugin can start and stop machines.
    pub fn is_start_machine_supported(&self) -> bool {
        self.provisioning.is_start_machine_supported()
    }

    pub fn config(&self) -> &ProvisioningConfig {
        self.provisioning.config()
    }

    pub fn capacity_of_single_machine(&self) -> CapacityRequirements {
        self.provisioning.capacity_of_single_machine()
    }

    /// Number of machines this plugin must start to provide `capacity`.
    pub fn number_of_machines(&self, capacity: &CapacityRequirements) -> Result<u64, CapacityError> {
        calc_number_of_machines(
            capacity,
            &self.provisioning.capacity_of_single_machine(),
            &self.provisioning.config().reserved_capacity_per_machine,
        )
    }

    fn ensure_start_machine_supported(&self, operation: &str) -> Result<(), ProvisioningError> {
        if !self.provisioning.is_start_machine_supported() {
            return Err(ProvisioningError::Unsupported(format!(
                "{} is not supported by this machine provisioning",
                operation
            )));
        }
        Ok(())
    }

    /// Start enough machines to provide `capacity`.
    ///
    /// Returns one future per machine. All machines share a freshly generated
    /// reservation id. Each future's deadline is its throttling delay plus
    /// `timeout` from now. When `zones` is empty the plugin's configured
    /// zones are used.
    pub fn start_machines_async(
        &self,
        capacity: &CapacityRequirements,
        zones: &ZonesConfig,
        timeout: Duration,
    ) -> Result<Vec<FutureGridServiceAgent>, ProvisioningError> {
        self.ensure_start_machine_supported("start machine")?;

        let number_of_machines = self.number_of_machines(capacity)?;
        let zones = if zones.is_empty() {
            self.provisioning.config().zones.clone()
        } else {
            zones.clone()
        };
        let reservation_id = ReservationId::new();

        tracing::info!(
            reservation_id = %reservation_id,
            capacity = %capacity,
            zones = %zones,
            number_of_machines,
            "Starting machines"
        );

        let mut futures = Vec::new();
        for index in 0..number_of_machines {
            let provisioning = Arc::clone(&self.provisioning);
            let zones = zones.clone();
            let future = self.executor.submit(
                "start machine",
                usize::try_from(index).unwrap_or(usize::MAX),
                timeout,
                move |ctx| {
                    let agent = provisioning
                        .start_machine(ctx, &zones, reservation_id)
                        .inspect_err(|err| {
                            tracing::warn!(
                                reservation_id = %reservation_id,
                                error = %err,
                                "Failed to start machine"
                            );
                        })?;
                    tracing::info!(
                        reservation_id = %reservation_id,
                        agent = %agent,
                        "Machine started"
                    );
                    Ok(agent.with_reservation_id(reservation_id))
                },
            )?;
            futures.push(future);
        }
        Ok(futures)
    }

    /// Start machines for every zone set in `capacity_per_zones`.
    ///
    /// Each zone set is planned and started independently, so each gets its
    /// own reservation id.
    pub fn start_machines_per_zones_async(
        &self,
        capacity_per_zones: &CapacityRequirementsPerZones,
        timeout: Duration,
    ) -> Result<Vec<FutureGridServiceAgent>, ProvisioningError> {
        self.ensure_start_machine_supported("start machine")?;

        // Plan every zone set before submitting anything.
        for (_, capacity) in capacity_per_zones.iter() {
            self.number_of_machines(capacity)?;
        }

        let mut futures = Vec::new();
        for (zones, capacity) in capacity_per_zones.iter() {
            futures.extend(self.start_machines_async(capacity, zones, timeout)?);
        }
        Ok(futures)
    }

    /// Stop the machine the agent runs on, best effort.
    ///
    /// Plugin failures and panics are logged and never surface: the returned
    /// future resolves to `false` when the stop call failed. The future still
    /// follows the common deadline contract, so it reports
    /// [`FutureError::TimedOut`](super::FutureError::TimedOut) if no worker
    /// picked the stop up in time, and an interruption if the executor shut
    /// down first. Callers that do not care about the outcome may drop it.
    pub fn stop_machine_async(
        &self,
        agent: GridServiceAgent,
        timeout: Duration,
    ) -> Result<FutureStoppedMachine, ProvisioningError> {
        self.ensure_start_machine_supported("stop machine")?;

        let provisioning = Arc::clone(&self.provisioning);
        self.executor.submit("stop machine", 0, timeout, move |ctx| {
            let outcome = catch_unwind(AssertUnwindSafe(|| provisioning.stop_machine(ctx, &agent)));
            match outcome {
                Ok(Ok(true)) => {
                    tracing::info!(agent = %agent, "Machine stopped");
                    Ok(true)
                }
                Ok(Ok(false)) => {
                    tracing::info!(agent = %agent, "Machine to stop was not found");
                    Ok(false)
                }
                Ok(Err(err)) => {
                    tracing::warn!(agent = %agent, error = %err, "Failed to stop machine");
                    Ok(false)
                }
                Err(payload) => {
                    tracing::error!(
                        agent = %agent,
                        error = %panic_message(payload),
                        "Unexpected failure while stopping machine"
                    );
                    Ok(false)
                }
            }
        })
    }

    /// Agents on machines the plugin already knows about.
    pub fn discovered_machines_async(
        &self,
        timeout: Duration,
    ) -> Result<FutureGridServiceAgents, ProvisioningError> {
        let provisioning = Arc::clone(&self.provisioning);
        self.executor
            .submit("discover machines", 0, timeout, move |ctx| {
                provisioning.discovered_machines(ctx)
            })
    }

    /// Release provider-side resources left behind by the plugin.
    pub fn cleanup_cloud_resources_async(
        &self,
        timeout: Duration,
    ) -> Result<FutureCleanupCloudResources, ProvisioningError> {
        let provisioning = Arc::clone(&self.provisioning);
        self.executor
            .submit("cleanup cloud resources", 0, timeout, move |ctx| {
                provisioning.cleanup_cloud_resources(ctx)
            })
    }

    /// Shut down the executor. Outstanding futures resolve as interrupted.
    pub fn destroy(&self) {
        self.executor.shutdown();
    }
}
