//! Testing utilities for users of the machina library.
//!
//! This module provides helpers for testing code that provisions machines:
//!
//! - [`FakeMachineProvisioning`]: An in-memory provisioning plugin with
//!   configurable delays, failures and panics
//! - [`wait_all`]: Waits for a batch of provisioning futures

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::{ConfigError, MachinaConfigBuilder, ProvisioningSection};
use crate::core::requirements::CapacityRequirements;
use crate::core::types::{AgentUid, ReservationId, ZonesConfig};
use crate::provisioning::{
    FutureError, GridServiceAgent, MachineProvisioning, ProvisioningConfig, ProvisioningContext,
    ProvisioningError, ProvisioningFuture,
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An in-memory machine provisioning plugin.
///
/// Started machines get agents named `agent-<n>` on host `10.0.0.<n>` and are
/// tracked until stopped. Delays honor the context's cancellation token, so
/// a start that outlives its deadline fails with
/// [`ProvisioningError::Interrupted`] unless
/// [`ignore_cancellation`](Self::ignore_cancellation) is set.
///
/// # Example
///
/// ```
/// use machina::testing::FakeMachineProvisioning;
/// use machina::{CapacityRequirement, CapacityRequirements};
///
/// let fake = FakeMachineProvisioning::new(CapacityRequirements::from_requirement(
///     CapacityRequirement::memory_mb(2048),
/// ))
/// .with_zones(["zone-a"]);
///
/// assert_eq!(fake.start_calls(), 0);
/// assert!(fake.running_agents().is_empty());
/// ```
pub struct FakeMachineProvisioning {
    single_machine: CapacityRequirements,
    config: ProvisioningConfig,
    start_supported: bool,
    start_delay: Duration,
    ignore_cancellation: bool,
    panic_on_start: bool,
    start_failures: Mutex<VecDeque<ProvisioningError>>,
    stop_failure: Option<ProvisioningError>,
    discovered: Vec<GridServiceAgent>,
    running: Mutex<BTreeMap<AgentUid, GridServiceAgent>>,
    next_machine: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
}

impl FakeMachineProvisioning {
    /// Create a plugin whose machines each have `single_machine` capacity.
    pub fn new(single_machine: CapacityRequirements) -> Self {
        Self {
            single_machine,
            config: ProvisioningConfig::new(),
            start_supported: true,
            start_delay: Duration::ZERO,
            ignore_cancellation: false,
            panic_on_start: false,
            start_failures: Mutex::new(VecDeque::new()),
            stop_failure: None,
            discovered: Vec::new(),
            running: Mutex::new(BTreeMap::new()),
            next_machine: AtomicUsize::new(1),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
        }
    }

    /// Create a plugin from the provisioning section of a configuration.
    pub fn from_config(section: &ProvisioningSection) -> Result<Self, ConfigError> {
        let single_machine = MachinaConfigBuilder::capacity(&section.single_machine_capacity)?;
        let config = MachinaConfigBuilder::provisioning_config(section)?;
        let mut fake = Self::new(single_machine).with_start_supported(section.start_machine_supported);
        fake.config = config;
        if let Some(delay_ms) = section.simulated_start_delay_ms {
            fake.start_delay = Duration::from_millis(delay_ms);
        }
        Ok(fake)
    }

    /// Builder: set the reserved capacity per machine.
    pub fn with_reserved(mut self, reserved: CapacityRequirements) -> Self {
        self.config = self.config.with_reserved_capacity(reserved);
        self
    }

    /// Builder: set the configured zones.
    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_zones(ZonesConfig::new(zones));
        self
    }

    /// Builder: set whether machines can be started.
    pub fn with_start_supported(mut self, supported: bool) -> Self {
        self.start_supported = supported;
        self
    }

    /// Builder: make every start take `delay`.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Builder: keep sleeping through the start delay after the caller gave
    /// up, like a plugin blocked in a call it cannot abort.
    pub fn ignore_cancellation(mut self) -> Self {
        self.ignore_cancellation = true;
        self
    }

    /// Builder: fail the next start with `error`. Queued failures are used
    /// in order, one per start call.
    pub fn with_start_failure(self, error: ProvisioningError) -> Self {
        self.start_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
        self
    }

    /// Builder: fail every stop with `error`.
    pub fn with_stop_failure(mut self, error: ProvisioningError) -> Self {
        self.stop_failure = Some(error);
        self
    }

    /// Builder: panic inside every start call.
    pub fn panic_on_start(mut self) -> Self {
        self.panic_on_start = true;
        self
    }

    /// Builder: report `agent` from machine discovery.
    pub fn with_discovered(mut self, agent: GridServiceAgent) -> Self {
        self.discovered.push(agent);
        self
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    /// Agents on machines started and not yet stopped.
    pub fn running_agents(&self) -> Vec<GridServiceAgent> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn sleep(&self, ctx: &ProvisioningContext, duration: Duration) -> Result<(), ProvisioningError> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if ctx.is_cancelled() && !self.ignore_cancellation {
                return Err(ProvisioningError::Interrupted(
                    "machine start abandoned by caller".into(),
                ));
            }
            let step = remaining.min(POLL_INTERVAL);
            std::thread::sleep(step);
            remaining -= step;
        }
        Ok(())
    }
}

impl MachineProvisioning for FakeMachineProvisioning {
    fn start_machine(
        &self,
        ctx: &ProvisioningContext,
        zones: &ZonesConfig,
        reservation_id: ReservationId,
    ) -> Result<GridServiceAgent, ProvisioningError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        if self.panic_on_start {
            panic!("fake provisioning failure");
        }
        self.sleep(ctx, self.start_delay)?;

        let failure = self
            .start_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let n = self.next_machine.fetch_add(1, Ordering::SeqCst);
        let agent = GridServiceAgent::new(format!("agent-{}", n), format!("10.0.0.{}", n))
            .with_zones(zones.clone())
            .with_reservation_id(reservation_id);
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent.uid().clone(), agent.clone());
        Ok(agent)
    }

    fn stop_machine(
        &self,
        _ctx: &ProvisioningContext,
        agent: &GridServiceAgent,
    ) -> Result<bool, ProvisioningError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.stop_failure {
            return Err(error.clone());
        }
        Ok(self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent.uid())
            .is_some())
    }

    fn discovered_machines(
        &self,
        _ctx: &ProvisioningContext,
    ) -> Result<Vec<GridServiceAgent>, ProvisioningError> {
        let mut agents = self.discovered.clone();
        agents.extend(self.running_agents());
        Ok(agents)
    }

    fn capacity_of_single_machine(&self) -> CapacityRequirements {
        self.single_machine.clone()
    }

    fn is_start_machine_supported(&self) -> bool {
        self.start_supported
    }

    fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    fn cleanup_cloud_resources(&self, _ctx: &ProvisioningContext) -> Result<(), ProvisioningError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wait for every future of a batch, preserving order.
pub async fn wait_all<T: Clone>(futures: &[ProvisioningFuture<T>]) -> Vec<Result<T, FutureError>> {
    let mut results = Vec::with_capacity(futures.len());
    for future in futures {
        results.push(future.wait().await);
    }
    results
}
