//! Common test utilities shared across integration tests.

use machina::testing::FakeMachineProvisioning;
use machina::{
    CapacityRequirement, CapacityRequirements, ExecutorConfig,
    NonBlockingMachineProvisioningAdapter, ProvisioningExecutor, ProvisioningFuture,
};
use std::sync::Arc;
use std::time::Duration;

/// Wait for a future to report done, polling it.
///
/// Exercises the polling contract rather than `wait()`. Polls every 10ms and
/// times out after the specified duration.
///
/// # Panics
///
/// Panics if the timeout is reached before the future is done.
pub async fn wait_until_done<T>(future: &ProvisioningFuture<T>, timeout: Duration) {
    let start = tokio::time::Instant::now();
    while !future.is_done() {
        if start.elapsed() > timeout {
            panic!("Timeout waiting for future to complete: {:?}", future);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A capacity of `megabytes` memory.
pub fn memory(megabytes: u64) -> CapacityRequirements {
    CapacityRequirements::from_requirement(CapacityRequirement::memory_mb(megabytes))
}

/// An adapter over `provisioning` with a fresh executor.
pub fn adapter(
    provisioning: Arc<FakeMachineProvisioning>,
    config: ExecutorConfig,
) -> NonBlockingMachineProvisioningAdapter {
    let executor = Arc::new(ProvisioningExecutor::new(config).unwrap());
    NonBlockingMachineProvisioningAdapter::new(provisioning, executor)
}
