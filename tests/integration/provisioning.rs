//! Non-blocking provisioning integration tests.
//!
//! Tests that start, stop and discover machines through the adapter against
//! the in-memory provisioning plugin.

use machina::testing::{FakeMachineProvisioning, wait_all};
use machina::{
    CapacityError, CapacityRequirement, CapacityRequirements, CapacityRequirementsPerZones,
    ExecutorConfig, FutureError, GridServiceAgent, MAX_MACHINES_PER_REQUEST, ProvisioningError,
    ZonesConfig,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{adapter, memory, wait_until_done};

const TIMEOUT: Duration = Duration::from_secs(5);

fn fake() -> FakeMachineProvisioning {
    FakeMachineProvisioning::new(memory(2048)).with_zones(["zone-a"])
}

#[tokio::test]
async fn test_start_two_machines() {
    let provisioning = Arc::new(fake());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(4096), &ZonesConfig::any(), TIMEOUT)
        .unwrap();
    assert_eq!(futures.len(), 2);

    for future in &futures {
        wait_until_done(future, TIMEOUT).await;
        assert!(!future.is_timed_out());
        assert!(future.exception().is_none());
    }

    let agents: Vec<GridServiceAgent> = futures.iter().map(|f| f.get().unwrap()).collect();
    let uids: BTreeSet<_> = agents.iter().map(|a| a.uid().clone()).collect();
    assert_eq!(uids.len(), 2);

    let reservation = agents[0].reservation_id().copied();
    assert!(reservation.is_some());
    assert_eq!(agents[1].reservation_id().copied(), reservation);

    // Empty zones fall back to the configured zones.
    assert!(agents.iter().all(|a| a.zones().contains("zone-a")));
    assert_eq!(provisioning.start_calls(), 2);
    assert_eq!(provisioning.running_agents().len(), 2);
}

#[tokio::test]
async fn test_requested_zones_are_used() {
    let provisioning = Arc::new(fake());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::new(["zone-b"]), TIMEOUT)
        .unwrap();

    let agent = futures[0].wait().await.unwrap();
    assert_eq!(agent.zones(), &ZonesConfig::new(["zone-b"]));
}

#[tokio::test]
async fn test_start_timeout() {
    let provisioning = Arc::new(
        fake()
            .with_start_delay(Duration::from_secs(2))
            .ignore_cancellation(),
    );
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());
    let timeout = Duration::from_millis(100);

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), timeout)
        .unwrap();
    let future = &futures[0];

    assert!(!future.is_done());
    assert_eq!(future.get(), Err(FutureError::NotDone));

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(future.is_timed_out());
    assert!(future.is_done());
    assert_eq!(future.get(), Err(FutureError::TimedOut(timeout)));
    assert_eq!(future.exception(), Some(FutureError::TimedOut(timeout)));
}

#[tokio::test]
async fn test_late_result_is_still_returned() {
    let provisioning = Arc::new(
        fake()
            .with_start_delay(Duration::from_millis(300))
            .ignore_cancellation(),
    );
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), Duration::from_millis(50))
        .unwrap();
    let future = &futures[0];

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(future.is_timed_out());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!future.is_timed_out());
    let agent = future.get().unwrap();
    assert_eq!(provisioning.running_agents(), vec![agent]);
}

#[tokio::test]
async fn test_cooperative_plugin_abandons_late_start() {
    let provisioning = Arc::new(fake().with_start_delay(Duration::from_secs(30)));
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), Duration::from_millis(50))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(matches!(
        futures[0].get(),
        Err(FutureError::Execution(ProvisioningError::Interrupted(_)))
    ));
    assert!(provisioning.running_agents().is_empty());
}

#[tokio::test]
async fn test_saturated_pool_times_out_queued_start() {
    let provisioning = Arc::new(
        fake()
            .with_start_delay(Duration::from_secs(2))
            .ignore_cancellation(),
    );
    let adapter = adapter(
        Arc::clone(&provisioning),
        ExecutorConfig::default().with_max_threads(1),
    );
    let timeout = Duration::from_millis(100);

    let futures = adapter
        .start_machines_async(&memory(4096), &ZonesConfig::any(), timeout)
        .unwrap();
    assert_eq!(futures.len(), 2);

    tokio::time::sleep(Duration::from_millis(300)).await;

    for future in &futures {
        assert!(future.is_timed_out());
        assert_eq!(future.get(), Err(FutureError::TimedOut(timeout)));
        assert_eq!(future.exception(), Some(FutureError::TimedOut(timeout)));
    }
    // The queued start never reached the plugin.
    assert_eq!(provisioning.start_calls(), 1);
}

#[tokio::test]
async fn test_start_failure_is_reported_per_machine() {
    let provisioning = Arc::new(
        fake().with_start_failure(ProvisioningError::MachineProvisioning("quota exceeded".into())),
    );
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(4096), &ZonesConfig::any(), TIMEOUT)
        .unwrap();
    let results = wait_all(&futures).await;

    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(FutureError::Execution(ProvisioningError::MachineProvisioning(m))) if m == "quota exceeded"
    )));
}

#[tokio::test]
async fn test_plugin_panic_becomes_unexpected_error() {
    let provisioning = Arc::new(fake().panic_on_start());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), TIMEOUT)
        .unwrap();

    assert!(matches!(
        futures[0].wait().await,
        Err(FutureError::Execution(ProvisioningError::Unexpected(_)))
    ));
}

#[tokio::test]
async fn test_unsupported_start_fails_eagerly() {
    let provisioning = Arc::new(fake().with_start_supported(false));
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let result = adapter.start_machines_async(&memory(1024), &ZonesConfig::any(), TIMEOUT);
    assert!(matches!(result, Err(ProvisioningError::Unsupported(_))));

    let stop = adapter.stop_machine_async(GridServiceAgent::new("a", "10.0.0.9"), TIMEOUT);
    assert!(matches!(stop, Err(ProvisioningError::Unsupported(_))));

    assert_eq!(provisioning.start_calls(), 0);
    assert_eq!(provisioning.stop_calls(), 0);
}

#[tokio::test]
async fn test_stop_machine() {
    let provisioning = Arc::new(fake());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let futures = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), TIMEOUT)
        .unwrap();
    let agent = futures[0].wait().await.unwrap();

    let stopped = adapter.stop_machine_async(agent.clone(), TIMEOUT).unwrap();
    assert_eq!(stopped.wait().await, Ok(true));
    assert!(provisioning.running_agents().is_empty());

    let again = adapter.stop_machine_async(agent, TIMEOUT).unwrap();
    assert_eq!(again.wait().await, Ok(false));
}

#[tokio::test]
async fn test_stop_failure_is_swallowed() {
    let provisioning = Arc::new(
        fake().with_stop_failure(ProvisioningError::AgentProvisioning("agent unreachable".into())),
    );
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let stopped = adapter
        .stop_machine_async(GridServiceAgent::new("agent-9", "10.0.0.9"), TIMEOUT)
        .unwrap();

    assert_eq!(stopped.wait().await, Ok(false));
    assert!(stopped.exception().is_none());
    assert_eq!(provisioning.stop_calls(), 1);
}

#[tokio::test]
async fn test_stop_past_deadline_reports_timeout() {
    let provisioning = Arc::new(
        fake()
            .with_start_delay(Duration::from_secs(2))
            .ignore_cancellation(),
    );
    let adapter = adapter(
        Arc::clone(&provisioning),
        ExecutorConfig::default().with_max_threads(1),
    );
    let timeout = Duration::from_millis(100);

    let _start = adapter
        .start_machines_async(&memory(1024), &ZonesConfig::any(), TIMEOUT)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(provisioning.start_calls(), 1);

    let stopped = adapter
        .stop_machine_async(GridServiceAgent::new("agent-9", "10.0.0.9"), timeout)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(stopped.is_timed_out());
    assert_eq!(stopped.get(), Err(FutureError::TimedOut(timeout)));
    assert_eq!(provisioning.stop_calls(), 0);

    adapter.destroy();
    assert!(matches!(
        adapter.stop_machine_async(GridServiceAgent::new("agent-9", "10.0.0.9"), timeout),
        Err(ProvisioningError::ExecutorShutdown)
    ));
}

#[tokio::test]
async fn test_discovered_machines() {
    let provisioning =
        Arc::new(fake().with_discovered(GridServiceAgent::new("existing", "10.1.0.1")));
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let discovered = adapter.discovered_machines_async(TIMEOUT).unwrap();

    let agents = discovered.wait().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].uid().as_str(), "existing");
}

#[tokio::test]
async fn test_cleanup_cloud_resources() {
    let provisioning = Arc::new(fake());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let cleanup = adapter.cleanup_cloud_resources_async(TIMEOUT).unwrap();

    assert_eq!(cleanup.wait().await, Ok(()));
    assert_eq!(provisioning.cleanup_calls(), 1);
}

#[tokio::test]
async fn test_start_per_zones() {
    let provisioning = Arc::new(fake());
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());
    let per_zones = CapacityRequirementsPerZones::new()
        .add(ZonesConfig::new(["zone-a"]), &memory(4096))
        .unwrap()
        .add(ZonesConfig::new(["zone-b"]), &memory(1024))
        .unwrap();

    let futures = adapter.start_machines_per_zones_async(&per_zones, TIMEOUT).unwrap();
    assert_eq!(futures.len(), 3);

    let agents: Vec<_> = wait_all(&futures)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let in_b: Vec<_> = agents.iter().filter(|a| a.zones().contains("zone-b")).collect();
    assert_eq!(in_b.len(), 1);

    let reservations: BTreeSet<_> = agents
        .iter()
        .filter_map(|a| a.reservation_id().map(|r| r.to_string()))
        .collect();
    assert_eq!(reservations.len(), 2);
}

#[tokio::test]
async fn test_throttling_staggers_starts() {
    let provisioning = Arc::new(fake());
    let config = ExecutorConfig::default().with_throttling_delay(Duration::from_millis(50));
    let adapter = adapter(Arc::clone(&provisioning), config);
    let submitted = Instant::now();

    let futures = adapter
        .start_machines_async(&memory(3 * 2048), &ZonesConfig::any(), TIMEOUT)
        .unwrap();

    assert_eq!(futures.len(), 3);
    assert!(futures[2].deadline() >= submitted + Duration::from_millis(100) + TIMEOUT);
    for result in wait_all(&futures).await {
        assert!(result.is_ok());
    }
    assert!(submitted.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_machine_count_uses_reserved_capacity() {
    let provisioning = Arc::new(fake().with_reserved(memory(48)));
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());
    let required = CapacityRequirements::new([
        CapacityRequirement::memory_mb(4096),
        CapacityRequirement::cpu_cores(8),
    ])
    .unwrap();

    // The fake machines provide no CPU, so only memory counts.
    assert_eq!(adapter.number_of_machines(&required), Ok(3));
}

#[tokio::test]
async fn test_oversized_capacity_is_rejected_before_submitting() {
    let provisioning = Arc::new(FakeMachineProvisioning::new(memory(1)));
    let adapter = adapter(Arc::clone(&provisioning), ExecutorConfig::default());

    let result = adapter.start_machines_async(&memory(u64::MAX), &ZonesConfig::any(), TIMEOUT);

    assert!(matches!(
        result,
        Err(ProvisioningError::Capacity(CapacityError::TooManyMachines {
            limit: MAX_MACHINES_PER_REQUEST,
            ..
        }))
    ));

    // One oversized zone set fails the whole request.
    let per_zones = CapacityRequirementsPerZones::new()
        .add(ZonesConfig::new(["zone-a"]), &memory(2))
        .unwrap()
        .add(ZonesConfig::new(["zone-b"]), &memory(u64::MAX))
        .unwrap();
    assert!(matches!(
        adapter.start_machines_per_zones_async(&per_zones, TIMEOUT),
        Err(ProvisioningError::Capacity(CapacityError::TooManyMachines { .. }))
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provisioning.start_calls(), 0);
}

#[tokio::test]
async fn test_destroy_interrupts_outstanding_starts() {
    let provisioning = Arc::new(fake().with_start_delay(Duration::from_secs(30)));
    let adapter = adapter(
        Arc::clone(&provisioning),
        ExecutorConfig::default().with_max_threads(1),
    );

    let futures = adapter
        .start_machines_async(&memory(4096), &ZonesConfig::any(), TIMEOUT)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    adapter.destroy();

    for result in wait_all(&futures).await {
        assert!(
            matches!(
                result,
                Err(FutureError::Execution(
                    ProvisioningError::Interrupted(_) | ProvisioningError::ExecutorShutdown
                ))
            ),
            "unexpected result {:?}",
            result
        );
    }
    assert!(matches!(
        adapter.start_machines_async(&memory(1024), &ZonesConfig::any(), TIMEOUT),
        Err(ProvisioningError::ExecutorShutdown)
    ));
}
