//! Configuration integration tests.
//!
//! Tests that load a configuration file and run the adapter it describes.

use machina::testing::FakeMachineProvisioning;
use machina::{
    CapacityRequirement, CapacityRequirementType, ConfigError, MachinaConfigBuilder,
    MachineProvisioning, NonBlockingMachineProvisioningAdapter, ProvisioningExecutor, YamlLoader,
    ZonesConfig,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::common::memory;

const CONFIG: &str = r#"
executor:
  max_threads: 4
provisioning:
  single_machine_capacity:
    memory_mb: 2048
    cpu_cores: 2
  reserved_capacity_per_machine:
    memory_mb: 48
  zones: [zone-a]
"#;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_adapter_from_config_file() {
    let file = write_config(CONFIG);
    let config = YamlLoader::load_config(file.path()).unwrap();

    let executor_config = MachinaConfigBuilder::executor_config(&config.executor);
    let executor = Arc::new(ProvisioningExecutor::new(executor_config).unwrap());
    let provisioning = Arc::new(FakeMachineProvisioning::from_config(&config.provisioning).unwrap());
    let adapter = NonBlockingMachineProvisioningAdapter::new(provisioning, executor);

    assert!(adapter.is_start_machine_supported());
    assert_eq!(adapter.config().zones, ZonesConfig::new(["zone-a"]));
    assert_eq!(
        adapter
            .capacity_of_single_machine()
            .requirement(&CapacityRequirementType::Cpu),
        CapacityRequirement::cpu_cores(2)
    );

    // 4096MB over 2000MB net per machine.
    let futures = adapter
        .start_machines_async(&memory(4096), &ZonesConfig::any(), Duration::from_secs(5))
        .unwrap();
    assert_eq!(futures.len(), 3);

    for future in &futures {
        let agent = future.wait().await.unwrap();
        assert!(agent.zones().contains("zone-a"));
    }
}

#[test]
fn test_invalid_config_file() {
    let file = write_config(
        r#"
executor:
  min_threads: 8
  max_threads: 2
provisioning:
  start_machine_supported: false
"#,
    );

    let result = YamlLoader::load_config(file.path());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_start_not_supported_from_config() {
    let config = YamlLoader::parse_config(
        r#"
provisioning:
  start_machine_supported: false
"#,
    )
    .unwrap();

    let provisioning = FakeMachineProvisioning::from_config(&config.provisioning).unwrap();

    assert!(!provisioning.is_start_machine_supported());
    assert!(provisioning.capacity_of_single_machine().is_zero());
}
