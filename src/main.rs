//! machina - capacity planning and machine provisioning.
//!
//! Usage:
//!   machina plan --config <file> [capacity...]      Compute how many machines a capacity needs
//!   machina simulate --config <file> [capacity...]  Start machines against an in-memory plugin
//!   machina validate --config <file>                Validate a configuration file

use clap::{Args, Parser, Subcommand};
use machina::testing::{FakeMachineProvisioning, wait_all};
use machina::{
    CapacityConfig, CapacityRequirements, ExecutorConfig, MachinaConfig, MachinaConfigBuilder,
    NonBlockingMachineProvisioningAdapter, ProvisioningExecutor, YamlLoader, ZonesConfig,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// machina - capacity planning and machine provisioning
#[derive(Parser)]
#[command(name = "machina")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute how many machines are needed for a capacity
    Plan {
        /// Path to the configuration file
        #[arg(short, long, env = "MACHINA_CONFIG")]
        config: PathBuf,

        #[command(flatten)]
        capacity: CapacityArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start machines for a capacity against an in-memory provisioning plugin
    Simulate {
        /// Path to the configuration file
        #[arg(short, long, env = "MACHINA_CONFIG")]
        config: PathBuf,

        #[command(flatten)]
        capacity: CapacityArgs,

        /// Zones to start the machines in (default: configured zones)
        #[arg(short, long)]
        zone: Vec<String>,

        /// Timeout per machine start in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Print the started agents as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(short, long, env = "MACHINA_CONFIG")]
        config: PathBuf,
    },
}

/// Requested capacity.
#[derive(Args)]
struct CapacityArgs {
    /// Memory in megabytes
    #[arg(long)]
    memory_mb: Option<u64>,

    /// CPU cores (fractions allowed)
    #[arg(long)]
    cpu_cores: Option<f64>,

    /// Minimum number of machines
    #[arg(long)]
    machines: Option<u64>,

    /// Drive capacity as PATH=MB (repeatable)
    #[arg(long = "drive", value_parser = parse_drive)]
    drives: Vec<(String, u64)>,
}

impl CapacityArgs {
    fn to_capacity(&self) -> Result<CapacityRequirements, machina::ConfigError> {
        let config = CapacityConfig {
            memory_mb: self.memory_mb,
            cpu_cores: self.cpu_cores,
            machines: self.machines,
            drives: self.drives.iter().cloned().collect::<BTreeMap<_, _>>(),
        };
        MachinaConfigBuilder::capacity(&config)
    }
}

fn parse_drive(value: &str) -> Result<(String, u64), String> {
    let (path, megabytes) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=MB, got '{}'", value))?;
    let megabytes = megabytes
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid drive size '{}': {}", megabytes, e))?;
    Ok((path.trim().to_string(), megabytes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            config,
            capacity,
            json,
        } => {
            plan(config, capacity, json)?;
        }
        Commands::Simulate {
            config,
            capacity,
            zone,
            timeout,
            json,
        } => {
            simulate(config, capacity, zone, Duration::from_secs(timeout), json).await?;
        }
        Commands::Validate { config } => {
            validate(config)?;
        }
    }

    Ok(())
}

/// Print how many machines a capacity needs.
fn plan(
    config_path: PathBuf,
    capacity: CapacityArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&config_path)?;
    let required = capacity.to_capacity()?;
    let single = MachinaConfigBuilder::capacity(&config.provisioning.single_machine_capacity)?;
    let provisioning = MachinaConfigBuilder::provisioning_config(&config.provisioning)?;
    let reserved = &provisioning.reserved_capacity_per_machine;

    let machines = machina::calc_number_of_machines(&required, &single, reserved)?;
    let net = single.subtract_or_zero(reserved);

    if json {
        let plan = serde_json::json!({
            "required": required.to_string(),
            "single_machine": single.to_string(),
            "reserved_per_machine": reserved.to_string(),
            "net_per_machine": net.to_string(),
            "machines": machines,
            "zones": provisioning.zones.zones().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Required:             {}", required);
    println!("Single machine:       {}", single);
    println!("Reserved per machine: {}", reserved);
    println!("Net per machine:      {}", net);
    println!("Machines:             {}", machines);
    if !provisioning.zones.is_empty() {
        println!("Zones:                {}", provisioning.zones);
    }
    Ok(())
}

/// Start machines for a capacity against the in-memory plugin.
async fn simulate(
    config_path: PathBuf,
    capacity: CapacityArgs,
    zones: Vec<String>,
    timeout: Duration,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&config_path)?;
    let required = capacity.to_capacity()?;

    let adapter = build_adapter(&config)?;
    let futures = adapter.start_machines_async(&required, &ZonesConfig::new(zones), timeout)?;
    info!(machines = futures.len(), "Waiting for machines to start");

    let mut agents = Vec::new();
    let mut failures = 0;
    for (index, result) in wait_all(&futures).await.into_iter().enumerate() {
        match result {
            Ok(agent) => agents.push(agent),
            Err(e) => {
                failures += 1;
                warn!(index, error = %e, "Machine did not start");
            }
        }
    }
    adapter.destroy();

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
    } else {
        for agent in &agents {
            println!("{} zones={}", agent, agent.zones());
        }
    }

    if failures > 0 {
        error!(failures, "Some machines failed to start");
        return Err(format!("{} machine(s) failed to start", failures).into());
    }
    Ok(())
}

fn build_adapter(
    config: &MachinaConfig,
) -> Result<NonBlockingMachineProvisioningAdapter, Box<dyn std::error::Error>> {
    let executor_config: ExecutorConfig = MachinaConfigBuilder::executor_config(&config.executor);
    let executor = Arc::new(ProvisioningExecutor::new(executor_config)?);
    let provisioning = Arc::new(FakeMachineProvisioning::from_config(&config.provisioning)?);
    Ok(NonBlockingMachineProvisioningAdapter::new(provisioning, executor))
}

/// Validate a configuration file.
fn validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", config_path.display());

    match YamlLoader::load_config(&config_path) {
        Ok(config) => {
            let executor = MachinaConfigBuilder::executor_config(&config.executor);
            let single =
                MachinaConfigBuilder::capacity(&config.provisioning.single_machine_capacity)?;
            info!("Configuration is valid:");
            info!(
                "  executor: min_threads={} max_threads={} throttling_delay={:?}",
                executor.min_threads, executor.max_threads, executor.throttling_delay
            );
            info!("  single machine: {}", single);
            info!(
                "  start machine supported: {}",
                config.provisioning.start_machine_supported
            );
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}
