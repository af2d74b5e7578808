//! Provisioning error types.

use std::time::Duration;
use thiserror::Error;

use crate::core::error::CapacityError;

/// Errors raised by machine provisioning.
///
/// Errors detected before any work is submitted (unsupported operation,
/// capacity arithmetic, executor shut down) are returned synchronously.
/// Errors raised by the provisioning plugin on a worker are stored in the
/// operation's [`ProvisioningFuture`](super::ProvisioningFuture) and only
/// surface through `get()` / `exception()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// The provisioning plugin failed to start, stop or discover a machine.
    #[error("machine provisioning failed: {0}")]
    MachineProvisioning(String),

    /// The machine started but its grid service agent could not be brought up.
    #[error("grid service agent provisioning failed: {0}")]
    AgentProvisioning(String),

    /// The operation was interrupted before it completed.
    #[error("provisioning interrupted: {0}")]
    Interrupted(String),

    /// The plugin gave up waiting on the underlying provider.
    #[error("provisioning timed out after {0:?}")]
    Timeout(Duration),

    /// A component the plugin relies on is not available.
    #[error("missing provisioning dependency: {0}")]
    MissingDependency(String),

    /// The plugin does not support the requested operation.
    #[error("unsupported provisioning operation: {0}")]
    Unsupported(String),

    /// Capacity arithmetic failed while planning the operation.
    #[error("capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// The executor no longer accepts work.
    #[error("provisioning executor is shut down")]
    ExecutorShutdown,

    /// Any other failure, including a panic inside the plugin.
    #[error("unexpected provisioning failure: {0}")]
    Unexpected(String),
}

/// Errors returned when reading the result of a provisioning future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureError {
    /// The operation has neither completed nor reached its deadline.
    /// Callers should check `is_done()` first.
    #[error("operation not done yet")]
    NotDone,

    /// The deadline passed without a result.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation completed with an error.
    #[error("operation failed: {0}")]
    Execution(#[source] ProvisioningError),
}
