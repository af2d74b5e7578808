//! Execution infrastructure for provisioning work.
//!
//! This module provides the bounded worker pool that runs blocking
//! provisioning calls off the caller's thread.

pub(crate) mod executor;

pub use executor::{
    DEFAULT_MAX_THREADS, DEFAULT_MIN_THREADS, ExecutorConfig, MAX_THREADS_ENV, ProvisioningExecutor,
};
