//! Poll-based handles for provisioning operations.
//!
//! A [`ProvisioningFuture`] is created when an operation is submitted and is
//! completed exactly once by the worker that runs it. Callers either poll it
//! (`is_done`, `is_timed_out`, `get`) or await it with [`ProvisioningFuture::wait`].
//!
//! Timeouts are evaluated against a deadline fixed at submission time. A
//! result that arrives after the deadline is still returned by `get()`.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::agent::GridServiceAgent;
use super::error::{FutureError, ProvisioningError};

/// Handle for one machine start.
pub type FutureGridServiceAgent = ProvisioningFuture<GridServiceAgent>;

/// Handle for a machine discovery.
pub type FutureGridServiceAgents = ProvisioningFuture<Vec<GridServiceAgent>>;

/// Handle for a machine stop. Resolves to whether the machine was stopped.
pub type FutureStoppedMachine = ProvisioningFuture<bool>;

/// Handle for a provider-side resource cleanup.
pub type FutureCleanupCloudResources = ProvisioningFuture<()>;

struct Shared<T> {
    result: OnceLock<Result<T, ProvisioningError>>,
    notify: Notify,
}

/// The result of an asynchronous provisioning operation.
pub struct ProvisioningFuture<T> {
    shared: Arc<Shared<T>>,
    timestamp: DateTime<Utc>,
    deadline: Instant,
    timeout: Duration,
}

/// Write side of a [`ProvisioningFuture`].
///
/// Dropping a completer that was never used completes its future with
/// [`ProvisioningError::Interrupted`], so a future can't be left pending
/// forever when its task is torn down.
pub(crate) struct FutureCompleter<T> {
    shared: Arc<Shared<T>>,
    abandoned: bool,
}

impl<T> ProvisioningFuture<T> {
    /// Create a pending future and its completer.
    ///
    /// The deadline is `now + timeout`.
    pub(crate) fn pending(timeout: Duration) -> (Self, FutureCompleter<T>) {
        let shared = Arc::new(Shared {
            result: OnceLock::new(),
            notify: Notify::new(),
        });
        let future = Self {
            shared: Arc::clone(&shared),
            timestamp: Utc::now(),
            deadline: Instant::now() + timeout,
            timeout,
        };
        (
            future,
            FutureCompleter {
                shared,
                abandoned: false,
            },
        )
    }

    /// Check if the operation completed or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.shared.result.get().is_some() || self.is_timed_out()
    }

    /// Check if the deadline passed without a result.
    pub fn is_timed_out(&self) -> bool {
        self.shared.result.get().is_none() && Instant::now() >= self.deadline
    }

    /// When the operation was submitted.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The instant after which the operation counts as timed out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Total time the caller allowed for the operation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The failure, if the operation failed or timed out.
    pub fn exception(&self) -> Option<FutureError> {
        match self.shared.result.get() {
            Some(Err(err)) => Some(FutureError::Execution(err.clone())),
            Some(Ok(_)) => None,
            None if self.is_timed_out() => Some(FutureError::TimedOut(self.timeout)),
            None => None,
        }
    }
}

impl<T: Clone> ProvisioningFuture<T> {
    /// The operation's result.
    ///
    /// Fails with [`FutureError::NotDone`] if the operation is still running
    /// and within its deadline, [`FutureError::TimedOut`] if the deadline
    /// passed without a result, and [`FutureError::Execution`] if the
    /// operation failed.
    pub fn get(&self) -> Result<T, FutureError> {
        match self.shared.result.get() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(FutureError::Execution(err.clone())),
            None if self.is_timed_out() => Err(FutureError::TimedOut(self.timeout)),
            None => Err(FutureError::NotDone),
        }
    }

    /// Wait until the operation completes or its deadline passes, then
    /// return [`get`](Self::get).
    pub async fn wait(&self) -> Result<T, FutureError> {
        let deadline = tokio::time::Instant::from_std(self.deadline);
        loop {
            let notified = self.shared.notify.notified();
            if self.shared.result.get().is_some() {
                break;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        self.get()
    }
}

impl<T> Clone for ProvisioningFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            timestamp: self.timestamp,
            deadline: self.deadline,
            timeout: self.timeout,
        }
    }
}

impl<T> std::fmt::Debug for ProvisioningFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningFuture")
            .field("timestamp", &self.timestamp)
            .field("timeout", &self.timeout)
            .field("completed", &self.shared.result.get().is_some())
            .field("timed_out", &self.is_timed_out())
            .finish()
    }
}

impl<T> FutureCompleter<T> {
    /// Store the result. Only the first result is kept.
    pub(crate) fn complete(&self, result: Result<T, ProvisioningError>) {
        if self.shared.result.set(result).is_ok() {
            self.shared.notify.notify_waiters();
        }
    }

    /// Give up without a result. The future stays empty, so it reports
    /// [`FutureError::TimedOut`] once its deadline has passed.
    pub(crate) fn abandon(mut self) {
        self.abandoned = true;
    }
}

impl<T> Drop for FutureCompleter<T> {
    fn drop(&mut self) {
        if !self.abandoned && self.shared.result.get().is_none() {
            self.complete(Err(ProvisioningError::Interrupted(
                "provisioning task dropped before completing".to_string(),
            )));
        }
    }
}
