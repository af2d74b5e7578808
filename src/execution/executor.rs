//! Worker pool for blocking provisioning calls.
//!
//! The `ProvisioningExecutor` runs provisioning work with:
//! - A dedicated runtime owned by the executor (no process-wide pool)
//! - Concurrency limiting via semaphore
//! - Per-task throttling delay (schedule, then submit)
//! - Deadline tracking with cooperative cancellation
//! - Panic capture so a failing plugin never takes a worker down

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::provisioning::{
    FutureCompleter, ProvisioningContext, ProvisioningError, ProvisioningFuture,
};

/// Default cap on concurrent provisioning calls.
pub const DEFAULT_MAX_THREADS: usize = 64;

/// Default number of scheduler threads.
pub const DEFAULT_MIN_THREADS: usize = 1;

/// Environment variable overriding the maximum number of concurrent calls.
pub const MAX_THREADS_ENV: &str = "MACHINA_MAX_THREADS";

/// Sizing and pacing of a [`ProvisioningExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Threads driving scheduling and deadline tracking.
    pub min_threads: usize,
    /// Maximum number of provisioning calls running at once.
    pub max_threads: usize,
    /// Delay between the start of consecutive tasks of one batch. Task `i`
    /// of a batch is held back by `i * throttling_delay`.
    pub throttling_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            throttling_delay: Duration::ZERO,
        }
    }
}

impl ExecutorConfig {
    /// Default configuration with `MACHINA_MAX_THREADS` applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Default configuration with overrides read through `lookup`.
    ///
    /// Values that are not a positive integer are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(MAX_THREADS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(max_threads) if max_threads > 0 => config.max_threads = max_threads,
                _ => tracing::warn!(
                    var = MAX_THREADS_ENV,
                    value = %value,
                    "Ignoring invalid max_threads override"
                ),
            }
        }
        config
    }

    /// Builder: set the maximum number of concurrent provisioning calls.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Builder: set the number of scheduler threads.
    pub fn with_min_threads(mut self, min_threads: usize) -> Self {
        self.min_threads = min_threads;
        self
    }

    /// Builder: set the per-index throttling delay.
    pub fn with_throttling_delay(mut self, delay: Duration) -> Self {
        self.throttling_delay = delay;
        self
    }
}

/// Bounded worker pool running blocking provisioning calls.
///
/// The executor is created explicitly, shared through an `Arc`, and shut
/// down explicitly with [`shutdown`](Self::shutdown) (or when dropped).
pub struct ProvisioningExecutor {
    config: ExecutorConfig,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl ProvisioningExecutor {
    /// Create an executor with its own runtime.
    pub fn new(config: ExecutorConfig) -> std::io::Result<Self> {
        let max_threads = config.max_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.min_threads.max(1))
            .max_blocking_threads(max_threads)
            .thread_name("machina-provisioning")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            min_threads = config.min_threads,
            max_threads,
            throttling_delay = ?config.throttling_delay,
            "Provisioning executor started"
        );

        Ok(Self {
            config,
            runtime: Mutex::new(Some(runtime)),
            handle,
            semaphore: Arc::new(Semaphore::new(max_threads)),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Get the maximum number of concurrent provisioning calls.
    pub fn max_threads(&self) -> usize {
        self.config.max_threads.max(1)
    }

    /// Get the number of available permits (slots for concurrent calls).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Throttling delay applied to the task at `index` within a batch.
    pub fn throttling_delay(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.config.throttling_delay.saturating_mul(index)
    }

    /// Check if the executor has been shut down.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Submit blocking work and return a future for its result.
    ///
    /// The work starts after the throttling delay for `index` and must finish
    /// within `timeout` of that. The future's deadline covers both. When the
    /// deadline passes the context's cancellation token fires, but the work
    /// itself is never interrupted.
    pub fn submit<T, F>(
        &self,
        operation: &'static str,
        index: usize,
        timeout: Duration,
        work: F,
    ) -> Result<ProvisioningFuture<T>, ProvisioningError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&ProvisioningContext) -> Result<T, ProvisioningError> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(ProvisioningError::ExecutorShutdown);
        }

        let delay = self.throttling_delay(index);
        let (future, completer) = ProvisioningFuture::pending(delay.saturating_add(timeout));
        let cancellation = self.shutdown.child_token();
        let ctx = ProvisioningContext::with_deadline(timeout, future.deadline(), cancellation.clone());
        let semaphore = Arc::clone(&self.semaphore);

        tracing::debug!(operation, index, delay = ?delay, timeout = ?timeout, "Submitting provisioning task");

        self.handle.spawn(run_task(
            operation,
            delay,
            semaphore,
            cancellation,
            ctx,
            completer,
            work,
        ));

        Ok(future)
    }

    /// Stop accepting work and tear down the runtime.
    ///
    /// Pending tasks complete with [`ProvisioningError::Interrupted`]; running
    /// provisioning calls see their cancellation token fire but are not
    /// interrupted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.semaphore.close();
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            tracing::info!("Provisioning executor shut down");
        }
    }
}

impl Drop for ProvisioningExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_task<T, F>(
    operation: &'static str,
    delay: Duration,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    ctx: ProvisioningContext,
    completer: FutureCompleter<T>,
    work: F,
) where
    T: Send + Sync + 'static,
    F: FnOnce(&ProvisioningContext) -> Result<T, ProvisioningError> + Send + 'static,
{
    let deadline = tokio::time::Instant::from_std(ctx.deadline());

    if !delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancellation.cancelled() => {
                completer.complete(Err(ProvisioningError::Interrupted(format!(
                    "{} cancelled while throttled",
                    operation
                ))));
                return;
            }
        }
    }

    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                completer.complete(Err(ProvisioningError::ExecutorShutdown));
                return;
            }
        },
        _ = cancellation.cancelled() => {
            completer.complete(Err(ProvisioningError::Interrupted(format!(
                "{} cancelled while waiting for a worker",
                operation
            ))));
            return;
        }
        _ = tokio::time::sleep_until(deadline) => {
            tracing::warn!(operation, "No worker became available before the deadline");
            completer.abandon();
            return;
        }
    };

    let blocking_ctx = ctx.clone();
    let blocking = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work(&blocking_ctx)
    });
    tokio::pin!(blocking);

    let joined = tokio::select! {
        joined = &mut blocking => joined,
        _ = tokio::time::sleep_until(deadline) => {
            tracing::warn!(
                operation,
                timeout = ?ctx.timeout(),
                "Provisioning call still running past its deadline, requesting cancellation"
            );
            cancellation.cancel();
            blocking.await
        }
    };

    let result = match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let message = panic_message(err.into_panic());
            tracing::error!(operation, error = %message, "Unexpected failure in provisioning task");
            Err(ProvisioningError::Unexpected(message))
        }
        Err(err) => Err(ProvisioningError::Interrupted(err.to_string())),
    };
    completer.complete(result);
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
