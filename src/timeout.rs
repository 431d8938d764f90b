//! Timeout utilities for external processes and long-running loops.
//!
//! The unpacker subprocess runs on a small current-thread tokio runtime so
//! it can be raced against a deadline; parsers over attacker-controlled
//! structure use [`IterationTimeout`] inside their loops.

use crate::error::{Result, ScanError};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Timeout configuration for one operation
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log timeout warnings
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    fn timeout_error(&self) -> ScanError {
        ScanError::Timeout {
            operation: self.operation_name.clone(),
            seconds: self.duration.as_secs(),
        }
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        operation = %config.operation_name,
        seconds = config.duration.as_secs(),
        "starting operation with timeout"
    );

    match timeout(config.duration, future).await {
        Ok(result) => result,
        Err(_) => {
            if config.log_warnings {
                error!(
                    operation = %config.operation_name,
                    seconds = config.duration.as_secs(),
                    "operation timed out"
                );
            }
            Err(config.timeout_error())
        }
    }
}

/// Drive `future` to completion on a fresh current-thread runtime, bounded by `config`.
///
/// Dropping the future on timeout drops whatever it owns, so a child spawned
/// with `kill_on_drop(true)` is killed.
pub fn block_on_with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ScanError::Unpack(format!("failed to start runtime: {}", e)))?;
    runtime.block_on(with_timeout(config, future))
}

/// Synchronous timeout check for loop iterations
pub struct IterationTimeout {
    start: std::time::Instant,
    max_duration: Duration,
    check_interval: usize,
    iteration_count: usize,
    operation_name: String,
}

impl IterationTimeout {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            max_duration: Duration::from_secs(seconds),
            check_interval: 1000,
            iteration_count: 0,
            operation_name: operation.into(),
        }
    }

    /// Set how often the clock is read.
    pub fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = interval.max(1);
        self
    }

    /// Count one iteration; fails once the deadline has passed.
    pub fn check(&mut self) -> Result<()> {
        self.iteration_count += 1;

        if self.iteration_count % self.check_interval == 0 {
            let elapsed = self.start.elapsed();

            if elapsed > self.max_duration {
                warn!(
                    operation = %self.operation_name,
                    iterations = self.iteration_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "loop exceeded its time budget"
                );
                return Err(ScanError::Timeout {
                    operation: self.operation_name.clone(),
                    seconds: self.max_duration.as_secs(),
                });
            }
        }

        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.iteration_count
    }
}
