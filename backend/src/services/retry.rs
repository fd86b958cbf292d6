//! Timeouts and bounded retries around store calls
//!
//! Reads are retried with exponential backoff when the failure looks
//! transient. Writes only get the timeout; a failed write is reported and
//! the client resubmits.

use std::future::Future;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};

/// Per-call store policy
#[derive(Debug, Clone)]
pub struct StorePolicy {
    timeout: Duration,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl StorePolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        let base_delay = Duration::from_millis(config.retry_base_delay_ms);
        Self {
            timeout: config.operation_timeout(),
            max_attempts: config.read_retry_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(config.retry_max_delay_ms).max(base_delay),
        }
    }

    pub fn new(timeout: Duration, max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the ceiling
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    async fn with_timeout<T, Fut>(&self, operation: &str, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(AppError::StoreTimeout(operation.to_string()))
            }
        }
    }

    /// Run an idempotent read with timeout and retries
    pub async fn read<T, F, Fut>(&self, operation: &str, mut call: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match self.with_timeout(operation, call()).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "Retrying store read");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a write with a timeout only
    pub async fn write<T, Fut>(&self, operation: &str, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        self.with_timeout(operation, fut).await
    }
}

/// Failures worth another attempt
fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::StoreTimeout(_) => true,
        AppError::DatabaseError(db) => matches!(
            db,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
        ),
        _ => false,
    }
}
