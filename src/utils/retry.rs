use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::RetryConfig;
use crate::utils::error::{AppError, Result};

/// The one retry rule applied at every network boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
    retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration, max_delay: Duration, retryable_statuses: Vec<u16>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            retryable_statuses,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.retryable_statuses.clone(),
        )
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, Vec::new())
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn is_retryable(&self, err: &AppError) -> bool {
        match err.status() {
            Some(status) => self.retryable_statuses.contains(&status),
            None => err.is_transient_transport(),
        }
    }

    /// Delays between attempts: initial, doubled each time, capped.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // the backoff yields initial * 2^n starting at n = 1, so run it at double scale and halve
        ExponentialBackoff::from_millis(2)
            .factor(self.initial_delay.as_millis() as u64)
            .max_delay(self.max_delay.saturating_mul(2))
            .map(|delay| delay / 2)
            .take(self.max_attempts - 1)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        RetryIf::start(self.delays(), action, |err: &AppError| {
            let retry = self.is_retryable(err);
            if retry {
                warn!(operation, error = %err, "retryable failure, backing off");
            }
            retry
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
