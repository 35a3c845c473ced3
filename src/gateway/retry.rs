//! Bounded retry with exponential backoff
//!
//! - Attempts: configured maximum, first call included
//! - Delay: base × 2^attempt, capped, ±25% jitter
//! - Only `TransientGateway` errors are retried; anything else is returned
//!   as is on the first occurrence

use crate::config::RetryConfig;
use crate::errors::{ForgeError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            enable_jitter: config.jitter,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            max_delay_ms: 0,
            enable_jitter: false,
        }
    }

    /// Run `operation` until it succeeds, fails non-transiently or the
    /// attempt bound is reached
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_transient() {
                        return Err(e);
                    }

                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(ForgeError::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Transient gateway failure, retrying");
                    sleep(delay).await;
                }
            }
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
