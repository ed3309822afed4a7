//! Fixed-interval retry for characteristic operations.
//!
//! # Example
//!
//! ```
//! use shotstopper_core::{RetryConfig, with_retry, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! let value = with_retry(&RetryConfig::for_read(), "read weightValue", || async {
//!     Ok::<_, Error>(vec![36u8])
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How many times an operation runs and how long to wait between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Never less than one.
    attempts: u32,
    /// Pause after each failed attempt.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_read()
    }
}

impl RetryConfig {
    /// Characteristic reads: three attempts, a fixed 200 ms apart.
    pub const fn for_read() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(200),
        }
    }

    /// A single attempt.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Set the total number of attempts. Zero is treated as one.
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) || attempt >= config.attempts => return Err(e),
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, config.attempts, e
                );
                sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Transport hiccups are retried; a missing handle or bad data fails fast.
pub(crate) fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::Timeout { .. }
            | Error::Bluetooth(_)
            | Error::ConnectionLost
            | Error::ConnectFailed { .. }
            | Error::WriteFailed { .. }
    )
}
