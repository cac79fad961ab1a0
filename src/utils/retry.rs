//! Backoff for provider requests.
//!
//! Only transport-level trouble is retried: rate limiting, 5xx responses, timeouts and
//! connection failures. Anything else the provider says is taken as final.

use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

use crate::sources::SourceError;

/// How persistently a request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts in total, the first one included
    pub max_attempts: u32,
    /// Wait after the first failure; doubled after each further one
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Budget for all attempts and waits together
    pub deadline: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            deadline: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Exponential wait after the `failures`-th consecutive failure
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retry configuration used by the HTTP adapters
pub fn api_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        deadline: Duration::from_secs(120),
    }
}

/// Minimum wait before retrying `err`, or `None` when it is not worth retrying
fn transient_delay(err: &SourceError) -> Option<Duration> {
    match err {
        SourceError::RateLimit { retry_after: Some(secs) } => Some(Duration::from_secs(secs + 1)),
        SourceError::RateLimit { retry_after: None } => Some(Duration::from_secs(5)),
        SourceError::Api { status: 503, .. } => Some(Duration::from_secs(10)),
        SourceError::Api { status, .. } if *status >= 500 => Some(Duration::from_secs(2)),
        SourceError::Network(_) | SourceError::Timeout(_) => Some(Duration::from_secs(2)),
        _ => None,
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempts or deadline
/// run out. The last error is returned as is.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let deadline = Instant::now() + config.deadline;
    let mut failures = 0;

    loop {
        let error = match timeout_at(deadline, operation()).await {
            Ok(Ok(value)) => {
                if failures > 0 {
                    tracing::debug!(failures, "request recovered");
                }
                return Ok(value);
            }
            Ok(Err(error)) => error,
            Err(_) => return Err(SourceError::Timeout(format!("gave up after {:?}", config.deadline))),
        };
        failures += 1;

        let Some(minimum) = transient_delay(&error) else {
            return Err(error);
        };
        let wait = config.backoff(failures).max(minimum);
        if failures >= config.max_attempts || Instant::now() + wait >= deadline {
            tracing::warn!(failures, %error, "giving up on request");
            return Err(error);
        }

        tracing::debug!(failures, ?wait, %error, "transient provider error, backing off");
        sleep(wait).await;
    }
}
