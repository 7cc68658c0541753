//! Bounded-retry HTTP helper.
//!
//! One retry policy is shared by token acquisition and catalog calls; only
//! the parameters (attempt count, backoff shape) differ between the two.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

/// Backoff shape between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * (attempt + 1)` after failed attempt `attempt` (0-based).
    Linear,
    /// `base * 2^attempt`.
    Exponential,
}

/// Retry parameters: how many times to retry after the first attempt, and
/// how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear,
            base_delay,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential,
            base_delay,
        }
    }

    /// Total attempts, counting the initial one.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to sleep after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay * (attempt + 1),
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(attempt),
        }
    }
}

/// Terminal outcome of a retried request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Upstream rejected the request itself; retrying cannot help.
    #[error("upstream rejected request ({status}): {body}")]
    Client { status: StatusCode, body: String },
    /// All attempts failed with retryable errors; carries the last one.
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Sends a request, retrying 5xx responses and transport failures with
/// backoff. 2xx is returned immediately; 4xx is surfaced immediately as
/// [`FetchError::Client`].
pub async fn send_with_retry(
    request: RequestBuilder,
    policy: &RetryPolicy,
) -> Result<Response, FetchError> {
    let attempts = policy.attempts();
    let mut last = String::new();

    for attempt in 0..attempts {
        let req = match request.try_clone() {
            Some(r) => r,
            None => {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: "request body cannot be cloned for retry".into(),
                })
            }
        };

        match req.send().await {
            Ok(res) if res.status().is_success() => return Ok(res),
            Ok(res) if res.status().is_client_error() => {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(FetchError::Client { status, body });
            }
            Ok(res) => {
                last = format!("upstream status {}", res.status());
                tracing::warn!(attempt, error = %last, "retryable upstream failure");
            }
            Err(err) => {
                last = format!("transport error: {}", err);
                tracing::warn!(attempt, error = %last, "retryable transport failure");
            }
        }

        if attempt + 1 < attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(FetchError::Exhausted { attempts, last })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_by_fixed_increment() {
        let policy = RetryPolicy::linear(2, Duration::from_millis(700));
        assert_eq!(policy.delay_for(0), Duration::from_millis(700));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2100));
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(400));
        assert_eq!(policy.delay_for(0), Duration::from_millis(400));
        assert_eq!(policy.delay_for(1), Duration::from_millis(800));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1600));
    }
}
