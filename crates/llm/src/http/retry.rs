//! Retry classification and exponential backoff.
//!
//! A logical request is attempted up to `retry_count` times. After each
//! retryable failure the client sleeps `base_delay * 2^n` (n = 0, 1, ...)
//! and tries again. Once the loop is exhausted one more attempt is made
//! unconditionally and its response is returned as-is, so a request that
//! keeps failing with retryable errors is tried `retry_count + 1` times in
//! total. The final attempt is deliberate: the caller always receives the
//! response of the most recent exchange, never a synthesized one.

use std::future::Future;
use std::time::Duration;

use super::HttpResponse;

/// Default number of attempts before the final unconditional one.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default backoff base.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Why an exchange did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No HTTP response at all: DNS, TCP, TLS or timeout
    ConnectionFailure,
    /// 429 Too Many Requests
    RateLimited,
    /// 5xx
    ServerError(u16),
    /// 4xx other than 429
    HttpError(u16),
    /// A status outside 2xx, 4xx and 5xx, such as an unfollowed redirect
    UnexpectedStatus(u16),
}

impl FailureKind {
    /// Classify a response; `None` means success.
    pub fn classify(response: &HttpResponse) -> Option<Self> {
        if response.success {
            return None;
        }

        Some(match response.status_code {
            0 => Self::ConnectionFailure,
            429 => Self::RateLimited,
            code @ 400..=499 => Self::HttpError(code),
            code @ 500..=599 => Self::ServerError(code),
            code => Self::UnexpectedStatus(code),
        })
    }

    /// Whether resubmitting the same request could succeed. Only a client
    /// error is final.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::HttpError(_))
    }
}

/// Attempt count and backoff base for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_count: u32, base_delay: Duration) -> Self {
        Self {
            retry_count,
            base_delay,
        }
    }

    /// Delay slept before attempt `attempt` (0-based). The first attempt
    /// has none; attempt n ≥ 1 waits `base_delay * 2^(n-1)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Total attempts made when every attempt fails with a retryable error.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Run `attempt_fn` under this policy. Attempts are strictly sequential.
    pub async fn run<F, Fut>(&self, mut attempt_fn: F) -> HttpResponse
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HttpResponse>,
    {
        for attempt in 0..self.retry_count {
            let response = attempt_fn().await;

            match FailureKind::classify(&response) {
                None => return response,
                Some(kind) if !kind.is_retryable() => return response,
                Some(kind) => {
                    let delay = self.delay_before(attempt + 1);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts(),
                        failure = ?kind,
                        "Request failed, retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        attempt_fn().await
    }
}
