//! Resilience utilities for connectors
//!
//! Bounded retry with exponential backoff for single remote calls. A
//! `RetryPolicy` is built once and shared read-only by every call of an
//! execution.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default base delay before the first retry
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 250;

/// Default ceiling for a single backoff delay
pub const DEFAULT_CAPPED_INTERVAL_MS: u64 = 2000;

/// Default maximum attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;

/// Default wall-clock budget for one retried call
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30;

/// Classifies failures for the retry loop
pub trait Retryable {
    /// Whether the failure is transient and worth another attempt
    fn is_retryable(&self) -> bool;

    /// Minimum delay requested by the server, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Immutable retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    base_interval: Duration,
    capped_interval: Duration,
    multiplier: u32,
    max_attempts: u32,
    max_duration: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            capped_interval: Duration::from_millis(DEFAULT_CAPPED_INTERVAL_MS),
            multiplier: 2,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a doubling policy without jitter.
    ///
    /// `max_attempts` is clamped to at least 1 and `capped_interval` to at
    /// least `base_interval`.
    pub fn new(
        base_interval: Duration,
        capped_interval: Duration,
        max_attempts: u32,
        max_duration: Duration,
    ) -> Self {
        Self {
            base_interval,
            capped_interval: capped_interval.max(base_interval),
            multiplier: 2,
            max_attempts: max_attempts.max(1),
            max_duration,
            jitter: false,
        }
    }

    /// Set the backoff multiplier (minimum 1)
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Enable or disable ±25% jitter on each delay
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn capped_interval(&self) -> Duration {
        self.capped_interval
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Get retry delay after failed attempt N (0-based), before jitter
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_interval.as_millis() as u64;
        let cap_ms = self.capped_interval.as_millis() as u64;
        let factor = (self.multiplier as u64).saturating_pow(attempt);
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }

    /// Delay actually slept before the next attempt
    fn next_delay<E: Retryable>(&self, attempt: u32, error: &E) -> Duration {
        let mut delay = self.retry_delay(attempt);
        if self.jitter {
            delay = jittered(delay, self.capped_interval);
        }
        if let Some(requested) = error.retry_after() {
            delay = delay.max(requested.min(self.capped_interval));
        }
        delay
    }
}

/// Spread a delay by ±25%, never above `cap`
fn jittered(delay: Duration, cap: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let range = ms / 4;
    if range == 0 {
        return delay;
    }
    let offset = rand::rng().random_range(0..=range * 2);
    let cap_ms = cap.as_millis() as u64;
    Duration::from_millis((ms - range + offset).min(cap_ms))
}

/// Determines if a transport error is retryable
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    // Builder and decode failures repeat identically on every attempt
    if error.is_builder() || error.is_decode() {
        return false;
    }

    // Timeouts, refused or dropped connections and truncated bodies
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        return true;
    }

    if let Some(status) = error.status() {
        // Retry on server errors (5xx) and rate limits (429)
        return status.is_server_error() || status.as_u16() == 429;
    }

    false
}

/// Execute an operation under a retry policy.
///
/// Non-retryable errors return after the attempt that produced them. Transient
/// errors are retried until `max_attempts` is reached or the next sleep would
/// cross `max_duration`.
pub async fn execute_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        "request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(RetryError::Permanent(error));
        }

        if attempt >= policy.max_attempts {
            warn!(
                operation = operation_name,
                attempts = attempt,
                error = %error,
                "retry attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let delay = policy.next_delay(attempt - 1, &error);
        if started.elapsed() + delay > policy.max_duration {
            warn!(
                operation = operation_name,
                attempts = attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %error,
                "retry duration exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        debug!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "request failed, will retry"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Error from retry operation
#[derive(Debug)]
pub enum RetryError<E> {
    /// Transient failures outlived the policy
    Exhausted { attempts: u32, last_error: E },
    /// Non-retryable error
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The error that ended the retry loop
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Permanent(e) => e,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => {
                write!(f, "failed after {} attempts: {}", attempts, last_error)
            }
            RetryError::Permanent(e) => write!(f, "permanent error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(40),
            max_attempts,
            Duration::from_secs(60),
        )
    }

    fn transient() -> ConnectorError {
        ConnectorError::Api {
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_interval(), Duration::from_millis(250));
        assert_eq!(policy.capped_interval(), Duration::from_millis(2000));
        assert_eq!(policy.max_attempts(), 12);
        assert_eq!(policy.max_duration(), Duration::from_secs(30));
        assert_eq!(policy.multiplier(), 2);
        assert!(!policy.jitter());
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_delay(0), Duration::from_millis(250));
        assert_eq!(policy.retry_delay(1), Duration::from_millis(500));
        assert_eq!(policy.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.retry_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.retry_delay(10), Duration::from_millis(2000));
        assert_eq!(policy.retry_delay(200), Duration::from_millis(2000));
    }

    #[test]
    fn test_custom_multiplier() {
        let policy = fast_policy(5).with_multiplier(3);
        assert_eq!(policy.retry_delay(0), Duration::from_millis(10));
        assert_eq!(policy.retry_delay(1), Duration::from_millis(30));
        assert_eq!(policy.retry_delay(2), Duration::from_millis(40));
    }

    #[test]
    fn test_new_clamps_inputs() {
        let policy = RetryPolicy::new(
            Duration::from_millis(500),
            Duration::from_millis(100),
            0,
            Duration::from_secs(1),
        );
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.capped_interval(), Duration::from_millis(500));
        assert_eq!(policy.with_multiplier(0).multiplier(), 1);
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let cap = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(Duration::from_millis(1000), cap);
            assert!(d >= Duration::from_millis(750));
            assert!(d <= cap);
        }
    }

    #[test]
    fn test_retry_after_raises_delay_up_to_cap() {
        let policy = fast_policy(3);
        let limited = ConnectorError::RateLimited { retry_after_secs: 60 };
        assert_eq!(policy.next_delay(0, &limited), Duration::from_millis(40));
        assert_eq!(policy.next_delay(0, &transient()), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = execute_with_retry(&fast_policy(5), "op", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(transient()) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&fast_policy(4), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&fast_policy(10), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConnectorError::NotFound("org/acme".into()))
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Permanent(ConnectorError::NotFound(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_stops_before_max_attempts() {
        // Delays: 10, 20, 40, 40, ... -> the fourth sleep would cross 100ms
        let policy = RetryPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(40),
            50,
            Duration::from_millis(100),
        );
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&policy, "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_accumulate() {
        let started = Instant::now();
        let _: Result<(), _> =
            execute_with_retry(&fast_policy(4), "op", move || async move { Err(transient()) }).await;
        // 10 + 20 + 40 between four attempts
        assert_eq!(started.elapsed(), Duration::from_millis(70));
    }

    #[test]
    fn test_retry_error_display() {
        let err: RetryError<ConnectorError> = RetryError::Exhausted {
            attempts: 3,
            last_error: transient(),
        };
        assert!(err.to_string().contains("failed after 3 attempts"));
        assert!(matches!(err.into_inner(), ConnectorError::Api { status: 503, .. }));
    }
}
