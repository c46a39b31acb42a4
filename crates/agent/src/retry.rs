//! Retry/backoff governor for model calls.
//!
//! Transient provider failures (network hiccups, rate limits, 5xx) are
//! retried with exponential backoff; anything else fails fast. Backoff
//! sleeps are cancellable through the shared abort flag so Ctrl+C does
//! not hang for a full delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use clawsmith_core::ProviderError;

/// How long a live stream may go without producing a chunk before the
/// wait is treated as a transient timeout.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt, so `max_retries + 1` attempts total.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Minimum delay when the failure was a rate limit.
    pub rate_limit_floor: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            rate_limit_floor: Duration::from_secs(10),
        }
    }
}

/// How a failure should be treated by the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    /// Retryable with a floor on the delay; the server may have advised
    /// an explicit wait.
    RateLimited { retry_after: Option<Duration> },
    Fatal,
}

/// Classify a structured provider error.
pub fn classify(err: &ProviderError) -> ErrorClass {
    match err {
        ProviderError::Timeout(_)
        | ProviderError::Network(_)
        | ProviderError::StreamInterrupted(_) => ErrorClass::Retryable,
        ProviderError::RateLimited { retry_after_secs } => ErrorClass::RateLimited {
            retry_after: retry_after_secs.map(Duration::from_secs),
        },
        ProviderError::ApiError { status_code, .. } => match status_code {
            429 => ErrorClass::RateLimited { retry_after: None },
            500 | 502 | 503 | 504 => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        },
        ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_) => {
            ErrorClass::Fatal
        }
    }
}

/// Classify a bare error string by keyword. Used for mid-stream errors
/// that arrive as text rather than structured variants.
pub fn classify_text(text: &str) -> ErrorClass {
    let lower = text.to_lowercase();
    if lower.contains("rate") || lower.contains("429") {
        return ErrorClass::RateLimited { retry_after: None };
    }
    const RETRYABLE: [&str; 8] = [
        "timeout",
        "connection",
        "network",
        "500",
        "502",
        "503",
        "504",
        "overloaded",
    ];
    if RETRYABLE.iter().any(|kw| lower.contains(kw)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, class: ErrorClass) -> Duration {
        let backoff = self
            .initial_delay
            .mul_f64(self.exponential_base.powi(attempt as i32))
            .min(self.max_delay);
        match class {
            ErrorClass::RateLimited {
                retry_after: Some(advised),
            } => advised,
            ErrorClass::RateLimited { retry_after: None } => backoff.max(self.rate_limit_floor),
            _ => backoff,
        }
    }
}

/// Runs a fallible async operation under the backoff policy.
pub struct RetryGovernor {
    config: RetryConfig,
    abort: Arc<AtomicBool>,
}

impl RetryGovernor {
    pub fn new(config: RetryConfig, abort: Arc<AtomicBool>) -> Self {
        Self { config, abort }
    }

    /// Run `op` until it succeeds, a fatal error occurs, retries are
    /// exhausted, or the abort flag is raised. `on_retry` fires before
    /// each backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        mut op: F,
        mut on_retry: impl FnMut(u32, &ProviderError, Duration),
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.abort.load(Ordering::Relaxed) {
                return Err(ProviderError::StreamInterrupted("aborted".into()));
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let class = classify(&err);
                    if class == ErrorClass::Fatal || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = self.config.delay_for(attempt, class);
                    warn!(
                        attempt = attempt + 1,
                        max = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model call failed, backing off"
                    );
                    on_retry(attempt + 1, &err, delay);
                    if !self.sleep_unless_aborted(delay).await {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Sleep in short slices so an abort takes effect promptly. Returns
    /// false when the sleep was cut short by an abort.
    pub async fn sleep_unless_aborted(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.abort.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(Duration::from_millis(100));
            tokio::time::sleep(slice).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let cfg = RetryConfig::default();
        assert_eq!(
            cfg.delay_for(0, ErrorClass::Retryable),
            Duration::from_secs(1)
        );
        assert_eq!(
            cfg.delay_for(1, ErrorClass::Retryable),
            Duration::from_secs(2)
        );
        assert_eq!(
            cfg.delay_for(2, ErrorClass::Retryable),
            Duration::from_secs(4)
        );
        // 2^10 seconds exceeds the 60s cap.
        assert_eq!(
            cfg.delay_for(10, ErrorClass::Retryable),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn rate_limit_floor_applies() {
        let cfg = RetryConfig::default();
        assert_eq!(
            cfg.delay_for(0, ErrorClass::RateLimited { retry_after: None }),
            Duration::from_secs(10)
        );
        // A late attempt's backoff already exceeds the floor.
        assert_eq!(
            cfg.delay_for(5, ErrorClass::RateLimited { retry_after: None }),
            Duration::from_secs(32)
        );
    }

    #[test]
    fn server_advised_retry_after_wins() {
        let cfg = RetryConfig::default();
        assert_eq!(
            cfg.delay_for(
                0,
                ErrorClass::RateLimited {
                    retry_after: Some(Duration::from_secs(25)),
                }
            ),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn text_classification_is_keyword_based() {
        assert_eq!(classify_text("Connection reset by peer"), ErrorClass::Retryable);
        assert_eq!(classify_text("HTTP 503 Service Unavailable"), ErrorClass::Retryable);
        assert_eq!(classify_text("server overloaded, try later"), ErrorClass::Retryable);
        assert_eq!(
            classify_text("Rate limit exceeded"),
            ErrorClass::RateLimited { retry_after: None }
        );
        assert_eq!(classify_text("invalid request body"), ErrorClass::Fatal);
    }

    #[test]
    fn structured_classification() {
        assert_eq!(classify(&ProviderError::Timeout("read timed out".into())), ErrorClass::Retryable);
        assert_eq!(
            classify(&ProviderError::RateLimited {
                retry_after_secs: Some(7),
            }),
            ErrorClass::RateLimited {
                retry_after: Some(Duration::from_secs(7)),
            }
        );
        assert_eq!(
            classify(&ProviderError::ApiError {
                status_code: 502,
                message: "bad gateway".into(),
            }),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify(&ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into(),
            }),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&ProviderError::AuthenticationFailed("bad key".into())),
            ErrorClass::Fatal
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_make_exactly_max_plus_one_attempts() {
        let cfg = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        };
        let governor = RetryGovernor::new(cfg, Arc::new(AtomicBool::new(false)));
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = governor
            .run(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::Timeout("read timed out".into())) }
                },
                |_, _, _| {},
            )
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let governor =
            RetryGovernor::new(RetryConfig::default(), Arc::new(AtomicBool::new(false)));
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = governor
            .run(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::AuthenticationFailed("nope".into())) }
                },
                |_, _, _| {},
            )
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures() {
        let governor =
            RetryGovernor::new(RetryConfig::default(), Arc::new(AtomicBool::new(false)));
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let value = governor
            .run(
                move || {
                    let n = a.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(ProviderError::Network("reset".into()))
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_, _, _| {},
            )
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
