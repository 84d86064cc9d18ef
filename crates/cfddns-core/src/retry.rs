//! Retry policy for provider calls
//!
//! [`BackoffPolicy::delay_for`] is a pure function from attempt number to
//! delay: `min(base * 2^(attempt - 1), max)`. Jitter is applied separately so
//! that many hosts started by the same scheduler tick do not retry in lockstep.
//!
//! Only errors for which [`Error::is_transient`] holds are retried. A
//! rate-limit `Retry-After` hint is honored in full, even past the backoff
//! cap. A hint longer than [`BackoffPolicy::max_retry_after`] ends the retries
//! instead of stalling the run.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default cap on a `Retry-After` hint the retry loop will wait out
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Exponential backoff with capped attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    max_retry_after: Duration,
}

impl BackoffPolicy {
    /// Create a policy
    ///
    /// `max_attempts` counts the first call; values below 1 are raised to 1.
    /// `jitter` is clamped to `0.0..=1.0`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: jitter.clamp(0.0, 1.0),
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    /// Longest `Retry-After` hint the policy is willing to wait out
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Policy that retries immediately, for tests and tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Total attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Longest `Retry-After` hint that is still waited out
    pub fn max_retry_after(&self) -> Duration {
        self.max_retry_after
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Apply ± `jitter` randomization to a delay
    pub fn jittered<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        if self.jitter == 0.0 || delay.is_zero() {
            return delay;
        }

        let secs = delay.as_secs_f64();
        let spread = secs * self.jitter;
        let jittered = rng.gen_range((secs - spread)..=(secs + spread));

        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Whether a call that failed on `attempt` with `error` may run again
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        error.is_transient()
            && attempt < self.max_attempts
            && error
                .retry_after()
                .is_none_or(|hint| hint <= self.max_retry_after)
    }

    /// Delay before the next attempt, honoring a rate-limit hint
    fn next_delay(&self, attempt: u32, error: &Error) -> Duration {
        let delay = self.jittered(self.delay_for(attempt), &mut rand::thread_rng());
        match error.retry_after() {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(500), Duration::from_secs(8), 0.2)
    }
}

/// Result of a retried operation with the number of attempts used
#[derive(Debug)]
pub struct Attempts<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted
///
/// # Parameters
///
/// - `policy`: Backoff policy
/// - `operation_name`: Human-readable name for logging (e.g. "read vpn.example.com/A")
/// - `operation`: Produces one attempt per call
pub async fn retry_transient<T, F, Fut>(
    policy: &BackoffPolicy,
    operation_name: &str,
    mut operation: F,
) -> Attempts<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        "Call succeeded after retries"
                    );
                }
                return Attempts {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if policy.should_retry(attempt, &e) => {
                let delay = policy.next_delay(attempt, &e);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts(),
                    retry_after = ?delay,
                    error = %e,
                    "Transient error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if let Some(hint) = e.retry_after()
                    && hint > policy.max_retry_after()
                {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        retry_after = ?hint,
                        max_retry_after = ?policy.max_retry_after(),
                        "Rate limit wait exceeds budget, giving up"
                    );
                } else if e.is_transient() {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                }
                return Attempts {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(base_ms: u64, max_ms: u64, jitter: f64) -> BackoffPolicy {
        BackoffPolicy::new(
            5,
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            jitter,
        )
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = policy(100, 10_000, 0.0);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy(500, 2_000, 0.0);
        assert_eq!(p.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(30), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(1_000, 1_000, 0.2);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let d = p.jittered(Duration::from_secs(1), &mut rng);
            assert!(d >= Duration::from_millis(800), "{:?}", d);
            assert!(d <= Duration::from_millis(1_200), "{:?}", d);
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let p = policy(100, 1_000, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            p.jittered(Duration::from_millis(300), &mut rng),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn only_transient_errors_within_cap_retry() {
        let p = BackoffPolicy::immediate(3);
        assert!(p.should_retry(1, &Error::transient("503")));
        assert!(p.should_retry(2, &Error::rate_limited("429", None)));
        assert!(!p.should_retry(3, &Error::transient("503")));
        assert!(!p.should_retry(1, &Error::auth("403")));
        assert!(!p.should_retry(1, &Error::not_found("gone")));
    }

    #[test]
    fn attempts_floor_is_one() {
        assert_eq!(BackoffPolicy::immediate(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn transient_then_success_reports_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry_transient(&BackoffPolicy::immediate(4), "test", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Error::transient("connection reset"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: Attempts<()> = retry_transient(&BackoffPolicy::immediate(4), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::auth("invalid token"))
            }
        })
        .await;

        assert!(matches!(outcome.result, Err(Error::Authentication(_))));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let outcome: Attempts<()> = retry_transient(&BackoffPolicy::immediate(3), "test", || async {
            Err(Error::transient("502 Bad Gateway"))
        })
        .await;

        assert!(matches!(outcome.result, Err(Error::Transient(_))));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn rate_limit_hint_raises_delay() {
        let p = BackoffPolicy::new(2, Duration::ZERO, Duration::from_millis(200), 0.0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let outcome = retry_transient(&p, "test", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::rate_limited("429", Some(Duration::from_millis(30))))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 2);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn rate_limit_hint_is_honored_past_backoff_cap() {
        let p = BackoffPolicy::new(2, Duration::ZERO, Duration::from_millis(50), 0.0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let outcome = retry_transient(&p, "test", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::rate_limited("429", Some(Duration::from_millis(400))))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 2);
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn rate_limit_hint_over_budget_gives_up() {
        let p = BackoffPolicy::immediate(4).with_max_retry_after(Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let outcome: Attempts<()> = retry_transient(&p, "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::rate_limited("429", Some(Duration::from_secs(120))))
            }
        })
        .await;

        assert!(matches!(outcome.result, Err(Error::RateLimited { .. })));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn hint_budget_applies_only_to_rate_limits() {
        let p = BackoffPolicy::immediate(3).with_max_retry_after(Duration::from_secs(10));
        assert!(p.should_retry(1, &Error::rate_limited("429", Some(Duration::from_secs(10)))));
        assert!(!p.should_retry(1, &Error::rate_limited("429", Some(Duration::from_secs(11)))));
        assert!(p.should_retry(1, &Error::rate_limited("429", None)));
        assert!(p.should_retry(1, &Error::transient("503")));
    }
}
