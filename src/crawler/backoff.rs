//! Rate-limit backoff policy
//!
//! Every remote call goes through [`BackoffPolicy::call`], which loops over
//! attempts and asks [`BackoffPolicy::decide`] what to do after each failure:
//!
//! | Error | Action |
//! |-------|--------|
//! | Transient | Retry the identical request after an exponential delay, up to `max_attempts` |
//! | QuotaExhausted | Sleep until the next window boundary, or yield if that is past the deadline |
//! | Unauthorized / NotFound | Terminal, never retried |
//!
//! Quota waits do not count as attempts.

use crate::api::{ApiError, ApiResult};
use crate::config::CrawlerConfig;
use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Repeat the identical request after the given delay
    Retry(Duration),

    /// Suspend until the quota window resets, then repeat the request
    WaitForWindow { until: DateTime<Utc>, wait: Duration },

    /// Quota is spent and the window resets too late; hand control back
    Yield,

    /// Transient failures used up every attempt
    GiveUp,

    /// The error cannot be fixed by retrying
    Terminal,
}

/// Final result of a call driven by the policy
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),

    /// Quota exhausted and the caller's deadline does not allow waiting
    QuotaExhausted,

    /// Unauthorized or NotFound
    Terminal(ApiError),

    RetriesExhausted { attempts: u32, last_error: ApiError },
}

/// Retry and quota-wait policy shared by all remote calls of a worker
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_attempts: u32,
    retry_delay: Duration,
    quota_window: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration, quota_window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            quota_window: quota_window.max(Duration::from_secs(1)),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_secs(config.quota_window_secs),
        )
    }

    /// Delay before retrying after the `attempt`-th transient failure
    ///
    /// Doubles with every attempt and never exceeds the quota window.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.quota_window)
    }

    /// Decides how to continue after a failed attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - Transient failures so far, including this one
    /// * `error` - The failure of the latest attempt
    /// * `now` - Current wall-clock time
    /// * `time_left` - Time until the caller's deadline, `None` for no deadline
    pub fn decide(
        &self,
        attempt: u32,
        error: &ApiError,
        now: DateTime<Utc>,
        time_left: Option<Duration>,
    ) -> Decision {
        match error {
            ApiError::Unauthorized(_) | ApiError::NotFound(_) => Decision::Terminal,
            ApiError::Transient(_) => {
                if attempt >= self.max_attempts {
                    Decision::GiveUp
                } else {
                    Decision::Retry(self.retry_delay(attempt))
                }
            }
            ApiError::QuotaExhausted => {
                let until = next_window_boundary(now, self.quota_window);
                let wait = (until - now).to_std().unwrap_or(Duration::ZERO);

                match time_left {
                    Some(left) if wait > left => Decision::Yield,
                    _ => Decision::WaitForWindow { until, wait },
                }
            }
        }
    }

    /// Runs `op` until it succeeds or the policy stops it
    ///
    /// `op` is invoked again for every retry and must issue the identical
    /// request each time.
    pub async fn call<T, F, Fut>(&self, deadline: Option<Instant>, mut op: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempt = 0;

        loop {
            let error = match op().await {
                Ok(value) => return CallOutcome::Success(value),
                Err(error) => error,
            };

            if !matches!(error, ApiError::QuotaExhausted) {
                attempt += 1;
            }

            let time_left = deadline.map(|d| d.saturating_duration_since(Instant::now()));

            match self.decide(attempt, &error, Utc::now(), time_left) {
                Decision::Retry(delay) => {
                    tracing::debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Decision::WaitForWindow { until, wait } => {
                    tracing::info!("Quota exhausted, waiting {:?} until {}", wait, until);
                    tokio::time::sleep(wait).await;
                }
                Decision::Yield => {
                    tracing::info!("Quota exhausted and the window resets after the deadline");
                    return CallOutcome::QuotaExhausted;
                }
                Decision::GiveUp => {
                    return CallOutcome::RetriesExhausted {
                        attempts: attempt,
                        last_error: error,
                    };
                }
                Decision::Terminal => return CallOutcome::Terminal(error),
            }
        }
    }
}

/// First quota-window boundary strictly after `now`
///
/// Windows are fixed-length and aligned to the Unix epoch.
pub fn next_window_boundary(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_secs = window.as_secs().max(1) as i64;
    let next = (now.timestamp().div_euclid(window_secs) + 1) * window_secs;

    Utc.timestamp_opt(next, 0)
        .single()
        .unwrap_or(now + chrono::Duration::seconds(window_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_millis(100), Duration::from_secs(180))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_window_boundary_is_epoch_aligned() {
        let window = Duration::from_secs(180);
        assert_eq!(next_window_boundary(at(1000), window), at(1080));
        assert_eq!(next_window_boundary(at(1079), window), at(1080));
        // Exactly on a boundary waits for the following one
        assert_eq!(next_window_boundary(at(1080), window), at(1260));
    }

    #[test]
    fn test_transient_retries_until_max_attempts() {
        let policy = policy();
        let error = ApiError::Transient("502".to_string());

        assert_eq!(
            policy.decide(1, &error, at(0), None),
            Decision::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(2, &error, at(0), None),
            Decision::Retry(Duration::from_millis(200))
        );
        assert_eq!(policy.decide(3, &error, at(0), None), Decision::GiveUp);
    }

    #[test]
    fn test_retry_delay_capped_at_window() {
        let policy = BackoffPolicy::new(30, Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(policy.retry_delay(1), Duration::from_secs(10));
        assert_eq!(policy.retry_delay(3), Duration::from_secs(40));
        assert_eq!(policy.retry_delay(4), Duration::from_secs(60));
        assert_eq!(policy.retry_delay(25), Duration::from_secs(60));
    }

    #[test]
    fn test_terminal_errors_never_retry() {
        let policy = policy();
        assert_eq!(
            policy.decide(0, &ApiError::NotFound("gone".into()), at(0), None),
            Decision::Terminal
        );
        assert_eq!(
            policy.decide(0, &ApiError::Unauthorized("protected".into()), at(0), None),
            Decision::Terminal
        );
    }

    #[test]
    fn test_quota_waits_when_deadline_allows() {
        let policy = policy();
        let decision = policy.decide(
            0,
            &ApiError::QuotaExhausted,
            at(1000),
            Some(Duration::from_secs(100)),
        );
        assert_eq!(
            decision,
            Decision::WaitForWindow {
                until: at(1080),
                wait: Duration::from_secs(80)
            }
        );
    }

    #[test]
    fn test_quota_yields_past_deadline() {
        let policy = policy();
        let decision = policy.decide(
            0,
            &ApiError::QuotaExhausted,
            at(1000),
            Some(Duration::from_secs(30)),
        );
        assert_eq!(decision, Decision::Yield);
    }

    #[test]
    fn test_quota_without_deadline_always_waits() {
        let policy = policy();
        assert!(matches!(
            policy.decide(0, &ApiError::QuotaExhausted, at(1000), None),
            Decision::WaitForWindow { .. }
        ));
    }

    #[tokio::test]
    async fn test_call_retries_transient_then_succeeds() {
        let policy = BackoffPolicy::new(5, Duration::from_millis(1), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let outcome = policy
            .call(None, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::Transient("flaky".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome, CallOutcome::Success(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_gives_up_after_max_attempts() {
        let policy = BackoffPolicy::new(3, Duration::from_millis(1), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let outcome: CallOutcome<()> = policy
            .call(None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Transient("down".into())) }
            })
            .await;

        assert!(matches!(
            outcome,
            CallOutcome::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_yields_quota_without_sleeping() {
        let policy = BackoffPolicy::new(3, Duration::from_millis(1), Duration::from_secs(600));
        let deadline = Instant::now();

        let outcome: CallOutcome<()> = policy
            .call(Some(deadline), || async { Err(ApiError::QuotaExhausted) })
            .await;

        assert_eq!(outcome, CallOutcome::QuotaExhausted);
    }

    #[tokio::test]
    async fn test_call_stops_on_terminal() {
        let policy = policy();
        let calls = AtomicU32::new(0);

        let outcome: CallOutcome<()> = policy
            .call(None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::NotFound("suspended".into())) }
            })
            .await;

        assert!(matches!(outcome, CallOutcome::Terminal(ApiError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
