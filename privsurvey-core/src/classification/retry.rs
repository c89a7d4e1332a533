//! Bounded retry for remote classifier calls.
//!
//! The retry policy is an explicit state machine ([`RetryState`]) with a
//! deterministic, jitter-free exponential schedule. [`run_with_retry`] is the
//! only piece that suspends: it applies the per-call timeout and sleeps for
//! whatever delay the state machine yields.

use crate::config::RetryConfig;
use crate::error::ClassifierError;
use std::future::Future;
use std::time::Duration;

/// Validated backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one attempt.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        multiplier: f64,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `failed_attempt`-th failure:
    /// `initial * multiplier^(failed_attempt - 1)`, capped at the maximum.
    pub fn backoff_after(&self, failed_attempt: u32) -> Duration {
        let exponent = i32::try_from(failed_attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.max_backoff
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.multiplier,
            config.max_backoff(),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// State of one bounded retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is about to run
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed transiently; wait `delay` before the next one
    Retrying { attempt: u32, delay: Duration },
    /// No further attempts will be made
    Exhausted { attempts: u32 },
}

impl RetryState {
    /// Initial state.
    pub fn start() -> Self {
        Self::Attempting { attempt: 1 }
    }

    /// Transition after the current attempt failed.
    ///
    /// Permanent failures and the final attempt move to `Exhausted`;
    /// transient failures with attempts left move to `Retrying`.
    pub fn on_failure(self, policy: &RetryPolicy, transient: bool) -> Self {
        match self {
            Self::Attempting { attempt } if transient && attempt < policy.max_attempts() => {
                Self::Retrying {
                    attempt,
                    delay: policy.backoff_after(attempt),
                }
            }
            Self::Attempting { attempt } => Self::Exhausted { attempts: attempt },
            other => other,
        }
    }

    /// Transition once the backoff delay has elapsed.
    pub fn next(self) -> Self {
        match self {
            Self::Retrying { attempt, .. } => Self::Attempting {
                attempt: attempt.saturating_add(1),
            },
            other => other,
        }
    }
}

/// Last error of a retry sequence that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Error of the final attempt
    pub error: ClassifierError,
    /// Attempts made, the failed final one included
    pub attempts: u32,
}

/// Runs `operation` under `policy`, applying `call_timeout` to every attempt.
///
/// `operation` receives the 1-based attempt number. A timed out attempt
/// counts as a transient [`ClassifierError::Timeout`].
pub async fn run_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    call_timeout: Duration,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClassifierError>>,
{
    let mut state = RetryState::start();
    loop {
        let RetryState::Attempting { attempt } = state else {
            // on_failure/next only ever hand back Attempting here
            return Err(RetryFailure {
                error: ClassifierError::Protocol("retry state machine stalled".to_string()),
                attempts: 0,
            });
        };

        let error = match tokio::time::timeout(call_timeout, operation(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => ClassifierError::Timeout(
                u64::try_from(call_timeout.as_millis()).unwrap_or(u64::MAX),
            ),
        };

        state = state.on_failure(policy, error.is_transient());
        match state {
            RetryState::Retrying { attempt, delay } => {
                tracing::debug!(
                    "Classifier attempt {} of {} failed ({}); retrying in {:?}",
                    attempt,
                    policy.max_attempts(),
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                state = state.next();
            }
            RetryState::Exhausted { attempts } => {
                return Err(RetryFailure { error, attempts });
            }
            RetryState::Attempting { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            4,
            Duration::from_millis(500),
            2.0,
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_backoff_schedule_is_deterministic_and_capped() {
        let policy = policy();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(1500));
        assert_eq!(policy.backoff_after(30), Duration::from_millis(1500));
    }

    #[test]
    fn test_state_machine_transitions() {
        let policy = policy();
        let state = RetryState::start();
        assert_eq!(state, RetryState::Attempting { attempt: 1 });

        let state = state.on_failure(&policy, true);
        assert_eq!(
            state,
            RetryState::Retrying {
                attempt: 1,
                delay: Duration::from_millis(500)
            }
        );
        let state = state.next();
        assert_eq!(state, RetryState::Attempting { attempt: 2 });

        // Permanent failure stops immediately
        assert_eq!(
            state.on_failure(&policy, false),
            RetryState::Exhausted { attempts: 2 }
        );

        // Last attempt exhausts even when transient
        assert_eq!(
            RetryState::Attempting { attempt: 4 }.on_failure(&policy, true),
            RetryState::Exhausted { attempts: 4 }
        );

        // Terminal state is sticky
        let done = RetryState::Exhausted { attempts: 4 };
        assert_eq!(done.next(), done);
        assert_eq!(done.on_failure(&policy, true), done);
    }

    #[test]
    fn test_policy_from_config_clamps() {
        let policy = RetryPolicy::from(&RetryConfig::new().with_max_attempts(0));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = tokio::time::Instant::now();

        let result = run_with_retry(&policy(), Duration::from_secs(5), |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(ClassifierError::RateLimited)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = run_with_retry(&policy(), Duration::from_secs(5), |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClassifierError::Server { status: 503 })
            }
        })
        .await;

        assert_eq!(
            result,
            Err(RetryFailure {
                error: ClassifierError::Server { status: 503 },
                attempts: 4
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = run_with_retry(&policy(), Duration::from_secs(5), |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClassifierError::Authentication { status: 401 })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out_and_is_retried() {
        let result = run_with_retry(&policy(), Duration::from_millis(100), |attempt| async move {
            if attempt == 1 {
                std::future::pending::<()>().await;
            }
            Ok::<_, ClassifierError>(attempt)
        })
        .await;

        assert_eq!(result, Ok(2));
    }
}
