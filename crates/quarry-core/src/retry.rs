//! Bounded exponential-backoff retry around one remote call.
//!
//! Every attempt is classified into a [`CallOutcome`]; what happens next is
//! decided by [`decide`], a pure function of the outcome, the attempt index and
//! the [`RetryPolicy`]. [`RetryingCaller`] only executes those decisions.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Exponential base applied per attempt.
    pub backoff_base: f64,
    /// Delay unit multiplied by `backoff_base ^ attempt`.
    pub backoff_unit: Duration,
    /// Timeout applied to each individual attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Delay before the attempt following `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.backoff_unit
            .mul_f64(self.backoff_base.powi(exponent).min(f64::from(u32::MAX)))
    }
}

/// Classified result of one attempt.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    TransientFailure(AppError),
    PermanentFailure(AppError),
}

impl<T> CallOutcome<T> {
    pub fn classify(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(e) if e.is_retryable() => CallOutcome::TransientFailure(e),
            Err(e) => CallOutcome::PermanentFailure(e),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The call succeeded.
    Done,
    /// Sleep `delay`, then run attempt `next_attempt`.
    Retry { delay: Duration, next_attempt: u32 },
    /// Permanent failure; return it unchanged.
    Fail,
    /// Transient failure on the last allowed attempt.
    Exhausted,
}

/// Decide the next step after `attempt` (0-indexed) produced `outcome`.
#[must_use]
pub fn decide<T>(outcome: &CallOutcome<T>, attempt: u32, policy: &RetryPolicy) -> RetryDecision {
    match outcome {
        CallOutcome::Success(_) => RetryDecision::Done,
        CallOutcome::PermanentFailure(_) => RetryDecision::Fail,
        CallOutcome::TransientFailure(_) if attempt + 1 >= policy.max_attempts => {
            RetryDecision::Exhausted
        }
        CallOutcome::TransientFailure(_) => RetryDecision::Retry {
            delay: policy.delay_for_attempt(attempt),
            next_attempt: attempt + 1,
        },
    }
}

/// Executes remote calls under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryingCaller {
    policy: RetryPolicy,
}

impl RetryingCaller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` is invoked once per attempt. Quota is not charged here.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.policy.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(self.policy.call_timeout.as_secs())),
            };

            let outcome = CallOutcome::classify(result);
            match decide(&outcome, attempt, &self.policy) {
                RetryDecision::Done | RetryDecision::Fail => {
                    return match outcome {
                        CallOutcome::Success(value) => Ok(value),
                        CallOutcome::TransientFailure(e) | CallOutcome::PermanentFailure(e) => {
                            Err(e)
                        }
                    };
                }
                RetryDecision::Exhausted => {
                    let last_error = match outcome {
                        CallOutcome::TransientFailure(e) | CallOutcome::PermanentFailure(e) => {
                            e.to_string()
                        }
                        CallOutcome::Success(_) => String::new(),
                    };
                    tracing::error!(label, attempts = attempt + 1, %last_error, "Retries exhausted");
                    return Err(AppError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error,
                    });
                }
                RetryDecision::Retry {
                    delay,
                    next_attempt,
                } => {
                    if let CallOutcome::TransientFailure(e) = &outcome {
                        tracing::warn!(
                            label,
                            attempt = next_attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient failure, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
            }
        }
    }
}
