//! Bounded retry loops with fixed delays.
//!
//! Reclaiming the display or the input devices right after an external
//! process exits can fail for a while: the kernel releases its resources
//! asynchronously. Every such step goes through [`retry`], which gives up
//! after a fixed number of attempts and returns the [`HandoffAttempt`]
//! record instead of panicking.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::KioskError;

/// Number of attempts and delay between two of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_millis(attempts: u32, delay_ms: u64) -> Self {
        Self::new(attempts, Duration::from_millis(delay_ms))
    }

    /// Single attempt, no delay.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(10, 100)
    }
}

/// Record of an exhausted reacquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffAttempt {
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl HandoffAttempt {
    pub fn into_error(self, what: &str) -> KioskError {
        KioskError::handoff_failure(format!(
            "{what} failed after {} attempts: {}",
            self.retry_count,
            self.last_error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Runs `op` until it succeeds or the policy is exhausted.
pub fn retry<T>(
    policy: RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Result<T, KioskError>,
) -> Result<T, HandoffAttempt> {
    let mut attempt = HandoffAttempt::default();
    let attempts = policy.attempts.max(1);

    loop {
        match op() {
            Ok(value) => {
                if attempt.retry_count > 0 {
                    debug!(what, retries = attempt.retry_count, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt.retry_count += 1;
                attempt.last_error = Some(err.to_string());
                if attempt.retry_count >= attempts {
                    warn!(what, attempts, error = %err, "Giving up");
                    return Err(attempt);
                }
                debug!(what, attempt = attempt.retry_count, error = %err, "Retrying");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_succeeds_after_failures() {
        let mut calls = 0;
        let result = retry(RetryPolicy::new(5, Duration::ZERO), "op", || {
            calls += 1;
            if calls < 3 {
                Err(KioskError::resource_unavailable("busy"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_retry_exhaustion_reports_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = retry(RetryPolicy::new(4, Duration::ZERO), "op", || {
            calls += 1;
            Err(KioskError::resource_unavailable("busy"))
        });
        let attempt = result.unwrap_err();
        assert_eq!(calls, 4);
        assert_eq!(attempt.retry_count, 4);
        assert_eq!(attempt.last_error.as_deref(), Some("Resource unavailable: busy"));
        assert!(matches!(
            attempt.into_error("display"),
            KioskError::HandoffFailure(_)
        ));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.attempts, 1);
        let mut calls = 0;
        let _ = retry(policy, "op", || -> Result<(), KioskError> {
            calls += 1;
            Err(KioskError::resource_unavailable("x"))
        });
        assert_eq!(calls, 1);
    }
}
