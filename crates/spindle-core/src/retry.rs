//! Retry: the bounded-attempt driver and the backoff policy.
//!
//! Callers classify each attempt as an `Outcome`; this module is the only place
//! that counts attempts. Infrastructure errors (`Err(E)`) are not attempts: they
//! abort the loop immediately and propagate to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::domain::Outcome;

/// Retry policy for operations that should back off between attempts.
///
/// Used for persistence connectivity, which used to retry forever with no delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,

    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// No delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay before the retry that follows attempt number `attempts` (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay`.
    ///
    /// Example with base_delay=200ms, multiplier=2.0:
    /// - attempt 1 failed: 200ms
    /// - attempt 2 failed: 400ms
    /// - attempt 3 failed: 800ms
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

/// How a bounded attempt loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempted<T> {
    Succeeded { value: T, attempts: u32 },

    /// Every attempt was retryable and the budget ran out.
    Exhausted {
        attempts: u32,
        last_reason: Option<String>,
    },

    /// An attempt reported a terminal failure.
    Stopped { attempts: u32, reason: String },
}

impl<T> Attempted<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Attempted::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Attempted::Succeeded { attempts, .. }
            | Attempted::Exhausted { attempts, .. }
            | Attempted::Stopped { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Attempted::Succeeded { .. })
    }

    /// Why the loop did not succeed.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Attempted::Succeeded { .. } => None,
            Attempted::Exhausted { last_reason, .. } => last_reason.as_deref(),
            Attempted::Stopped { reason, .. } => Some(reason),
        }
    }
}

/// Run `attempt` up to `max_attempts` times with no delay in between.
///
/// `attempt` receives the 1-indexed attempt number.
pub async fn run_bounded<T, E, F, Fut>(max_attempts: u32, attempt: F) -> Result<Attempted<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Outcome<T>, E>>,
{
    drive(&RetryPolicy::immediate(max_attempts), attempt).await
}

/// Run `attempt` under `policy`, sleeping `policy.next_delay(n)` after each retryable failure.
pub async fn run_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    attempt: F,
) -> Result<Attempted<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Outcome<T>, E>>,
{
    drive(policy, attempt).await
}

async fn drive<T, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<Attempted<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Outcome<T>, E>>,
{
    let mut last_reason = None;

    for n in 1..=policy.max_attempts {
        match attempt(n).await? {
            Outcome::Success(value) => {
                return Ok(Attempted::Succeeded { value, attempts: n });
            }
            Outcome::Terminal(reason) => {
                return Ok(Attempted::Stopped { attempts: n, reason });
            }
            Outcome::Retryable(reason) => {
                debug!(attempt = n, max_attempts = policy.max_attempts, %reason, "attempt failed");
                last_reason = Some(reason);
                if n < policy.max_attempts {
                    let delay = policy.next_delay(n);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    Ok(Attempted::Exhausted {
        attempts: policy.max_attempts,
        last_reason,
    })
}
