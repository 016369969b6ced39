//! Outcome model: common result format for backend calls.
//!
//! Every backend call inside a retry loop reports one of three things:
//! it worked, it failed in a way another attempt may fix, or it failed in a
//! way that ends the loop. `retry::run_bounded` is the only code that counts
//! attempts; callers just classify.

use serde::{Deserialize, Serialize};

/// Classification of an attempt result.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / RETRYABLE / TERMINAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Retryable,
    Terminal,
}

/// Result of one attempt.
///
/// - `Success`: carries the produced value.
/// - `Retryable`: this attempt failed; the next attempt may succeed.
/// - `Terminal`: stop attempting; no further attempt in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Retryable(String),
    Terminal(String),
}

impl<T> Outcome<T> {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Outcome::Retryable(reason.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Outcome::Terminal(reason.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Retryable(_) => OutcomeKind::Retryable,
            Outcome::Terminal(_) => OutcomeKind::Terminal,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Retryable(r) | Outcome::Terminal(r) => Some(r),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Retryable(r) => Outcome::Retryable(r),
            Outcome::Terminal(r) => Outcome::Terminal(r),
        }
    }
}
