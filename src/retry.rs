//! # Resubmission Policy
//!
//! A failed external read is resubmitted according to a [`RetryMode`]. This
//! is the equivalent of a job queue's "max submit" setting: transient
//! failures such as a result file that is not yet flushed get another chance,
//! while persistent failures surface after the last attempt.

use crate::error::EnsembleError;
use rand::Rng;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Retry modes for external reads
#[derive(Debug, Clone, PartialEq)]
pub enum RetryMode {
    /// No retries - fail immediately on first error
    None,

    /// Fixed number of retries with constant delay
    Fixed { retries: usize, delay: Duration },

    /// Exponential backoff with optional jitter
    ///
    /// delay = base_delay * multiplier^attempt, capped at max_delay, then
    /// scaled by `1 ± jitter * random_factor`.
    ExponentialBackoff {
        max_retries: usize,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        jitter: f64,
    },
}

impl RetryMode {
    /// Create a fixed retry mode with specified retries and delay
    pub fn fixed(retries: usize, delay: Duration) -> Self {
        Self::Fixed { retries, delay }
    }

    /// Exponential backoff with base 100ms, multiplier 2, cap 30s, jitter 0.1
    pub fn exponential(max_retries: usize) -> Self {
        Self::ExponentialBackoff {
            max_retries,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }

    /// Maximum number of attempts (initial + retries)
    pub fn max_attempts(&self) -> usize {
        match self {
            Self::None => 1,
            Self::Fixed { retries, .. } => retries + 1,
            Self::ExponentialBackoff { max_retries, .. } => max_retries + 1,
        }
    }

    /// Delay before retry number `attempt` (0-based), `None` when exhausted
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { retries, delay } => (attempt < *retries).then_some(*delay),
            Self::ExponentialBackoff {
                max_retries,
                base_delay,
                multiplier,
                max_delay,
                jitter,
            } => {
                if attempt >= *max_retries {
                    return None;
                }
                let base_ms = base_delay.as_millis() as f64;
                let capped = (base_ms * multiplier.powi(attempt as i32))
                    .min(max_delay.as_millis() as f64);

                let jitter = jitter.clamp(0.0, 1.0);
                let factor = if jitter > 0.0 {
                    let random_factor: f64 = rand::rng().random_range(-1.0..=1.0);
                    1.0 + jitter * random_factor
                } else {
                    1.0
                };
                Some(Duration::from_millis((capped * factor).max(0.0) as u64))
            }
        }
    }
}

impl Default for RetryMode {
    /// One resubmission after a short pause
    fn default() -> Self {
        Self::Fixed {
            retries: 1,
            delay: Duration::from_millis(100),
        }
    }
}

/// Run `run_fn` until it succeeds or the retry budget is spent
///
/// Configuration errors and unknown keys are never retried: they will fail
/// the same way every time.
pub async fn run_with_retries<T, F, Fut>(mode: &RetryMode, run_fn: F) -> Result<T, EnsembleError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, EnsembleError>>,
{
    let max_attempts = mode.max_attempts();
    let mut attempt = 0;

    loop {
        match run_fn().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                let permanent = matches!(
                    e,
                    EnsembleError::Configuration(_) | EnsembleError::UnknownKey(_)
                );
                if permanent || attempt >= max_attempts {
                    return Err(e);
                }

                #[cfg(feature = "tracing")]
                warn!(error = %e, attempt, max_attempts, "External read failed, will retry");

                if let Some(delay) = mode.delay_for_attempt(attempt - 1) {
                    #[cfg(feature = "tracing")]
                    debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
