//! Bounded retry with a fixed delay.
//!
//! One policy is shared by every source adapter. An operation yields
//! `Ok(Some(_))` for data, `Ok(None)` for "no data yet" and `Err(_)` for a
//! failure; transient failures and empty results are retried under the
//! same bound.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Failures that may clear up if the operation is simply tried again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Wait between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Run `op` under `policy`.
///
/// Returns the first `Some` value, `Ok(None)` once every attempt came back
/// empty, the last error once transient failures exhaust the bound, or a
/// non-transient error straight away. Never sleeps after the final attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let exhausted = attempt >= max_attempts;

        match op().await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) if exhausted => {
                warn!(label, attempts = attempt, "No data after all attempts");
                return Ok(None);
            }
            Ok(None) => {
                debug!(label, attempt, "Empty result, retrying");
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if exhausted => {
                error!(label, attempts = attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                warn!(label, attempt, max_attempts, error = %e, "Transient failure, retrying");
            }
        }

        tokio::time::sleep(policy.delay).await;
    }
}
