//! Attempt-bounded polling.
//!
//! Asynchronous provider tasks are observed by calling a check function at a
//! fixed interval. The loop is bounded by attempt count, not wall-clock time,
//! and running out of attempts is an outcome rather than an error: the task
//! may still finish out-of-band.
//!
//! # Example
//!
//! ```ignore
//! use irsa::poll::{poll_with_attempts, PollConfig, PollOutcome};
//!
//! let outcome = poll_with_attempts(&PollConfig::default(), "deletion task", || async {
//!     match iam.deletion_status(&task_id).await? {
//!         status if status.is_terminal() => Ok(Some(status)),
//!         _ => Ok(None),
//!     }
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::Result;

/// Default time between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of status checks before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Polling configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between checks
    pub interval: Duration,
    /// Maximum number of checks (at least one check is always made)
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Create a config with the given interval and attempt budget
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, stop with the value
/// - `Ok(None)` - Not there yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = Result<Option<T>>;

/// How a poll loop ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check function produced a value
    Ready {
        /// Value returned by the check
        value: T,
        /// Number of checks made
        attempts: u32,
    },
    /// The attempt budget ran out first
    Exhausted {
        /// Number of checks made
        attempts: u32,
    },
}

/// Call `check_fn` until it yields a value or the attempt budget is spent.
///
/// Sleeps `config.interval` between checks, never after the last one.
pub async fn poll_with_attempts<T, F, Fut>(
    config: &PollConfig,
    description: &str,
    mut check_fn: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if let Some(value) = check_fn().await? {
            return Ok(PollOutcome::Ready {
                value,
                attempts: attempt,
            });
        }

        if attempt < max_attempts {
            debug!(
                attempt,
                max_attempts,
                "Waiting for {}...", description
            );
            tokio::time::sleep(config.interval).await;
        }
    }

    Ok(PollOutcome::Exhausted {
        attempts: max_attempts,
    })
}
