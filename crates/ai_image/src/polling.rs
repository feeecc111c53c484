//! Bounded status polling
//!
//! Used by create-task backends: a task is created once, then a status
//! endpoint is polled on a fixed interval until it reports a terminal state
//! or the budget runs out.
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_image::polling::{PollPolicy, PollStatus, poll_until};
//!
//! let policy = PollPolicy::new(Duration::from_secs(3), Duration::from_secs(120));
//! let url = poll_until(&policy, "kie.ai", || async {
//!     match fetch_state().await? {
//!         State::Success(url) => Ok(PollStatus::Done(url)),
//!         State::Waiting => Ok(PollStatus::Pending),
//!     }
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Interval and overall budget for one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each poll
    pub interval: Duration,
    /// Total time after which the job is abandoned
    pub budget: Duration,
}

impl PollPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(interval: Duration, budget: Duration) -> Self {
        Self { interval, budget }
    }

    /// Create a policy from millisecond values as stored in configuration
    #[must_use]
    pub const fn from_millis(interval_ms: u64, budget_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(budget_ms),
        )
    }
}

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Not finished yet, poll again
    Pending,
    /// Terminal success
    Done(T),
}

/// Poll until the operation reports `Done`, fails, or the budget elapses
///
/// Each round sleeps one interval, then polls. Poll errors that are not
/// terminal should be mapped to `PollStatus::Pending` by the caller; any
/// `Err` returned by `poll` ends the loop immediately.
///
/// Returns within `[budget, budget + interval]` when the backend never
/// finishes; a poll still in flight at that point is dropped.
///
/// # Errors
///
/// Returns the error produced by `poll`, or `ProviderError::Timeout` when the
/// budget is exhausted.
pub async fn poll_until<F, Fut, T>(
    policy: &PollPolicy,
    label: &str,
    mut poll: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, ProviderError>>,
{
    let start = Instant::now();
    let deadline = start + policy.budget + policy.interval;
    let mut polls = 0u32;

    loop {
        tokio::time::sleep(policy.interval).await;
        polls += 1;

        // A slow poll must not carry the loop past the deadline
        let Ok(status) = tokio::time::timeout_at(deadline, poll()).await else {
            warn!(label, polls, budget = ?policy.budget, "Poll still running at deadline");
            return Err(budget_exhausted(label, policy));
        };

        if let PollStatus::Done(value) = status? {
            debug!(
                label,
                polls,
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Polling finished"
            );
            return Ok(value);
        }

        if start.elapsed() >= policy.budget {
            warn!(label, polls, budget = ?policy.budget, "Polling budget exhausted");
            return Err(budget_exhausted(label, policy));
        }
    }
}

fn budget_exhausted(label: &str, policy: &PollPolicy) -> ProviderError {
    ProviderError::Timeout(format!(
        "{label} did not finish within {}s",
        policy.budget.as_secs_f64()
    ))
}
