//! The resource lifecycle waiter.
//!
//! [`wait_until`] repeatedly runs a fetch operation until a terminal
//! predicate holds, bounded by a wall-clock deadline and cancellable via a
//! [`CancellationToken`]. [`wait_until_or_else`] additionally runs a
//! compensating action exactly once when the deadline elapses.
//!
//! The waiter owns no shared state; policies are per-call values, and
//! independent wait calls can run concurrently against the same API.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Deadline and poll cadence for a single wait call.
///
/// Both durations must be strictly positive; violating this is a
/// configuration error caught at construction, never at poll time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawWaitPolicy")]
pub struct WaitPolicy {
    deadline: Duration,
    interval: Duration,
}

impl WaitPolicy {
    /// Creates a policy, rejecting non-positive durations.
    pub fn new(deadline: Duration, interval: Duration) -> Result<Self, InvalidWaitPolicy> {
        if deadline.is_zero() {
            return Err(InvalidWaitPolicy::Deadline);
        }
        if interval.is_zero() {
            return Err(InvalidWaitPolicy::Interval);
        }
        Ok(Self { deadline, interval })
    }

    /// The total time budget for the wait call.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// The sleep between poll attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Deserialize)]
struct RawWaitPolicy {
    #[serde(with = "humantime_serde")]
    deadline: Duration,
    #[serde(with = "humantime_serde")]
    interval: Duration,
}

impl TryFrom<RawWaitPolicy> for WaitPolicy {
    type Error = InvalidWaitPolicy;

    fn try_from(raw: RawWaitPolicy) -> Result<Self, InvalidWaitPolicy> {
        Self::new(raw.deadline, raw.interval)
    }
}

/// Rejected [`WaitPolicy`] configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidWaitPolicy {
    /// The deadline was zero.
    #[error("wait deadline must be strictly positive")]
    Deadline,
    /// The poll interval was zero.
    #[error("poll interval must be strictly positive")]
    Interval,
}

/// Terminal failure of a wait call.
///
/// All variants are distinguishable to the caller; timeouts carry the last
/// observed state for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<S: fmt::Debug> {
    /// The fetch operation failed for a reason other than a recognized
    /// terminal signal. Surfaced immediately, never retried internally.
    #[error("fetch failed while waiting: {0}")]
    Fetch(#[source] Error),
    /// The deadline elapsed before the terminal predicate held.
    #[error("timed out after {elapsed:?}; last observed state: {last:?}")]
    TimedOut {
        /// Wall-clock time spent waiting.
        elapsed: Duration,
        /// The state observed by the final fetch.
        last: S,
        /// Failure of the compensating action, if one ran and failed.
        ///
        /// This never substitutes for the timeout itself; both are surfaced.
        #[source]
        compensation: Option<Error>,
    },
    /// The caller's cancellation token fired, distinct from a timeout.
    #[error("wait cancelled")]
    Cancelled,
}

/// Polls `fetch` until `is_terminal` holds for the observed state.
///
/// At least one fetch is always performed. A fetch error is returned
/// immediately as [`WaitError::Fetch`]. The deadline is enforced by
/// wall-clock comparison before and after each sleep, so variable fetch
/// latency overshoots by at most one poll interval plus one fetch duration.
/// The waiter always sleeps between attempts, and stops promptly with
/// [`WaitError::Cancelled`] when the token fires.
pub async fn wait_until<S, F, Fut, P>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
    mut is_terminal: P,
) -> Result<S, WaitError<S>>
where
    S: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, Error>>,
    P: FnMut(&S) -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.deadline();

    loop {
        let observed = tokio::select! {
            observed = fetch() => observed.map_err(WaitError::Fetch)?,
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
        };

        if is_terminal(&observed) {
            return Ok(observed);
        }

        if Instant::now() >= deadline {
            return Err(WaitError::TimedOut {
                elapsed: started.elapsed(),
                last: observed,
                compensation: None,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(policy.interval()) => {}
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
        }

        if Instant::now() >= deadline {
            return Err(WaitError::TimedOut {
                elapsed: started.elapsed(),
                last: observed,
                compensation: None,
            });
        }
    }
}

/// Like [`wait_until`], but runs `compensate` exactly once when the wait
/// times out.
///
/// The compensating action is best-effort: its failure is logged and
/// attached to the [`WaitError::TimedOut`] variant, and never changes the
/// reported outcome kind. It does not run on the fetch-error or cancelled
/// paths.
pub async fn wait_until_or_else<S, F, Fut, P, C, CFut>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    fetch: F,
    is_terminal: P,
    compensate: C,
) -> Result<S, WaitError<S>>
where
    S: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, Error>>,
    P: FnMut(&S) -> bool,
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<(), Error>>,
{
    match wait_until(policy, cancel, fetch, is_terminal).await {
        Err(WaitError::TimedOut { elapsed, last, .. }) => {
            let compensation = compensate().await.err();
            if let Some(error) = &compensation {
                tracing::warn!(%error, "compensating action failed after wait timeout");
            }
            Err(WaitError::TimedOut {
                elapsed,
                last,
                compensation,
            })
        }
        outcome => outcome,
    }
}
