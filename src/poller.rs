//! Bounded polling for run completion.
//!
//! [`RunPoller::await_completion`] waits for a remote run to finish by
//! re-checking its status at a fixed interval. Every iteration fetches the
//! run status and the thread's message list together, so the messages are
//! already in hand the moment completion is observed.
//!
//! The wait is always bounded: `max_attempts × interval` is the upper bound
//! on wall-clock time, and a [`CancellationToken`] can end it earlier.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::assistant::{MessageList, MessageSource, RunId, RunStatus, RunStatusSource, ThreadId};
use crate::error::TransportError;

/// Attempt budget and spacing for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    max_attempts: NonZeroU32,
    interval: Duration,
}

/// Rejected poll configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("max_attempts must be at least 1")]
pub struct InvalidPollConfig;

impl PollConfig {
    /// Default attempt budget (12 × 2.5s ≈ 30s).
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;
    /// Default spacing between attempts.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2500);

    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self, InvalidPollConfig> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or(InvalidPollConfig)?;
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total sleep time of a wait that runs out of attempts, excluding
    /// request latency. Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts.get() - 1)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN.saturating_add(Self::DEFAULT_MAX_ATTEMPTS - 1),
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

/// Result of one [`RunPoller::await_completion`] call.
#[derive(Debug)]
pub enum PollOutcome {
    /// The run completed; carries the messages fetched on that iteration.
    Success(MessageList),
    /// A status or message fetch failed. The wait stopped at that iteration.
    FetchError(TransportError),
    /// The attempt budget ran out before the run completed.
    Timeout {
        /// Number of iterations performed.
        attempts: u32,
    },
    /// The run ended as `failed`, `cancelled` or `expired`.
    RunTerminated {
        /// Status the run ended in.
        status: RunStatus,
    },
    /// The caller's cancellation token fired.
    Cancelled,
}

impl PollOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::FetchError(_) => "fetch_error",
            Self::Timeout { .. } => "timeout",
            Self::RunTerminated { .. } => "run_terminated",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Waits for remote runs to complete.
///
/// Holds only the two read capabilities; every wait is independent and
/// all per-wait state lives on the stack of [`RunPoller::await_completion`].
#[derive(Clone)]
pub struct RunPoller {
    status: Arc<dyn RunStatusSource>,
    messages: Arc<dyn MessageSource>,
}

impl std::fmt::Debug for RunPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPoller").finish_non_exhaustive()
    }
}

impl RunPoller {
    pub fn new(status: Arc<dyn RunStatusSource>, messages: Arc<dyn MessageSource>) -> Self {
        Self { status, messages }
    }

    /// Poll until the run completes, a fetch fails, the run ends without a
    /// result, the budget is spent, or `cancel` fires.
    ///
    /// Each iteration joins the status fetch and the message fetch; the
    /// decision is made only once both have answered. No sleep follows the
    /// final attempt.
    #[instrument(
        skip_all,
        fields(
            thread_id = %thread_id,
            run_id = %run_id,
            max_attempts = config.max_attempts(),
            interval_ms = config.interval().as_millis() as u64
        )
    )]
    pub async fn await_completion(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let max_attempts = config.max_attempts();
        let mut attempt = 0;

        while attempt < max_attempts {
            let fetch = async {
                tokio::try_join!(
                    self.status.fetch_run_status(thread_id, run_id),
                    self.messages.fetch_messages(thread_id),
                )
            };

            let (status, messages) = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempt, "poll cancelled while fetching");
                    return PollOutcome::Cancelled;
                }
                fetched = fetch => match fetched {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(attempt = attempt + 1, error = %err, "error retrieving run state");
                        return PollOutcome::FetchError(err);
                    }
                },
            };
            attempt += 1;

            if status.is_completed() {
                debug!(attempt, "run completed");
                return PollOutcome::Success(messages);
            }
            if status.is_terminal_failure() {
                warn!(attempt, %status, "run ended without completing");
                return PollOutcome::RunTerminated { status };
            }

            debug!(attempt, %status, "run pending");
            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempt, "poll cancelled while waiting");
                    return PollOutcome::Cancelled;
                }
                () = tokio::time::sleep(config.interval()) => {}
            }
        }

        warn!(attempts = attempt, "run did not complete within the attempt budget");
        PollOutcome::Timeout { attempts: attempt }
    }
}
