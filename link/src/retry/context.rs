use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};

/// Mutable counters for one logical request and its retries.
///
/// Created by the engine per `send` and dropped with the outcome; never
/// shared between requests.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Number of the attempt currently in flight, from 1.
    pub attempt: u32,
    pub temp_unavailable_count: u32,
    pub rate_limit_count: u32,
    /// `Retry-After` of the latest response, or -1 when it had none.
    pub last_retry_interval_secs: i64,
    started: Instant,
}

impl RetryContext {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            temp_unavailable_count: 0,
            rate_limit_count: 0,
            last_retry_interval_secs: -1,
            started: Instant::now(),
        }
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Update the class counters from a response status and its `Retry-After`.
    pub(crate) fn record_status(&mut self, status: u16, retry_after: Option<u64>) {
        match status {
            503 => self.temp_unavailable_count += 1,
            429 => self.rate_limit_count += 1,
            _ => {},
        }
        self.last_retry_interval_secs = retry_after
            .map(|secs| i64::try_from(secs).unwrap_or(i64::MAX))
            .unwrap_or(-1);
    }

    pub(crate) fn record_network(&mut self) {
        self.last_retry_interval_secs = -1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit per-call context: which statement the call belongs to, the
/// caller's overall deadline and the token that interrupts waits.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    statement_id: Option<String>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statement(mut self, statement_id: impl Into<String>) -> Self {
        self.statement_id = Some(statement_id.into());
        self
    }

    /// Start the overall budget now; `None` leaves the request unbounded.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.deadline = budget.map(|budget| Instant::now() + budget);
        self
    }

    /// Share a deadline started elsewhere, e.g. by the statement's first call.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn statement_id(&self) -> Option<&str> {
        self.statement_id.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_past_deadline(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    /// Shrink a per-attempt timeout so it never outlives the deadline.
    /// Returns `None` once the deadline has passed.
    pub fn clamp_timeout(&self, timeout: Duration) -> Option<Duration> {
        match self.remaining() {
            None => Some(timeout),
            Some(remaining) if remaining.is_zero() => None,
            Some(remaining) => Some(timeout.min(remaining)),
        }
    }

    /// Whether waiting `delay` from now would still leave time for another attempt.
    pub fn fits_before_deadline(&self, delay: Duration) -> bool {
        self.remaining().map_or(true, |remaining| delay < remaining)
    }

    /// Sleep for `delay` unless the context is cancelled first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return if self.cancel.is_cancelled() {
                Err(LinkError::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
