use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::tracker::{StatementTracker, Transition};
use crate::error::{LinkError, Result};
use crate::models::{
    ResultDescriptor, SessionHandle, StatementHandle, StatementState, StatementStatus,
};
use crate::protocol::{sql_preview, ArcProtocolClient, StatementRequest};
use crate::retry::RequestContext;

/// A statement that reached SUCCEEDED.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub handle: StatementHandle,
    pub descriptor: ResultDescriptor,
    /// Deadline started at submission; chunk fetches stay within it.
    pub deadline: Option<Instant>,
}

/// Drives one submitted statement to a terminal state.
///
/// The first poll follows submission immediately; later polls wait the poll
/// interval first. The wait is interruptible through the statement's
/// cancellation token. Submit, every poll and every wait share one overall
/// deadline; once it passes the statement is cancelled on the server.
/// Failed statements are reported, never re-submitted.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    client: ArcProtocolClient,
    tracker: Arc<StatementTracker>,
    poll_interval: Duration,
    overall_timeout: Option<Duration>,
}

impl ExecutionCoordinator {
    pub fn new(client: ArcProtocolClient, tracker: Arc<StatementTracker>) -> Self {
        Self {
            client,
            tracker,
            poll_interval: Duration::from_millis(200),
            overall_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Budget for the whole statement: submission, polling and retries.
    pub fn with_overall_timeout(mut self, overall_timeout: Option<Duration>) -> Self {
        self.overall_timeout = overall_timeout;
        self
    }

    pub fn tracker(&self) -> &Arc<StatementTracker> {
        &self.tracker
    }

    fn context(
        &self,
        statement_id: Option<&str>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> RequestContext {
        let ctx = RequestContext::new()
            .with_deadline(deadline)
            .with_cancel(cancel.clone());
        match statement_id {
            Some(id) => ctx.with_statement(id),
            None => ctx,
        }
    }

    /// Submit `request` and wait for its terminal state.
    ///
    /// Cancelling `cancel` (or calling [`StatementTracker::cancel`]) stops
    /// polling, asks the server to cancel and yields an
    /// [`LinkError::ExecutionFailed`] in state CANCELED.
    pub async fn execute(
        &self,
        session: &SessionHandle,
        request: &StatementRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ExecutionOutcome> {
        let deadline = self.overall_timeout.map(|budget| Instant::now() + budget);
        let submit_token = cancel.cloned().unwrap_or_else(CancellationToken::new);
        let submission = self
            .client
            .submit(session, request, &self.context(None, &submit_token, deadline))
            .await?;
        let handle = submission.handle;
        let statement_id = handle.id().to_string();
        debug!(
            "[LINK_EXEC] Statement {} submitted in state {} \"{}\"",
            statement_id,
            submission.status.state,
            sql_preview(&request.sql)
        );

        let token = self
            .tracker
            .register(&handle, submission.status.state, cancel);
        let outcome = self
            .drive(&handle, submission.status, &token, deadline, &request.sql)
            .await;
        self.tracker.remove(&statement_id);
        outcome
    }

    async fn drive(
        &self,
        handle: &StatementHandle,
        initial: StatementStatus,
        token: &CancellationToken,
        deadline: Option<Instant>,
        sql: &str,
    ) -> Result<ExecutionOutcome> {
        let statement_id = handle.id();
        let ctx = self.context(Some(statement_id), token, deadline);
        let mut status = initial;
        let mut polls = 0u32;

        while !status.state.is_terminal() {
            if polls > 0 {
                let wait = ctx
                    .remaining()
                    .map_or(self.poll_interval, |remaining| remaining.min(self.poll_interval));
                if ctx.sleep(wait).await.is_err() {
                    return self.cancelled(handle, sql).await;
                }
            }
            if token.is_cancelled() {
                return self.cancelled(handle, sql).await;
            }
            if ctx.is_past_deadline() {
                return self.timed_out(handle, sql).await;
            }

            polls += 1;
            let next = match self.client.poll(handle, &ctx).await {
                Ok(next) => next,
                Err(LinkError::Cancelled) => return self.cancelled(handle, sql).await,
                Err(e) => {
                    if ctx.is_past_deadline() {
                        self.abandon(handle).await;
                    }
                    return Err(e);
                },
            };
            debug!(
                "[LINK_EXEC] Poll #{} for statement {} -> {}",
                polls, statement_id, next.state
            );

            match self.tracker.advance(statement_id, next.state) {
                Transition::Applied(_) | Transition::Unknown => status = next,
                Transition::Ignored(current) if current.is_terminal() => {
                    warn!(
                        "[LINK_EXEC] Discarding late poll result {} for statement {} (already {})",
                        next.state, statement_id, current
                    );
                    return self.cancelled(handle, sql).await;
                },
                Transition::Ignored(_) => {},
            }
        }

        finish(handle, status, sql, deadline)
    }

    /// Mark the statement CANCELED locally and, if this call made the
    /// transition, on the server too.
    async fn abandon(&self, handle: &StatementHandle) {
        let statement_id = handle.id();
        if self.tracker.cancel(statement_id) || self.tracker.state(statement_id).is_none() {
            // The statement's own token and deadline may already have fired.
            let ctx = self.context(Some(statement_id), &CancellationToken::new(), None);
            if let Err(e) = self.client.cancel(handle, &ctx).await {
                warn!("[LINK_EXEC] Cancel of statement {} failed: {}", statement_id, e);
            }
        }
    }

    /// Local state is (or becomes) CANCELED: tell the server and report it.
    async fn cancelled(&self, handle: &StatementHandle, sql: &str) -> Result<ExecutionOutcome> {
        self.abandon(handle).await;
        Err(canceled(handle, sql, "Statement was cancelled".to_string()))
    }

    /// The overall timeout elapsed while the statement was still running.
    async fn timed_out(&self, handle: &StatementHandle, sql: &str) -> Result<ExecutionOutcome> {
        warn!(
            "[LINK_EXEC] Statement {} exceeded the overall timeout of {:?}; cancelling",
            handle, self.overall_timeout
        );
        self.abandon(handle).await;
        let message = match self.overall_timeout {
            Some(budget) => format!("Statement exceeded the overall timeout of {:?}", budget),
            None => "Statement exceeded the overall timeout".to_string(),
        };
        Err(canceled(handle, sql, message))
    }

    /// Ask the server to cancel `statement_id` and stop its local polling.
    pub async fn cancel(&self, statement_id: &str) -> Result<()> {
        self.tracker.cancel(statement_id);
        let handle = StatementHandle::new(statement_id);
        let ctx = self.context(Some(statement_id), &CancellationToken::new(), None);
        self.client.cancel(&handle, &ctx).await
    }

    /// Release server-side resources of a statement.
    pub async fn close(&self, statement_id: &str) -> Result<()> {
        self.tracker.cancel(statement_id);
        self.tracker.remove(statement_id);
        let handle = StatementHandle::new(statement_id);
        let ctx = self.context(Some(statement_id), &CancellationToken::new(), None);
        self.client.close(&handle, &ctx).await
    }
}

fn canceled(handle: &StatementHandle, sql: &str, message: String) -> LinkError {
    LinkError::ExecutionFailed {
        statement_id: handle.id().to_string(),
        state: StatementState::Canceled,
        sql: sql.to_string(),
        error_code: None,
        message,
    }
}

fn finish(
    handle: &StatementHandle,
    status: StatementStatus,
    sql: &str,
    deadline: Option<Instant>,
) -> Result<ExecutionOutcome> {
    match status.state {
        StatementState::Succeeded => Ok(ExecutionOutcome {
            handle: handle.clone(),
            descriptor: status.result.unwrap_or_else(ResultDescriptor::empty),
            deadline,
        }),
        state => {
            let error = status.error.unwrap_or_default();
            let message = if error.message.is_empty() {
                format!("Statement ended in state {}", state)
            } else {
                error.message
            };
            Err(LinkError::ExecutionFailed {
                statement_id: handle.id().to_string(),
                state,
                sql: sql.to_string(),
                error_code: error.error_code,
                message,
            })
        },
    }
}
