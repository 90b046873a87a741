use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use super::classify::{evaluate, ClassifiedFailure, Denial, RetryDecision};
use super::context::{RequestContext, RetryContext};
use super::policy::{BackoffPolicy, RetryBudget};
use crate::error::{FailureCategory, LinkError, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Wraps an [`HttpTransport`] with the condition-specific retry policy.
///
/// Every protocol call goes through [`RetryEngine::send`]. Backoff waits are
/// raced against the request's cancellation token and never outlive its
/// overall deadline.
#[derive(Clone)]
pub struct RetryEngine {
    transport: Arc<dyn HttpTransport>,
    budget: RetryBudget,
    backoff: BackoffPolicy,
    request_timeout: Duration,
}

impl RetryEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, budget: RetryBudget, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            budget,
            backoff,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Send `request`, re-sending it while the policy allows.
    ///
    /// Returns the first 2xx response. Any other outcome is surfaced as a
    /// single error carrying the statement id, the triggering status or
    /// category and the attempt count.
    pub async fn send(&self, request: HttpRequest, ctx: &RequestContext) -> Result<HttpResponse> {
        let mut retry = RetryContext::new();
        let mut last_category = FailureCategory::Network;

        loop {
            if ctx.is_cancelled() {
                return Err(LinkError::Cancelled);
            }
            let timeout = match ctx.clamp_timeout(self.request_timeout) {
                Some(timeout) => timeout,
                None => {
                    return Err(deadline_exceeded(ctx, &retry, last_category, "overall timeout elapsed"))
                },
            };

            retry.begin_attempt();
            let mut attempt = request.clone();
            attempt.timeout = Some(timeout);
            debug!(
                "[LINK_HTTP] {} {} attempt={} statement={}",
                attempt.method,
                attempt.redacted_url(),
                retry.attempt,
                ctx.statement_id().unwrap_or("-")
            );

            let failure = match ClassifiedFailure::classify(self.transport.send(attempt).await) {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };
            failure.record_into(&mut retry);
            last_category = category_of(&failure);

            let delay = match evaluate(&failure, &request.method, &retry, &self.budget, &self.backoff) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::Fail(denial) => {
                    debug!(
                        "[LINK_RETRY] Giving up on {} {} after {} attempt(s): {:?}",
                        request.method,
                        request.redacted_url(),
                        retry.attempt,
                        denial
                    );
                    return Err(surface(denial, failure, ctx, &retry));
                },
            };

            if !ctx.fits_before_deadline(delay) {
                return Err(deadline_exceeded(ctx, &retry, last_category, &failure.describe()));
            }

            warn!(
                "[LINK_RETRY] {} {} failed with {} (attempt {}); retrying in {:?} statement={}",
                request.method,
                request.redacted_url(),
                last_category,
                retry.attempt,
                delay,
                ctx.statement_id().unwrap_or("-")
            );
            ctx.sleep(delay).await?;
        }
    }
}

fn category_of(failure: &ClassifiedFailure) -> FailureCategory {
    match failure.status() {
        Some(status) => FailureCategory::Status(status.as_u16()),
        None => FailureCategory::Network,
    }
}

fn deadline_exceeded(
    ctx: &RequestContext,
    retry: &RetryContext,
    category: FailureCategory,
    cause: &str,
) -> LinkError {
    LinkError::RetryBudgetExceeded {
        statement_id: ctx.statement_id().map(str::to_string),
        category,
        attempts: retry.attempt,
        elapsed: retry.elapsed(),
        cause: cause.to_string(),
    }
}

/// Turn a denied failure into the error the caller sees.
fn surface(denial: Denial, failure: ClassifiedFailure, ctx: &RequestContext, retry: &RetryContext) -> LinkError {
    let statement_id = ctx.statement_id().map(str::to_string);
    let attempts = retry.attempt;

    if let ClassifiedFailure::Network(network) = &failure {
        return match denial {
            Denial::AttemptsExhausted if attempts > 1 => LinkError::RetryBudgetExceeded {
                statement_id,
                category: FailureCategory::Network,
                attempts,
                elapsed: retry.elapsed(),
                cause: network.to_string(),
            },
            _ => LinkError::Transport {
                statement_id,
                attempts,
                message: network.to_string(),
            },
        };
    }

    match denial {
        Denial::NoRetryAfter => LinkError::ImmediateRetryDenied {
            statement_id,
            status: failure.status().map(|s| s.as_u16()).unwrap_or_default(),
            attempts,
            body: failure.describe(),
        },
        Denial::BudgetExhausted | Denial::AttemptsExhausted => LinkError::RetryBudgetExceeded {
            statement_id,
            category: category_of(&failure),
            attempts,
            elapsed: retry.elapsed(),
            cause: failure.describe(),
        },
        Denial::ClassDisabled | Denial::MethodNotRetryable | Denial::NotRetryable => {
            match failure.response() {
                Some(response) => http_error(response, statement_id, attempts),
                None => LinkError::Protocol(failure.describe()),
            }
        },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Build an [`LinkError::Http`] from a non-success response, lifting
/// `{error_code, message}` out of a JSON body when there is one.
pub(crate) fn http_error(response: &HttpResponse, statement_id: Option<String>, attempts: u32) -> LinkError {
    let parsed = serde_json::from_slice::<ErrorBody>(&response.body).ok();
    let error_code = parsed.as_ref().and_then(|body| body.error_code.clone());
    let message = parsed
        .and_then(|body| body.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            let text = response.text();
            if text.trim().is_empty() {
                response.status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                text
            }
        });
    LinkError::Http {
        statement_id,
        status: response.status.as_u16(),
        attempts,
        error_code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_http_error_parses_json_body() {
        let response = HttpResponse::new(
            StatusCode::BAD_REQUEST,
            r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"wait_timeout must be 0 or 5-50s"}"#,
        );
        match http_error(&response, Some("s-9".into()), 1) {
            LinkError::Http {
                statement_id,
                status,
                error_code,
                message,
                ..
            } => {
                assert_eq!(statement_id.as_deref(), Some("s-9"));
                assert_eq!(status, 400);
                assert_eq!(error_code.as_deref(), Some("INVALID_PARAMETER_VALUE"));
                assert_eq!(message, "wait_timeout must be 0 or 5-50s");
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_http_error_plain_text_body() {
        let response = HttpResponse::new(StatusCode::FORBIDDEN, "nope");
        match http_error(&response, None, 2) {
            LinkError::Http {
                error_code,
                message,
                attempts,
                ..
            } => {
                assert!(error_code.is_none());
                assert_eq!(message, "nope");
                assert_eq!(attempts, 2);
            },
            other => panic!("unexpected error {:?}", other),
        }
    }
}
