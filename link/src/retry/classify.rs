//! Failure classification and the retry eligibility decision.
//!
//! Both are plain functions over values: nothing here sleeps, sends or
//! raises.

use std::time::Duration;

use reqwest::{Method, StatusCode};

use super::context::RetryContext;
use super::policy::{is_retryable_method, BackoffPolicy, RetryBudget};
use crate::transport::{HttpResponse, TransportFailure};

/// Statuses retried with generic exponential backoff.
const TRANSIENT_STATUSES: [u16; 5] = [408, 425, 500, 502, 504];

/// A failed attempt, tagged with everything the decision needs.
#[derive(Debug, Clone)]
pub enum ClassifiedFailure {
    /// 429 or 503: bounded by a time window and directed by `Retry-After`.
    Throttled {
        response: HttpResponse,
        retry_after: Option<u64>,
    },
    /// 408, 425, 500, 502, 504.
    Transient { response: HttpResponse },
    /// No status line was read.
    Network(TransportFailure),
    /// Any other non-success status.
    Terminal { response: HttpResponse },
}

impl ClassifiedFailure {
    /// Split an attempt's outcome into a usable response or a classified failure.
    pub fn classify(
        outcome: std::result::Result<HttpResponse, TransportFailure>,
    ) -> std::result::Result<HttpResponse, ClassifiedFailure> {
        let response = match outcome {
            Ok(response) => response,
            Err(failure) => return Err(ClassifiedFailure::Network(failure)),
        };
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status.as_u16();
        if status == 429 || status == 503 {
            let retry_after = response.retry_after_secs();
            Err(ClassifiedFailure::Throttled {
                response,
                retry_after,
            })
        } else if TRANSIENT_STATUSES.contains(&status) {
            Err(ClassifiedFailure::Transient { response })
        } else {
            Err(ClassifiedFailure::Terminal { response })
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClassifiedFailure::Throttled { response, .. }
            | ClassifiedFailure::Transient { response }
            | ClassifiedFailure::Terminal { response } => Some(response.status),
            ClassifiedFailure::Network(_) => None,
        }
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ClassifiedFailure::Throttled { response, .. }
            | ClassifiedFailure::Transient { response }
            | ClassifiedFailure::Terminal { response } => Some(response),
            ClassifiedFailure::Network(_) => None,
        }
    }

    /// Short human-readable cause for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            ClassifiedFailure::Network(failure) => failure.to_string(),
            other => match other.response() {
                Some(response) => {
                    let body = response.text();
                    if body.trim().is_empty() {
                        response
                            .status
                            .canonical_reason()
                            .unwrap_or("unknown status")
                            .to_string()
                    } else {
                        body
                    }
                },
                None => String::new(),
            },
        }
    }

    pub(crate) fn record_into(&self, ctx: &mut RetryContext) {
        match self {
            ClassifiedFailure::Throttled {
                response,
                retry_after,
            } => ctx.record_status(response.status.as_u16(), *retry_after),
            ClassifiedFailure::Transient { response } | ClassifiedFailure::Terminal { response } => {
                ctx.record_status(response.status.as_u16(), None)
            },
            ClassifiedFailure::Network(_) => ctx.record_network(),
        }
    }
}

/// Why a failed attempt is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// 429/503 without `Retry-After` for a class that is retried.
    NoRetryAfter,
    /// 429/503 for a class whose retries are switched off.
    ClassDisabled,
    /// The class's time window is used up.
    BudgetExhausted,
    /// `attempt > max_attempts`.
    AttemptsExhausted,
    /// Verb other than GET, POST or PUT.
    MethodNotRetryable,
    /// Status outside the retryable set.
    NotRetryable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail(Denial),
}

/// Decide whether the failed attempt described by `ctx` may be re-sent.
///
/// Rules apply in order: missing `Retry-After`, disabled class, 503 window,
/// 429 window, attempt cap, then the verb check.
pub fn evaluate(
    failure: &ClassifiedFailure,
    method: &Method,
    ctx: &RetryContext,
    budget: &RetryBudget,
    backoff: &BackoffPolicy,
) -> RetryDecision {
    let delay = match failure {
        ClassifiedFailure::Terminal { .. } => return RetryDecision::Fail(Denial::NotRetryable),
        ClassifiedFailure::Throttled { response, .. } => {
            let temp_unavailable = response.status == StatusCode::SERVICE_UNAVAILABLE;
            let (enabled, count, window_secs) = if temp_unavailable {
                (
                    budget.retry_temp_unavailable,
                    ctx.temp_unavailable_count,
                    budget.temp_unavailable_timeout_secs,
                )
            } else {
                (budget.retry_rate_limit, ctx.rate_limit_count, budget.rate_limit_timeout_secs)
            };

            if !enabled {
                return RetryDecision::Fail(Denial::ClassDisabled);
            }
            if ctx.last_retry_interval_secs < 0 {
                return RetryDecision::Fail(Denial::NoRetryAfter);
            }

            let interval = ctx.last_retry_interval_secs as u64;
            if u64::from(count).saturating_mul(interval) >= window_secs {
                return RetryDecision::Fail(Denial::BudgetExhausted);
            }
            // A zero interval never drains the window; cap it by attempts instead.
            if interval == 0 && ctx.attempt > budget.max_attempts {
                return RetryDecision::Fail(Denial::AttemptsExhausted);
            }
            Duration::from_secs(interval)
        },
        ClassifiedFailure::Transient { .. } | ClassifiedFailure::Network(_) => {
            if ctx.attempt > budget.max_attempts {
                return RetryDecision::Fail(Denial::AttemptsExhausted);
            }
            backoff.delay_for_attempt(ctx.attempt)
        },
    };

    if !is_retryable_method(method) {
        return RetryDecision::Fail(Denial::MethodNotRetryable);
    }
    RetryDecision::Retry { delay }
}
