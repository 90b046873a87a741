use std::time::Duration;

use reqwest::Method;

/// Per-connection retry limits, fixed at connection construction.
///
/// `max_attempts` bounds generic retryable failures (408, 425, 500, 502, 504
/// and network errors): a request is re-sent while its attempt number does
/// not exceed it, so up to `max_attempts + 1` sends happen in total.
/// 503 and 429 are bounded by their time windows instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub retry_temp_unavailable: bool,
    pub temp_unavailable_timeout_secs: u64,
    pub retry_rate_limit: bool,
    pub rate_limit_timeout_secs: u64,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_temp_unavailable: true,
            temp_unavailable_timeout_secs: 900,
            retry_rate_limit: true,
            rate_limit_timeout_secs: 120,
        }
    }
}

impl RetryBudget {
    /// Budget that never retries anything.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            retry_temp_unavailable: false,
            temp_unavailable_timeout_secs: 0,
            retry_rate_limit: false,
            rate_limit_timeout_secs: 0,
        }
    }
}

/// Exponential backoff for failures that carry no server directive.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// `min(max_backoff, min_backoff * factor^(attempt - 1))`, attempt counted from 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.min_backoff.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// Only these verbs are re-sent; DELETE and friends are never repeated.
pub fn is_retryable_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::POST | Method::PUT)
}
