//! Error types for warehouse-link.
//!
//! Every request-level error carries the statement id (when one exists), the
//! category that triggered it and the number of attempts made, so operators can
//! tell "the server rejected the query" apart from "the transport could not
//! reach the server".

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::StatementState;

/// Result type for warehouse-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// What kind of failure a request-level error was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// I/O failure before a status line was read.
    Network,
    /// The server answered with this HTTP status.
    Status(u16),
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCategory::Network => write!(f, "network"),
            FailureCategory::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

fn statement_label(statement_id: &Option<String>) -> String {
    match statement_id {
        Some(id) => format!(" [statement {}]", id),
        None => String::new(),
    }
}

/// Errors surfaced by the driver core.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O failure before any response; not retryable (or retries were disabled).
    #[error("Transport error{} after {attempts} attempt(s): {message}", statement_label(.statement_id))]
    Transport {
        statement_id: Option<String>,
        attempts: u32,
        message: String,
    },

    /// A retryable failure whose attempt or time budget ran out.
    #[error(
        "Retry budget exhausted{} for {category} after {attempts} attempt(s) in {elapsed:?}: {cause}",
        statement_label(.statement_id)
    )]
    RetryBudgetExceeded {
        statement_id: Option<String>,
        category: FailureCategory,
        attempts: u32,
        elapsed: Duration,
        cause: String,
    },

    /// 429/503 without a `Retry-After` for a class configured to honor one.
    #[error(
        "Server returned HTTP {status} without Retry-After{}; not retrying (attempt {attempts}): {body}",
        statement_label(.statement_id)
    )]
    ImmediateRetryDenied {
        statement_id: Option<String>,
        status: u16,
        attempts: u32,
        body: String,
    },

    /// Terminal HTTP status that the retry policy does not cover.
    #[error("HTTP {status}{} after {attempts} attempt(s): {message}", statement_label(.statement_id))]
    Http {
        statement_id: Option<String>,
        status: u16,
        attempts: u32,
        error_code: Option<String>,
        message: String,
    },

    /// The statement reached FAILED, CANCELED or CLOSED on the server.
    #[error("Statement {statement_id} ended in state {state}: {message}")]
    ExecutionFailed {
        statement_id: String,
        state: StatementState,
        sql: String,
        error_code: Option<String>,
        message: String,
    },

    /// Chunk index outside `[0, chunk_count)`.
    #[error("Chunk index {index} out of bounds for statement {statement_id} ({chunk_count} chunk(s))")]
    ChunkBounds {
        statement_id: String,
        index: i64,
        chunk_count: usize,
    },

    /// Chunk link expired before it was fetched.
    #[error("Chunk {index} of statement {statement_id} expired at {expired_at}")]
    ChunkExpired {
        statement_id: String,
        index: u64,
        expired_at: DateTime<Utc>,
    },

    /// Operation the selected backend does not provide.
    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: &'static str,
    },

    /// Credential provider failure; never retried.
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response that does not match the protocol contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LinkError {
    /// Statement id the error refers to, if any.
    pub fn statement_id(&self) -> Option<&str> {
        match self {
            LinkError::Transport { statement_id, .. }
            | LinkError::RetryBudgetExceeded { statement_id, .. }
            | LinkError::ImmediateRetryDenied { statement_id, .. }
            | LinkError::Http { statement_id, .. } => statement_id.as_deref(),
            LinkError::ExecutionFailed { statement_id, .. }
            | LinkError::ChunkBounds { statement_id, .. }
            | LinkError::ChunkExpired { statement_id, .. } => Some(statement_id),
            _ => None,
        }
    }

    /// Number of attempts made for request-level errors.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            LinkError::Transport { attempts, .. }
            | LinkError::RetryBudgetExceeded { attempts, .. }
            | LinkError::ImmediateRetryDenied { attempts, .. }
            | LinkError::Http { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// HTTP status that triggered the error, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LinkError::ImmediateRetryDenied { status, .. } | LinkError::Http { status, .. } => {
                Some(*status)
            },
            LinkError::RetryBudgetExceeded {
                category: FailureCategory::Status(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }

    /// Whether re-submitting the whole statement later could plausibly succeed.
    ///
    /// Statement failures, bounds/expiry errors and configuration problems are
    /// never worth a blind retry.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            LinkError::Transport { .. }
                | LinkError::RetryBudgetExceeded { .. }
                | LinkError::ImmediateRetryDenied { .. }
        )
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        LinkError::Transport {
            statement_id: None,
            attempts: 1,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

impl From<prost::DecodeError> for LinkError {
    fn from(err: prost::DecodeError) -> Self {
        LinkError::Serialization(format!("Failed to decode protobuf payload: {}", err))
    }
}
