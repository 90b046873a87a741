//! Retry engine.
//!
//! Failures are classified per attempt ([`ClassifiedFailure`]) and checked by
//! a pure eligibility function ([`evaluate`]); [`RetryEngine`] performs the
//! sends and the interruptible waits.

mod classify;
mod context;
mod engine;
mod policy;

pub use classify::{evaluate, ClassifiedFailure, Denial, RetryDecision};
pub use context::{RequestContext, RetryContext};
pub use engine::RetryEngine;
pub use policy::{is_retryable_method, BackoffPolicy, RetryBudget};

pub(crate) use engine::http_error;
