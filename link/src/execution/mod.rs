//! Statement execution: submission, the poll loop and local state tracking.

mod coordinator;
mod tracker;

pub use coordinator::{ExecutionCoordinator, ExecutionOutcome};
pub use tracker::{StatementTracker, Transition};
