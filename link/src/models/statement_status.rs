use super::{
    result_descriptor::ResultDescriptor, server_error::ServerError,
    statement_handle::StatementHandle, statement_state::StatementState,
};

/// Outcome of one poll (or of a submission).
#[derive(Debug, Clone, PartialEq)]
pub struct StatementStatus {
    pub state: StatementState,
    /// Present once the statement has SUCCEEDED.
    pub result: Option<ResultDescriptor>,
    /// Present for terminal, unsuccessful states.
    pub error: Option<ServerError>,
}

impl StatementStatus {
    pub fn pending() -> Self {
        Self {
            state: StatementState::Pending,
            result: None,
            error: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: StatementState::Running,
            result: None,
            error: None,
        }
    }

    pub fn succeeded(result: ResultDescriptor) -> Self {
        Self {
            state: StatementState::Succeeded,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(state: StatementState, error: ServerError) -> Self {
        Self {
            state,
            result: None,
            error: Some(error),
        }
    }
}

/// Response to a submission: the handle plus either a direct result or a
/// non-terminal state that requires polling.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub handle: StatementHandle,
    pub status: StatementStatus,
}

impl Submission {
    /// True when the submission already carries a terminal outcome.
    pub fn is_direct(&self) -> bool {
        self.status.state.is_terminal()
    }
}
