use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Lifecycle state of a statement on the remote service.
///
/// `Pending` and `Running` are the only non-terminal states. Once a statement
/// reaches a terminal state it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Closed,
    Canceled,
}

impl StatementState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatementState::Pending | StatementState::Running)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Non-terminal states may move anywhere except back to `Pending` from
    /// `Running`; terminal states only "move" to themselves.
    pub fn can_transition_to(self, next: StatementState) -> bool {
        match self {
            StatementState::Pending => true,
            StatementState::Running => next != StatementState::Pending,
            terminal => terminal == next,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementState::Pending => "PENDING",
            StatementState::Running => "RUNNING",
            StatementState::Succeeded => "SUCCEEDED",
            StatementState::Failed => "FAILED",
            StatementState::Closed => "CLOSED",
            StatementState::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementState {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(StatementState::Pending),
            "RUNNING" => Ok(StatementState::Running),
            "SUCCEEDED" => Ok(StatementState::Succeeded),
            "FAILED" => Ok(StatementState::Failed),
            "CLOSED" => Ok(StatementState::Closed),
            "CANCELED" | "CANCELLED" => Ok(StatementState::Canceled),
            other => Err(LinkError::Protocol(format!("Unknown statement state '{}'", other))),
        }
    }
}
