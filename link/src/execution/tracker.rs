use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::models::{StatementHandle, StatementState};

/// Result of offering a new state for a tracked statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The tracked state is now this value.
    Applied(StatementState),
    /// The offer was ignored; the tracked state stays as given.
    Ignored(StatementState),
    /// The statement is not tracked.
    Unknown,
}

struct Tracked {
    state: StatementState,
    cancel: CancellationToken,
}

/// Local view of in-flight statements.
///
/// States only move forward (see [`StatementState::can_transition_to`]);
/// once terminal they never change. Each statement owns a cancellation token
/// that interrupts its poll and backoff waits.
#[derive(Default)]
pub struct StatementTracker {
    statements: Mutex<HashMap<String, Tracked>>,
}

impl StatementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `handle`; its token is a child of `parent` when given.
    pub fn register(
        &self,
        handle: &StatementHandle,
        state: StatementState,
        parent: Option<&CancellationToken>,
    ) -> CancellationToken {
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        if let Ok(mut statements) = self.statements.lock() {
            statements.insert(
                handle.id().to_string(),
                Tracked {
                    state,
                    cancel: cancel.clone(),
                },
            );
        }
        cancel
    }

    pub fn state(&self, statement_id: &str) -> Option<StatementState> {
        self.statements
            .lock()
            .ok()?
            .get(statement_id)
            .map(|tracked| tracked.state)
    }

    /// Offer the state reported by the server.
    pub fn advance(&self, statement_id: &str, next: StatementState) -> Transition {
        let Ok(mut statements) = self.statements.lock() else {
            return Transition::Unknown;
        };
        let Some(tracked) = statements.get_mut(statement_id) else {
            return Transition::Unknown;
        };
        if tracked.state.can_transition_to(next) {
            tracked.state = next;
            Transition::Applied(next)
        } else {
            debug!(
                "[LINK_EXEC] Ignoring {} -> {} for statement {}",
                tracked.state, next, statement_id
            );
            Transition::Ignored(tracked.state)
        }
    }

    /// Mark a non-terminal statement CANCELED and interrupt its waits.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn cancel(&self, statement_id: &str) -> bool {
        let Ok(mut statements) = self.statements.lock() else {
            return false;
        };
        match statements.get_mut(statement_id) {
            Some(tracked) if !tracked.state.is_terminal() => {
                tracked.state = StatementState::Canceled;
                tracked.cancel.cancel();
                true
            },
            _ => false,
        }
    }

    pub fn remove(&self, statement_id: &str) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.remove(statement_id);
        }
    }

    /// Ids of statements still PENDING or RUNNING.
    pub fn active(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|statements| {
                statements
                    .iter()
                    .filter(|(_, tracked)| !tracked.state.is_terminal())
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_is_sticky() {
        let tracker = StatementTracker::new();
        let handle = StatementHandle::new("s1");
        tracker.register(&handle, StatementState::Pending, None);

        assert_eq!(
            tracker.advance("s1", StatementState::Running),
            Transition::Applied(StatementState::Running)
        );
        assert!(tracker.cancel("s1"));
        assert_eq!(
            tracker.advance("s1", StatementState::Succeeded),
            Transition::Ignored(StatementState::Canceled)
        );
        assert!(!tracker.cancel("s1"));
        assert_eq!(tracker.state("s1"), Some(StatementState::Canceled));
    }

    #[test]
    fn test_cancel_fires_token() {
        let tracker = StatementTracker::new();
        let token = tracker.register(&StatementHandle::new("s2"), StatementState::Running, None);
        assert!(!token.is_cancelled());
        tracker.cancel("s2");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_parent_token_cancels_child() {
        let tracker = StatementTracker::new();
        let parent = CancellationToken::new();
        let token = tracker.register(&StatementHandle::new("s3"), StatementState::Pending, Some(&parent));
        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_unknown_and_active() {
        let tracker = StatementTracker::new();
        assert_eq!(tracker.advance("nope", StatementState::Running), Transition::Unknown);
        tracker.register(&StatementHandle::new("a"), StatementState::Running, None);
        tracker.register(&StatementHandle::new("b"), StatementState::Succeeded, None);
        assert_eq!(tracker.active(), vec!["a".to_string()]);
        tracker.remove("a");
        assert!(tracker.state("a").is_none());
    }
}
