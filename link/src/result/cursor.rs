use tokio_util::sync::CancellationToken;

use super::pager::ResultPager;
use crate::error::Result;
use crate::models::{ColumnInfo, Row, StatementState};

/// Rows of a statement that finished successfully.
pub struct ResultCursor {
    pager: ResultPager,
    state: StatementState,
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("statement_id", &self.statement_id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ResultCursor {
    pub fn new(pager: ResultPager) -> Self {
        Self {
            pager,
            state: StatementState::Succeeded,
        }
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn statement_id(&self) -> &str {
        self.pager.statement_id()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        self.pager.columns()
    }

    pub async fn next(&mut self) -> Result<Option<Row>> {
        self.pager.next().await
    }

    /// Drain the remaining rows into memory.
    pub async fn collect_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.pager.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Abort the chunk download in flight and refuse later ones with
    /// [`LinkError::Cancelled`](crate::LinkError::Cancelled).
    pub fn cancel(&self) {
        self.pager.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.pager.cancel_token()
    }

    /// Stop reading and release the statement on the server.
    pub async fn close(&mut self) {
        self.pager.close().await;
    }

    pub fn pager(&self) -> &ResultPager {
        &self.pager
    }
}
