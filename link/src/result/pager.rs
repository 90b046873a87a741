use chrono::Utc;
use log::{debug, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::chunks::ChunkLinks;
use crate::error::{LinkError, Result};
use crate::models::{ColumnInfo, ResultData, ResultDescriptor, Row, StatementHandle};
use crate::protocol::ArcProtocolClient;
use crate::retry::RequestContext;

enum Source {
    Inline(std::vec::IntoIter<Row>),
    Remote {
        links: ChunkLinks,
        /// Index of the next chunk to download.
        next_chunk: usize,
        /// Undelivered rows of the chunk being consumed.
        current: std::vec::IntoIter<Row>,
    },
}

/// Forward-only, single-pass row sequence over a statement's result.
///
/// Remote chunks are downloaded only when the cursor first reaches them and
/// are dropped before the next one is fetched. Once exhausted, `next`
/// keeps returning `None` and the statement is closed on the server.
///
/// Chunk downloads (and their retry waits) stop when the pager's
/// cancellation token fires; see [`ResultPager::cancel_token`].
pub struct ResultPager {
    client: ArcProtocolClient,
    handle: StatementHandle,
    columns: Vec<ColumnInfo>,
    source: Source,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    rows_returned: u64,
    exhausted: bool,
    closed: bool,
}

impl ResultPager {
    pub fn new(
        client: ArcProtocolClient,
        handle: StatementHandle,
        descriptor: ResultDescriptor,
    ) -> Result<Self> {
        let source = match descriptor.data {
            ResultData::Inline(rows) => Source::Inline(rows.into_iter()),
            ResultData::Remote(links) => Source::Remote {
                links: ChunkLinks::new(handle.id(), links)?,
                next_chunk: 0,
                current: Vec::new().into_iter(),
            },
        };
        Ok(Self {
            client,
            handle,
            columns: descriptor.columns,
            source,
            deadline: None,
            cancel: CancellationToken::new(),
            rows_returned: 0,
            exhausted: false,
            closed: false,
        })
    }

    /// Bound chunk downloads by the statement's overall deadline.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Interrupt chunk downloads when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts an in-flight chunk download, including its retry waits.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn statement_id(&self) -> &str {
        self.handle.id()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    /// Number of remote chunks (0 for inline results).
    pub fn chunk_count(&self) -> usize {
        match &self.source {
            Source::Inline(_) => 0,
            Source::Remote { links, .. } => links.len(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next row, or `None` once every row has been delivered.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let chunk_index = match &mut self.source {
                Source::Inline(rows) => match rows.next() {
                    Some(row) => {
                        self.rows_returned += 1;
                        return Ok(Some(row));
                    },
                    None => None,
                },
                Source::Remote {
                    links,
                    next_chunk,
                    current,
                } => {
                    if let Some(row) = current.next() {
                        self.rows_returned += 1;
                        return Ok(Some(row));
                    }
                    if *next_chunk >= links.len() {
                        None
                    } else {
                        // Release the consumed chunk before downloading the next.
                        *current = Vec::new().into_iter();
                        Some(*next_chunk)
                    }
                },
            };
            let Some(chunk_index) = chunk_index else {
                self.exhausted = true;
                debug!(
                    "[LINK_PAGER] Statement {} exhausted after {} row(s)",
                    self.handle, self.rows_returned
                );
                self.close().await;
                return Ok(None);
            };

            let rows = self.fetch(chunk_index as i64).await?;
            if let Source::Remote {
                next_chunk,
                current,
                ..
            } = &mut self.source
            {
                *next_chunk = chunk_index + 1;
                *current = rows.into_iter();
            }
        }
    }

    /// Download and decode chunk `index` without moving the cursor.
    ///
    /// Out-of-range indices fail with [`LinkError::ChunkBounds`]; expired links
    /// fail with [`LinkError::ChunkExpired`] before any network call.
    pub async fn fetch(&self, index: i64) -> Result<Vec<Row>> {
        let links = match &self.source {
            Source::Remote { links, .. } => links,
            Source::Inline(_) => {
                return Err(LinkError::ChunkBounds {
                    statement_id: self.handle.id().to_string(),
                    index,
                    chunk_count: 0,
                })
            },
        };
        let link = links.link(index, Utc::now())?;
        debug!(
            "[LINK_PAGER] Fetching chunk {}/{} of statement {}",
            link.index,
            links.len(),
            self.handle
        );

        let ctx = self.context();
        let payload = self.client.fetch_chunk(&self.handle, link, &ctx).await?;
        let rows = payload.decode()?;
        if link.row_count > 0 && rows.len() as u64 != link.row_count {
            return Err(LinkError::Protocol(format!(
                "Chunk {} of statement {} decoded to {} row(s), link promised {}",
                link.index,
                self.handle,
                rows.len(),
                link.row_count
            )));
        }
        Ok(rows)
    }

    /// Release the statement's server-side resources. Runs at most once;
    /// draining the pager calls it automatically.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.exhausted = true;
        // No deadline: sent after the statement budget is spent.
        let ctx = RequestContext::new().with_statement(self.handle.id());
        if let Err(e) = self.client.close(&self.handle, &ctx).await {
            warn!("[LINK_PAGER] Close of statement {} failed: {}", self.handle, e);
        }
    }

    fn context(&self) -> RequestContext {
        RequestContext::new()
            .with_statement(self.handle.id())
            .with_deadline(self.deadline)
            .with_cancel(self.cancel.clone())
    }
}
