use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use super::wire::{
    wait_timeout_param, CreateSessionRequest, CreateSessionResponse, ExecuteStatementRequest,
    Manifest, ResultChunk, StatementResponse, WireParameter, DISPOSITION_EXTERNAL_LINKS,
    DISPOSITION_INLINE, FORMAT_COLUMNAR, FORMAT_JSON_ARRAY,
};
use crate::auth::ArcCredentialProvider;
use crate::codec::{rows_from_json_array, ChunkPayload};
use crate::error::{LinkError, Result};
use crate::models::{
    Backend, ChunkLink, ComputeRef, ResultDescriptor, SessionHandle, StatementHandle,
    StatementState, StatementStatus, Submission,
};
use crate::protocol::{sql_preview, Endpoint, ProtocolClient, SessionOptions, StatementRequest};
use crate::retry::{RequestContext, RetryEngine};
use crate::transport::HttpRequest;

const SESSIONS_PATH: &str = "/api/2.0/sql/sessions";
const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// Client for the JSON statement-execution API.
///
/// Statements run inside a server-side session and are submitted with a
/// short synchronous wait; results arrive inline (`JSON_ARRAY`) or as
/// presigned external links to columnar chunks.
#[derive(Clone)]
pub struct RestExecutionClient {
    endpoint: Endpoint,
    warehouse_id: String,
    wait_timeout: Duration,
}

impl RestExecutionClient {
    pub fn new(
        host: impl Into<String>,
        warehouse_id: impl Into<String>,
        engine: RetryEngine,
        credentials: ArcCredentialProvider,
    ) -> Self {
        Self {
            endpoint: Endpoint::new(host, engine, credentials),
            warehouse_id: warehouse_id.into(),
            wait_timeout: Duration::from_secs(10),
        }
    }

    /// Server-side synchronous wait on submission (0 or 5..=50 seconds).
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    fn statement_url(&self, handle: &StatementHandle) -> String {
        self.endpoint.url(&format!("{}/{}", STATEMENTS_PATH, handle.id()))
    }

    /// Translate a status response, completing the link list when needed.
    async fn to_status(&self, response: StatementResponse, ctx: &RequestContext) -> Result<StatementStatus> {
        let state = response.status.state;
        match state {
            StatementState::Pending | StatementState::Running => Ok(StatementStatus {
                state,
                result: None,
                error: None,
            }),
            StatementState::Succeeded => {
                let handle = StatementHandle::new(response.statement_id);
                let descriptor = self
                    .descriptor(&handle, response.manifest.unwrap_or_default(), response.result, ctx)
                    .await?;
                Ok(StatementStatus::succeeded(descriptor))
            },
            terminal => Ok(StatementStatus::failed(
                terminal,
                response.status.error.unwrap_or_default(),
            )),
        }
    }

    async fn descriptor(
        &self,
        handle: &StatementHandle,
        manifest: Manifest,
        result: Option<ResultChunk>,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let columns = manifest.columns();
        let total_chunks = manifest.total_chunk_count.unwrap_or(0);
        let result = result.unwrap_or_default();

        if let Some(first_links) = result.external_links {
            let mut links: BTreeMap<u64, ChunkLink> = first_links
                .into_iter()
                .map(|link| (link.chunk_index, ChunkLink::from(link)))
                .collect();
            for index in 0..total_chunks {
                if links.contains_key(&index) {
                    continue;
                }
                let chunk = self.result_chunk(handle, index, ctx).await?;
                for link in chunk.external_links.unwrap_or_default() {
                    links.entry(link.chunk_index).or_insert_with(|| link.into());
                }
                if !links.contains_key(&index) {
                    return Err(LinkError::Protocol(format!(
                        "Server returned no link for chunk {} of statement {}",
                        index, handle
                    )));
                }
            }
            debug!(
                "[LINK_REST] Statement {} has {} external chunk(s)",
                handle,
                links.len()
            );
            return Ok(ResultDescriptor::remote(columns, links.into_values().collect()));
        }

        let mut rows = rows_from_json_array(result.data_array.unwrap_or_default());
        // Inline results larger than one chunk are gathered eagerly; the
        // server caps inline results, so this stays bounded.
        for index in 1..total_chunks {
            let chunk = self.result_chunk(handle, index, ctx).await?;
            rows.extend(rows_from_json_array(chunk.data_array.unwrap_or_default()));
        }
        Ok(ResultDescriptor::inline(columns, rows))
    }

    async fn result_chunk(&self, handle: &StatementHandle, index: u64, ctx: &RequestContext) -> Result<ResultChunk> {
        let url = format!("{}/result/chunks/{}", self.statement_url(handle), index);
        let response = self.endpoint.send_authorized(HttpRequest::get(url), ctx).await?;
        response.json()
    }
}

#[async_trait]
impl ProtocolClient for RestExecutionClient {
    fn backend(&self) -> Backend {
        Backend::Rest
    }

    async fn open_session(
        &self,
        compute: &ComputeRef,
        options: &SessionOptions,
        ctx: &RequestContext,
    ) -> Result<SessionHandle> {
        let warehouse_id = match compute {
            ComputeRef::Warehouse(id) => id.as_str(),
            ComputeRef::Cluster(_) => {
                return Err(LinkError::Configuration(
                    "The rest backend requires a warehouse id".into(),
                ))
            },
        };
        let body = CreateSessionRequest {
            warehouse_id,
            catalog: options.catalog.as_deref(),
            schema: options.schema.as_deref(),
            session_confs: &options.config,
        };
        let request = HttpRequest::post(self.endpoint.url(SESSIONS_PATH)).json(&body)?;
        let response: CreateSessionResponse = self.endpoint.send_authorized(request, ctx).await?.json()?;
        info!("[LINK_REST] Opened session {} on {}", response.session_id, compute);
        Ok(SessionHandle::new(response.session_id))
    }

    async fn submit(
        &self,
        session: &SessionHandle,
        request: &StatementRequest,
        ctx: &RequestContext,
    ) -> Result<Submission> {
        let (disposition, format) = if request.columnar {
            (DISPOSITION_EXTERNAL_LINKS, FORMAT_COLUMNAR)
        } else {
            (DISPOSITION_INLINE, FORMAT_JSON_ARRAY)
        };
        let body = ExecuteStatementRequest {
            statement: &request.sql,
            warehouse_id: &self.warehouse_id,
            session_id: session.id(),
            parameters: request.parameters.iter().map(WireParameter::from).collect(),
            wait_timeout: wait_timeout_param(self.wait_timeout.as_secs()),
            on_wait_timeout: "CONTINUE",
            disposition,
            format,
        };
        debug!(
            "[LINK_REST] Submitting \"{}\" (len={}) session={} format={}",
            sql_preview(&request.sql),
            request.sql.len(),
            session,
            format
        );

        let http_request = HttpRequest::post(self.endpoint.url(STATEMENTS_PATH)).json(&body)?;
        let response: StatementResponse = self.endpoint.send_authorized(http_request, ctx).await?.json()?;
        let handle = StatementHandle::new(response.statement_id.clone());
        let status = self.to_status(response, ctx).await?;
        Ok(Submission { handle, status })
    }

    async fn poll(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<StatementStatus> {
        let response: StatementResponse = self
            .endpoint
            .send_authorized(HttpRequest::get(self.statement_url(handle)), ctx)
            .await?
            .json()?;
        if response.statement_id != handle.id() {
            return Err(LinkError::Protocol(format!(
                "Polled statement {} but the server answered for {}",
                handle, response.statement_id
            )));
        }
        self.to_status(response, ctx).await
    }

    async fn fetch_chunk(
        &self,
        handle: &StatementHandle,
        link: &ChunkLink,
        ctx: &RequestContext,
    ) -> Result<ChunkPayload> {
        debug!(
            "[LINK_REST] Fetching chunk {} of statement {} ({} rows)",
            link.index, handle, link.row_count
        );
        // Presigned: credentials must not leak to the storage host.
        let response = self
            .endpoint
            .send_anonymous(HttpRequest::get(link.url.clone()), ctx)
            .await?;
        let is_json = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.starts_with("application/json"));
        Ok(if is_json {
            ChunkPayload::json_array(response.body)
        } else {
            ChunkPayload::columnar(response.body)
        })
    }

    async fn cancel(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()> {
        let url = format!("{}/cancel", self.statement_url(handle));
        self.endpoint.send_authorized(HttpRequest::post(url), ctx).await?;
        debug!("[LINK_REST] Cancel requested for statement {}", handle);
        Ok(())
    }

    async fn close(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()> {
        self.endpoint
            .send_authorized(HttpRequest::delete(self.statement_url(handle)), ctx)
            .await?;
        debug!("[LINK_REST] Closed statement {}", handle);
        Ok(())
    }

    async fn close_session(&self, session: &SessionHandle, ctx: &RequestContext) -> Result<()> {
        let url = self.endpoint.url(&format!(
            "{}/{}?warehouse_id={}",
            SESSIONS_PATH,
            session.id(),
            self.warehouse_id
        ));
        self.endpoint.send_authorized(HttpRequest::delete(url), ctx).await?;
        info!("[LINK_REST] Closed session {}", session);
        Ok(())
    }
}
