use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info, warn};
use prost::Message;

use super::messages::{
    guid_hex, CloseSessionReq, DirectResults, DirectResultsReq, ExecuteStatementReq,
    FetchResultsReq, FetchResultsResp, GetCatalogsReq, GetColumnsReq, GetOperationStatusResp,
    GetSchemasReq, GetTablesReq, OpenSessionReq, OpenSessionResp, OperationHandle, OperationReq,
    OperationResp, OperationState, RpcParameter, RpcSessionHandle, RpcStatus, StatusResp,
};
use crate::auth::ArcCredentialProvider;
use crate::codec::{decode_columnar, ChunkPayload};
use crate::error::{LinkError, Result};
use crate::models::{
    Backend, ChunkLink, ColumnInfo, ComputeRef, ResultDescriptor, Row, ServerError,
    SessionHandle, StatementHandle, StatementState, StatementStatus, Submission,
};
use crate::protocol::{
    sql_preview, unsupported, Endpoint, MetadataFilter, ProtocolClient, SessionOptions,
    StatementRequest,
};
use crate::retry::{RequestContext, RetryEngine};
use crate::transport::HttpRequest;

const RPC_PATH: &str = "/rpc/v1";
const DEFAULT_MAX_ROWS: i64 = 100_000;

/// Operation known to this client, keyed by its hex id.
#[derive(Clone)]
struct OperationEntry {
    handle: OperationHandle,
    session_id: String,
}

/// Client for the binary RPC service.
///
/// A session of this backend runs one call at a time: submit, poll and fetch
/// on the same session are serialised through a per-session async mutex.
/// Results are paged in with `FetchResults` once the operation finishes, so
/// descriptors produced here are always inline.
pub struct BinaryRpcClient {
    endpoint: Endpoint,
    max_rows_per_fetch: i64,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    operations: Mutex<HashMap<String, OperationEntry>>,
}

#[derive(Clone)]
struct SessionEntry {
    handle: RpcSessionHandle,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl BinaryRpcClient {
    pub fn new(host: impl Into<String>, engine: RetryEngine, credentials: ArcCredentialProvider) -> Self {
        Self {
            endpoint: Endpoint::new(host, engine, credentials),
            max_rows_per_fetch: DEFAULT_MAX_ROWS,
            sessions: Mutex::new(HashMap::new()),
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Rows requested per `FetchResults` page.
    pub fn with_max_rows_per_fetch(mut self, max_rows: i64) -> Self {
        self.max_rows_per_fetch = max_rows.max(1);
        self
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req, ctx: &RequestContext) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let url = self.endpoint.url(&format!("{}/{}", RPC_PATH, method));
        debug!(
            "[LINK_RPC] {} statement={}",
            method,
            ctx.statement_id().unwrap_or("-")
        );
        let response = self
            .endpoint
            .send_authorized(HttpRequest::post(url).protobuf(request.encode_to_vec()), ctx)
            .await?;
        Ok(Resp::decode(response.body)?)
    }

    fn session_entry(&self, session: &SessionHandle) -> Result<SessionEntry> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| LinkError::Protocol("session registry poisoned".into()))?;
        sessions
            .get(session.id())
            .cloned()
            .ok_or_else(|| LinkError::Protocol(format!("Unknown session {}", session)))
    }

    fn operation_entry(&self, handle: &StatementHandle) -> Result<OperationEntry> {
        let operations = self
            .operations
            .lock()
            .map_err(|_| LinkError::Protocol("operation registry poisoned".into()))?;
        operations
            .get(handle.id())
            .cloned()
            .ok_or_else(|| LinkError::Protocol(format!("Unknown statement {}", handle)))
    }

    fn register_operation(&self, handle: &OperationHandle, session_id: &str) -> Result<StatementHandle> {
        let id = guid_hex(&handle.guid);
        let mut operations = self
            .operations
            .lock()
            .map_err(|_| LinkError::Protocol("operation registry poisoned".into()))?;
        operations.insert(
            id.clone(),
            OperationEntry {
                handle: handle.clone(),
                session_id: session_id.to_string(),
            },
        );
        Ok(StatementHandle::new(id))
    }

    fn forget_operation(&self, handle: &StatementHandle) {
        if let Ok(mut operations) = self.operations.lock() {
            operations.remove(handle.id());
        }
    }

    /// Lock guarding the session an operation belongs to.
    fn operation_lock(&self, entry: &OperationEntry) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| LinkError::Protocol("session registry poisoned".into()))?;
        sessions
            .get(&entry.session_id)
            .map(|session| Arc::clone(&session.lock))
            .ok_or_else(|| LinkError::Protocol(format!("Session {} is closed", entry.session_id)))
    }

    /// Page in every remaining row of a finished operation.
    async fn fetch_all(
        &self,
        operation: &OperationHandle,
        first_page: Option<FetchResultsResp>,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut page = match first_page {
            Some(page) => page,
            None => self.fetch_page(operation, true, ctx).await?,
        };
        loop {
            check_status("FetchResults", page.status.as_ref())?;
            if columns.is_empty() {
                if let Some(metadata) = &page.metadata {
                    columns = metadata.columns.iter().map(ColumnInfo::from).collect();
                }
            }
            if let Some(batch) = &page.batch {
                rows.extend(decode_columnar(batch)?);
            }
            if !page.has_more_rows {
                break;
            }
            page = self.fetch_page(operation, columns.is_empty(), ctx).await?;
        }
        debug!("[LINK_RPC] Fetched {} row(s) in {} column(s)", rows.len(), columns.len());
        Ok(ResultDescriptor::inline(columns, rows))
    }

    async fn fetch_page(
        &self,
        operation: &OperationHandle,
        include_metadata: bool,
        ctx: &RequestContext,
    ) -> Result<FetchResultsResp> {
        let request = FetchResultsReq {
            operation: Some(operation.clone()),
            max_rows: self.max_rows_per_fetch,
            include_metadata,
        };
        self.call("FetchResults", &request, ctx).await
    }

    /// Turn an operation status into a statement status, fetching rows once finished.
    async fn to_status(
        &self,
        operation: &OperationHandle,
        status: &GetOperationStatusResp,
        first_page: Option<FetchResultsResp>,
        ctx: &RequestContext,
    ) -> Result<StatementStatus> {
        check_status("GetOperationStatus", status.status.as_ref())?;
        let state = status.state().to_statement_state();
        match state {
            StatementState::Pending => Ok(StatementStatus::pending()),
            StatementState::Running => Ok(StatementStatus::running()),
            StatementState::Succeeded => {
                let descriptor = if operation.has_result_set {
                    self.fetch_all(operation, first_page, ctx).await?
                } else {
                    ResultDescriptor::empty()
                };
                Ok(StatementStatus::succeeded(descriptor))
            },
            terminal => Ok(StatementStatus::failed(
                terminal,
                ServerError::new(
                    non_empty(&status.error_code),
                    if status.error_message.is_empty() {
                        format!("Operation ended in state {:?}", status.state())
                    } else {
                        status.error_message.clone()
                    },
                ),
            )),
        }
    }

    /// Run a metadata call to completion and return its rows.
    async fn metadata<Req: Message>(
        &self,
        method: &'static str,
        session: &SessionHandle,
        request: &Req,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let entry = self.session_entry(session)?;
        let _guard = entry.lock.lock().await;
        let response: OperationResp = self.call(method, request, ctx).await?;
        check_status(method, response.status.as_ref())?;
        let operation = response
            .operation
            .ok_or_else(|| LinkError::Protocol(format!("{} returned no operation handle", method)))?;
        let first_page = response.direct_results.and_then(|direct| direct.result_set);
        let descriptor = self.fetch_all(&operation, first_page, ctx).await;

        let close = OperationReq {
            operation: Some(operation),
        };
        if let Err(e) = self.call::<_, StatusResp>("CloseOperation", &close, ctx).await {
            warn!("[LINK_RPC] Failed to close {} operation: {}", method, e);
        }
        descriptor
    }

    fn rpc_session(&self, session: &SessionHandle) -> Result<RpcSessionHandle> {
        Ok(self.session_entry(session)?.handle)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Fail on a non-success RPC status.
fn check_status(method: &str, status: Option<&RpcStatus>) -> Result<()> {
    match status {
        Some(status) if !status.is_ok() => Err(LinkError::Protocol(format!(
            "{} failed with {:?}{}: {}",
            method,
            status.status_code(),
            non_empty(&status.error_code)
                .map(|code| format!(" [{}]", code))
                .unwrap_or_default(),
            status.error_message
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl ProtocolClient for BinaryRpcClient {
    fn backend(&self) -> Backend {
        Backend::Rpc
    }

    async fn open_session(
        &self,
        compute: &ComputeRef,
        options: &SessionOptions,
        ctx: &RequestContext,
    ) -> Result<SessionHandle> {
        let request = OpenSessionReq {
            compute_id: compute.id().to_string(),
            catalog: options.catalog.clone(),
            schema: options.schema.clone(),
            configuration: options
                .config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let response: OpenSessionResp = self.call("OpenSession", &request, ctx).await?;
        check_status("OpenSession", response.status.as_ref())?;
        let rpc_handle = response
            .session
            .ok_or_else(|| LinkError::Protocol("OpenSession returned no session handle".into()))?;

        let handle = SessionHandle::with_secret(guid_hex(&rpc_handle.guid), rpc_handle.secret.clone());
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| LinkError::Protocol("session registry poisoned".into()))?;
        sessions.insert(
            handle.id().to_string(),
            SessionEntry {
                handle: rpc_handle,
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        info!("[LINK_RPC] Opened session {} on {}", handle, compute);
        Ok(handle)
    }

    async fn submit(
        &self,
        session: &SessionHandle,
        request: &StatementRequest,
        ctx: &RequestContext,
    ) -> Result<Submission> {
        let entry = self.session_entry(session)?;
        let _guard = entry.lock.lock().await;

        let wire = ExecuteStatementReq {
            session: Some(entry.handle.clone()),
            statement: request.sql.clone(),
            parameters: request
                .parameters
                .iter()
                .map(|p| RpcParameter {
                    name: p.name.clone(),
                    value: p.value_text(),
                    type_name: p.effective_type_name().unwrap_or_else(|| "VOID".to_string()),
                })
                .collect(),
            run_async: true,
            direct_results: Some(DirectResultsReq {
                max_rows: self.max_rows_per_fetch,
            }),
            columnar: request.columnar,
        };
        debug!(
            "[LINK_RPC] Executing \"{}\" (len={}) session={}",
            sql_preview(&request.sql),
            request.sql.len(),
            session
        );

        let response: OperationResp = self.call("ExecuteStatement", &wire, ctx).await?;
        let operation = match response.operation {
            Some(operation) => operation,
            None => {
                check_status("ExecuteStatement", response.status.as_ref())?;
                return Err(LinkError::Protocol("ExecuteStatement returned no operation handle".into()));
            },
        };
        let handle = self.register_operation(&operation, session.id())?;

        if let Some(status) = response.status.as_ref().filter(|status| !status.is_ok()) {
            return Ok(Submission {
                handle,
                status: StatementStatus::failed(
                    StatementState::Failed,
                    ServerError::new(non_empty(&status.error_code), status.error_message.clone()),
                ),
            });
        }

        let status = match response.direct_results {
            Some(DirectResults {
                operation_status: Some(op_status),
                result_set,
            }) if op_status.state() != OperationState::Initialized => {
                self.to_status(&operation, &op_status, result_set, ctx).await?
            },
            _ => StatementStatus::pending(),
        };
        Ok(Submission { handle, status })
    }

    async fn poll(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<StatementStatus> {
        let entry = self.operation_entry(handle)?;
        let lock = self.operation_lock(&entry)?;
        let _guard = lock.lock().await;
        let request = OperationReq {
            operation: Some(entry.handle.clone()),
        };
        let status: GetOperationStatusResp = self.call("GetOperationStatus", &request, ctx).await?;
        self.to_status(&entry.handle, &status, None, ctx).await
    }

    async fn fetch_chunk(
        &self,
        _handle: &StatementHandle,
        _link: &ChunkLink,
        _ctx: &RequestContext,
    ) -> Result<ChunkPayload> {
        Err(unsupported("fetch_chunk", Backend::Rpc))
    }

    async fn cancel(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()> {
        // No session lock: cancel must get through while a poll is in flight.
        let entry = self.operation_entry(handle)?;
        let request = OperationReq {
            operation: Some(entry.handle),
        };
        let response: StatusResp = self.call("CancelOperation", &request, ctx).await?;
        check_status("CancelOperation", response.status.as_ref())
    }

    async fn close(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()> {
        let entry = self.operation_entry(handle)?;
        let request = OperationReq {
            operation: Some(entry.handle),
        };
        let response: StatusResp = self.call("CloseOperation", &request, ctx).await?;
        self.forget_operation(handle);
        check_status("CloseOperation", response.status.as_ref())
    }

    async fn close_session(&self, session: &SessionHandle, ctx: &RequestContext) -> Result<()> {
        let entry = self.session_entry(session)?;
        let _guard = entry.lock.lock().await;
        let request = CloseSessionReq {
            session: Some(entry.handle.clone()),
        };
        let response: StatusResp = self.call("CloseSession", &request, ctx).await?;

        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(session.id());
        }
        if let Ok(mut operations) = self.operations.lock() {
            operations.retain(|_, op| op.session_id != session.id());
        }
        check_status("CloseSession", response.status.as_ref())?;
        info!("[LINK_RPC] Closed session {}", session);
        Ok(())
    }

    async fn catalogs(&self, session: &SessionHandle, ctx: &RequestContext) -> Result<ResultDescriptor> {
        let request = GetCatalogsReq {
            session: Some(self.rpc_session(session)?),
        };
        self.metadata("GetCatalogs", session, &request, ctx).await
    }

    async fn schemas(
        &self,
        session: &SessionHandle,
        filter: &MetadataFilter,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let request = GetSchemasReq {
            session: Some(self.rpc_session(session)?),
            catalog: filter.catalog.clone(),
            schema_pattern: filter.schema_pattern.clone(),
        };
        self.metadata("GetSchemas", session, &request, ctx).await
    }

    async fn tables(
        &self,
        session: &SessionHandle,
        filter: &MetadataFilter,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let request = GetTablesReq {
            session: Some(self.rpc_session(session)?),
            catalog: filter.catalog.clone(),
            schema_pattern: filter.schema_pattern.clone(),
            table_pattern: filter.table_pattern.clone(),
        };
        self.metadata("GetTables", session, &request, ctx).await
    }

    async fn columns(
        &self,
        session: &SessionHandle,
        filter: &MetadataFilter,
        ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        let request = GetColumnsReq {
            session: Some(self.rpc_session(session)?),
            catalog: filter.catalog.clone(),
            schema_pattern: filter.schema_pattern.clone(),
            table_pattern: filter.table_pattern.clone(),
            column_pattern: filter.column_pattern.clone(),
        };
        self.metadata("GetColumns", session, &request, ctx).await
    }
}
