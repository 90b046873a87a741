//! Statement-execution protocol clients.
//!
//! [`ProtocolClient`] is the single contract the coordinator and the pager
//! talk to. [`RestExecutionClient`] speaks the JSON statement-execution API,
//! [`BinaryRpcClient`] the protobuf RPC service. Both share only the
//! [`RetryEngine`] and a credential provider.

mod rest;
mod rpc;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{resolve_headers, ArcCredentialProvider};
use crate::codec::ChunkPayload;
use crate::error::{LinkError, Result};
use crate::models::{
    Backend, ChunkLink, ComputeRef, QueryParameter, ResultDescriptor, SessionHandle,
    StatementHandle, StatementStatus, Submission,
};
use crate::retry::{RequestContext, RetryEngine};
use crate::transport::{HttpRequest, HttpResponse};

pub use rest::RestExecutionClient;
pub use rpc::{messages as rpc_messages, BinaryRpcClient};

/// Session parameters passed to [`ProtocolClient::open_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub config: BTreeMap<String, String>,
}

/// One statement to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRequest {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
    /// Ask for the columnar result encoding.
    pub columnar: bool,
}

impl StatementRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
            columnar: true,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<QueryParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_columnar(mut self, columnar: bool) -> Self {
        self.columnar = columnar;
        self
    }
}

/// Filters for catalog metadata calls. Patterns use SQL `LIKE` syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub catalog: Option<String>,
    pub schema_pattern: Option<String>,
    pub table_pattern: Option<String>,
    pub column_pattern: Option<String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn schema_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.schema_pattern = Some(pattern.into());
        self
    }

    pub fn table_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.table_pattern = Some(pattern.into());
        self
    }

    pub fn column_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.column_pattern = Some(pattern.into());
        self
    }
}

/// Backend-neutral statement protocol.
///
/// Every call takes an explicit [`RequestContext`] carrying the statement id,
/// deadline and cancellation token; nothing is read from ambient state.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    fn backend(&self) -> Backend;

    async fn open_session(
        &self,
        compute: &ComputeRef,
        options: &SessionOptions,
        ctx: &RequestContext,
    ) -> Result<SessionHandle>;

    /// Submit a statement. The returned status is terminal when the backend
    /// answered with a direct result.
    async fn submit(
        &self,
        session: &SessionHandle,
        request: &StatementRequest,
        ctx: &RequestContext,
    ) -> Result<Submission>;

    async fn poll(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<StatementStatus>;

    /// Download the raw payload behind one chunk link.
    async fn fetch_chunk(
        &self,
        handle: &StatementHandle,
        link: &ChunkLink,
        ctx: &RequestContext,
    ) -> Result<ChunkPayload>;

    async fn cancel(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()>;

    async fn close(&self, handle: &StatementHandle, ctx: &RequestContext) -> Result<()>;

    async fn close_session(&self, session: &SessionHandle, ctx: &RequestContext) -> Result<()>;

    async fn catalogs(&self, _session: &SessionHandle, _ctx: &RequestContext) -> Result<ResultDescriptor> {
        Err(unsupported("catalogs", self.backend()))
    }

    async fn schemas(
        &self,
        _session: &SessionHandle,
        _filter: &MetadataFilter,
        _ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        Err(unsupported("schemas", self.backend()))
    }

    async fn tables(
        &self,
        _session: &SessionHandle,
        _filter: &MetadataFilter,
        _ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        Err(unsupported("tables", self.backend()))
    }

    async fn columns(
        &self,
        _session: &SessionHandle,
        _filter: &MetadataFilter,
        _ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        Err(unsupported("columns", self.backend()))
    }

    async fn primary_keys(
        &self,
        _session: &SessionHandle,
        _filter: &MetadataFilter,
        _ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        Err(unsupported("primary_keys", self.backend()))
    }

    async fn cross_references(
        &self,
        _session: &SessionHandle,
        _parent: &MetadataFilter,
        _foreign: &MetadataFilter,
        _ctx: &RequestContext,
    ) -> Result<ResultDescriptor> {
        Err(unsupported("cross_references", self.backend()))
    }
}

/// Shared, dynamically dispatched protocol client.
pub type ArcProtocolClient = Arc<dyn ProtocolClient>;

pub(crate) fn unsupported(operation: &'static str, backend: Backend) -> LinkError {
    LinkError::UnsupportedOperation {
        operation,
        backend: backend.as_str(),
    }
}

/// Host, retry engine and credentials shared by both backends.
#[derive(Clone)]
pub(crate) struct Endpoint {
    host: String,
    engine: RetryEngine,
    credentials: ArcCredentialProvider,
}

impl Endpoint {
    pub(crate) fn new(host: impl Into<String>, engine: RetryEngine, credentials: ArcCredentialProvider) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            engine,
            credentials,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// Attach fresh credential headers and send through the retry engine.
    pub(crate) async fn send_authorized(&self, request: HttpRequest, ctx: &RequestContext) -> Result<HttpResponse> {
        let headers = resolve_headers(self.credentials.as_ref()).await?;
        self.engine.send(request.with_headers(headers), ctx).await
    }

    /// Send without credentials (presigned URLs).
    pub(crate) async fn send_anonymous(&self, request: HttpRequest, ctx: &RequestContext) -> Result<HttpResponse> {
        self.engine.send(request, ctx).await
    }
}

/// First 80 characters of a statement, on one line, for log messages.
pub(crate) fn sql_preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    match flattened.char_indices().nth(80) {
        Some((cut, _)) => format!("{}...", &flattened[..cut]),
        None => flattened,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_preview_truncates_on_char_boundary() {
        let sql = "é".repeat(100);
        let preview = sql_preview(&sql);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 83);
        assert_eq!(sql_preview("SELECT\n1"), "SELECT 1");
    }

    #[test]
    fn test_unsupported_names_operation_and_backend() {
        let err = unsupported("primary_keys", Backend::Rpc);
        assert_eq!(
            err.to_string(),
            "Operation 'primary_keys' is not supported by the rpc backend"
        );
    }
}
