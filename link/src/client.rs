//! Warehouse client with builder pattern.
//!
//! Wires a [`ConnectionConfig`] into the full stack: pooled transport, retry
//! engine, protocol client for the configured backend, execution coordinator
//! and result cursors.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::{ArcCredentialProvider, StaticCredentials};
use crate::config::ConnectionConfig;
use crate::error::{LinkError, Result};
use crate::execution::{ExecutionCoordinator, StatementTracker};
use crate::models::{Backend, QueryParameter, ResultDescriptor, SessionHandle};
use crate::protocol::{
    ArcProtocolClient, BinaryRpcClient, MetadataFilter, RestExecutionClient, SessionOptions,
    StatementRequest,
};
use crate::result::{ResultCursor, ResultPager};
use crate::retry::{RequestContext, RetryEngine};
use crate::transport::{HttpTransport, ReqwestTransport, TransportKey, TransportRegistry};

/// Driver-level owner of the transport pool.
///
/// Clients built through the same driver share one keep-alive transport per
/// host and compute. Dropping the driver (or calling [`shutdown`](Self::shutdown))
/// stops idle eviction and releases every pooled transport.
pub struct Driver {
    registry: Arc<TransportRegistry>,
}

impl Driver {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(TransportRegistry::new(idle_timeout)),
        }
    }

    /// Create a driver and start background idle eviction.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(idle_timeout: Duration) -> Self {
        let driver = Self::new(idle_timeout);
        driver.registry.start_eviction();
        driver
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    /// Builder for a client that leases its transport from this driver.
    pub fn client(&self, config: ConnectionConfig) -> WarehouseClientBuilder {
        WarehouseClient::builder()
            .config(config)
            .registry(Arc::clone(&self.registry))
    }

    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(Duration::from_secs(90))
    }
}

/// A logical connection to one warehouse or cluster.
///
/// Holds at most one server session, opened by [`connect`](Self::connect) or
/// lazily by the first statement. Cloning shares the session and the
/// statement tracker.
///
/// # Examples
///
/// ```rust,no_run
/// use warehouse_link::{ComputeRef, ConnectionConfig, StaticCredentials, WarehouseClient};
///
/// # async fn example() -> warehouse_link::Result<()> {
/// let config = ConnectionConfig::new(
///     "https://example.cloud.warehouse.com",
///     ComputeRef::Warehouse("abc123".into()),
/// );
/// let client = WarehouseClient::builder()
///     .config(config)
///     .credentials(StaticCredentials::bearer("dapi-token"))
///     .build()?;
///
/// let mut cursor = client.execute("SELECT 1", Vec::new()).await?;
/// while let Some(row) = cursor.next().await? {
///     println!("{:?}", row);
/// }
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WarehouseClient {
    config: Arc<ConnectionConfig>,
    protocol: ArcProtocolClient,
    coordinator: ExecutionCoordinator,
    session: Arc<Mutex<Option<SessionHandle>>>,
    /// Registry entry leased at build time; taken by the first `disconnect`.
    lease: Arc<std::sync::Mutex<Option<(Arc<TransportRegistry>, TransportKey)>>>,
}

impl WarehouseClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> WarehouseClientBuilder {
        WarehouseClientBuilder::new()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.protocol.backend()
    }

    fn context(&self) -> RequestContext {
        RequestContext::new().with_budget(self.config.timeouts.overall_budget())
    }

    /// Open the server session if it is not open yet and return it.
    pub async fn connect(&self) -> Result<SessionHandle> {
        let mut session = self.session.lock().await;
        if let Some(open) = session.as_ref() {
            return Ok(open.clone());
        }

        let options = SessionOptions {
            catalog: self.config.catalog.clone(),
            schema: self.config.schema.clone(),
            config: self.config.session_conf.clone(),
        };
        let handle = self
            .protocol
            .open_session(&self.config.compute, &options, &self.context())
            .await?;
        info!(
            "[LINK_EXEC] Connected to {} over {} (session {})",
            self.config.compute,
            self.protocol.backend(),
            handle
        );
        *session = Some(handle.clone());
        Ok(handle)
    }

    /// Currently open session, if any.
    pub async fn session(&self) -> Option<SessionHandle> {
        self.session.lock().await.clone()
    }

    /// Run `sql` to completion and return a cursor over its rows.
    pub async fn execute(&self, sql: &str, params: Vec<QueryParameter>) -> Result<ResultCursor> {
        self.execute_with_cancel(sql, params, None).await
    }

    /// Like [`execute`](Self::execute), stopping early when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        sql: &str,
        params: Vec<QueryParameter>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResultCursor> {
        let session = self.connect().await?;
        let request = StatementRequest::new(sql)
            .with_parameters(params)
            .with_columnar(self.config.use_columnar);
        let outcome = self.coordinator.execute(&session, &request, cancel).await?;
        let pager = ResultPager::new(Arc::clone(&self.protocol), outcome.handle, outcome.descriptor)?
            .with_deadline(outcome.deadline)
            .with_cancel(cancel.map_or_else(CancellationToken::new, CancellationToken::child_token));
        Ok(ResultCursor::new(pager))
    }

    /// Cancel a running statement on the server and stop polling it locally.
    pub async fn cancel(&self, statement_id: &str) -> Result<()> {
        self.coordinator.cancel(statement_id).await
    }

    /// Release the server-side resources of one statement.
    pub async fn close(&self, statement_id: &str) -> Result<()> {
        self.coordinator.close(statement_id).await
    }

    /// Ids of statements currently being driven by this client.
    pub fn running_statements(&self) -> Vec<String> {
        self.coordinator.tracker().active()
    }

    pub async fn catalogs(&self) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol.catalogs(&session, &self.context()).await
    }

    pub async fn schemas(&self, filter: &MetadataFilter) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol.schemas(&session, filter, &self.context()).await
    }

    pub async fn tables(&self, filter: &MetadataFilter) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol.tables(&session, filter, &self.context()).await
    }

    pub async fn columns(&self, filter: &MetadataFilter) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol.columns(&session, filter, &self.context()).await
    }

    pub async fn primary_keys(&self, filter: &MetadataFilter) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol.primary_keys(&session, filter, &self.context()).await
    }

    pub async fn cross_references(
        &self,
        parent: &MetadataFilter,
        foreign: &MetadataFilter,
    ) -> Result<ResultDescriptor> {
        let session = self.connect().await?;
        self.protocol
            .cross_references(&session, parent, foreign, &self.context())
            .await
    }

    /// Cancel running statements, close the session and release this
    /// client's transport lease.
    pub async fn disconnect(&self) -> Result<()> {
        for statement_id in self.running_statements() {
            if let Err(e) = self.coordinator.cancel(&statement_id).await {
                warn!("[LINK_EXEC] Cancel of statement {} on disconnect failed: {}", statement_id, e);
            }
        }

        let closed = match self.session.lock().await.take() {
            Some(session) => self.protocol.close_session(&session, &self.context()).await,
            None => Ok(()),
        };

        let lease = self.lease.lock().ok().and_then(|mut lease| lease.take());
        if let Some((registry, key)) = lease {
            if registry.release(&key) {
                debug!("[LINK_POOL] Released transport {}", key);
            }
        }
        closed
    }
}

/// Builder for configuring [`WarehouseClient`] instances.
pub struct WarehouseClientBuilder {
    config: Option<ConnectionConfig>,
    credentials: ArcCredentialProvider,
    transport: Option<Arc<dyn HttpTransport>>,
    protocol: Option<ArcProtocolClient>,
    registry: Option<Arc<TransportRegistry>>,
    tracker: Option<Arc<StatementTracker>>,
}

impl WarehouseClientBuilder {
    fn new() -> Self {
        Self {
            config: None,
            credentials: Arc::new(StaticCredentials::None),
            transport: None,
            protocol: None,
            registry: None,
            tracker: None,
        }
    }

    /// Set the connection configuration (required)
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a credential provider, e.g. [`StaticCredentials::bearer`]
    pub fn credentials<C>(mut self, credentials: C) -> Self
    where
        C: crate::auth::CredentialProvider + 'static,
    {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn credential_provider(mut self, credentials: ArcCredentialProvider) -> Self {
        self.credentials = credentials;
        self
    }

    /// Shorthand for a personal access token.
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.credentials(StaticCredentials::bearer(token))
    }

    /// Send HTTP through `transport` instead of a pooled reqwest client.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a ready-made protocol client; transport and credentials are ignored.
    pub fn protocol_client(mut self, protocol: ArcProtocolClient) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Lease the transport from a shared registry.
    pub fn registry(mut self, registry: Arc<TransportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tracker(mut self, tracker: Arc<StatementTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<WarehouseClient> {
        let config = self
            .config
            .ok_or_else(|| LinkError::Configuration("config is required".into()))?;
        config.validate()?;

        let mut lease = None;
        let protocol = match self.protocol {
            Some(protocol) => protocol,
            None => {
                let transport = match self.transport {
                    Some(transport) => transport,
                    None => {
                        let registry = self.registry.unwrap_or_else(|| {
                            Arc::new(TransportRegistry::new(config.timeouts.idle_connection_timeout))
                        });
                        let key = TransportKey::new(&config.host, config.compute.id());
                        let transport = registry.lease(&key, || {
                            let transport = ReqwestTransport::builder()
                                .timeouts(&config.timeouts)
                                .max_idle_per_host(config.max_idle_connections_per_host)
                                .proxy(config.proxy.clone())
                                .build()?;
                            Ok(Arc::new(transport) as Arc<dyn HttpTransport>)
                        })?;
                        lease = Some((registry, key));
                        transport
                    },
                };
                build_protocol(&config, transport, self.credentials)
            },
        };

        let tracker = self.tracker.unwrap_or_default();
        let coordinator = ExecutionCoordinator::new(Arc::clone(&protocol), tracker)
            .with_poll_interval(config.timeouts.poll_interval)
            .with_overall_timeout(config.timeouts.overall_budget());
        debug!(
            "[LINK_EXEC] Built client for {} on {} ({})",
            config.host,
            config.compute,
            protocol.backend()
        );

        Ok(WarehouseClient {
            config: Arc::new(config),
            protocol,
            coordinator,
            session: Arc::new(Mutex::new(None)),
            lease: Arc::new(std::sync::Mutex::new(lease)),
        })
    }
}

fn build_protocol(
    config: &ConnectionConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: ArcCredentialProvider,
) -> ArcProtocolClient {
    let engine = RetryEngine::new(transport, config.retry.clone(), config.backoff.clone())
        .with_request_timeout(config.timeouts.request_timeout);
    match config.backend {
        Backend::Rest => Arc::new(
            RestExecutionClient::new(&config.host, config.compute.id(), engine, credentials)
                .with_wait_timeout(config.timeouts.wait_timeout),
        ),
        Backend::Rpc => Arc::new(BinaryRpcClient::new(&config.host, engine, credentials)),
    }
}
