//! Resilient SQL warehouse client.
//!
//! Statements run against a remote warehouse or cluster over either the JSON
//! statement-execution API or a binary RPC service. Every outbound call goes
//! through a retry engine that classifies failures (throttling, transient
//! server errors, network faults) and applies per-class budgets. Results come
//! back inline or as a set of expiring chunk links, and are consumed through a
//! lazy, forward-only cursor.
//!
//! # Example
//!
//! ```rust,no_run
//! use warehouse_link::{ComputeRef, ConnectionConfig, QueryParameter, WarehouseClient};
//!
//! # async fn example() -> warehouse_link::Result<()> {
//! let client = WarehouseClient::builder()
//!     .config(ConnectionConfig::new(
//!         "https://example.cloud.warehouse.com",
//!         ComputeRef::Warehouse("abc123".into()),
//!     ))
//!     .bearer_token("dapi-token")
//!     .build()?;
//!
//! let mut cursor = client
//!     .execute("SELECT * FROM trips WHERE fare > ?", vec![QueryParameter::positional(10i64)])
//!     .await?;
//! let rows = cursor.collect_all().await?;
//! println!("{} row(s)", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod protocol;
pub mod result;
pub mod retry;
pub mod timeouts;
pub mod transport;

pub use auth::{ArcCredentialProvider, CredentialProvider, StaticCredentials};
pub use client::{Driver, WarehouseClient, WarehouseClientBuilder};
pub use config::ConnectionConfig;
pub use error::{FailureCategory, LinkError, Result};
pub use execution::{ExecutionCoordinator, ExecutionOutcome, StatementTracker};
pub use models::{
    Backend, ChunkLink, ColumnInfo, ColumnType, ComputeRef, QueryParameter, ResultData,
    ResultDescriptor, Row, ServerError, SessionHandle, StatementHandle, StatementState,
    StatementStatus, Submission, Value,
};
pub use protocol::{
    ArcProtocolClient, BinaryRpcClient, MetadataFilter, ProtocolClient, RestExecutionClient,
    SessionOptions, StatementRequest,
};
pub use result::{ChunkLinks, ResultCursor, ResultPager};
pub use retry::{BackoffPolicy, RequestContext, RetryBudget, RetryEngine};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ProxySettings, ReqwestTransport, TransportFailure,
    TransportFailureKind, TransportKey, TransportRegistry,
};
