mod common;

use std::sync::Arc;

use prost::Message;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fresh_link, ScriptedTransport};
use warehouse_link::codec::{encode_rows, ColumnarBatch};
use warehouse_link::protocol::rpc_messages::{
    DirectResults, FetchResultsReq, FetchResultsResp, GetOperationStatusResp, OpenSessionResp,
    OperationHandle, OperationResp, OperationState, ResultSetMetadata, RpcColumn,
    RpcSessionHandle, RpcStatus, StatusResp,
};
use warehouse_link::{
    Backend, BackoffPolicy, BinaryRpcClient, ColumnInfo, ComputeRef, ConnectionConfig, HttpTransport,
    LinkError, MetadataFilter, ProtocolClient, RequestContext, ResultData, RetryBudget,
    RetryEngine, Row, StatementHandle, StatementState, StaticCredentials, Value,
    WarehouseClient,
};

const TOKEN: &str = "dapi-rpc-token";
const SESSION_GUID: [u8; 3] = [0xab, 0xcd, 0x01];
const OPERATION_GUID: [u8; 2] = [0x0f, 0xa0];

fn proto<M: Message>(message: M) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(message.encode_to_vec(), "application/x-protobuf")
}

fn client(server: &MockServer) -> WarehouseClient {
    let config = ConnectionConfig::new(server.uri(), ComputeRef::Cluster("0101-abc".into()))
        .with_backend(Backend::Rpc);
    WarehouseClient::builder()
        .config(config)
        .bearer_token(TOKEN)
        .build()
        .unwrap()
}

fn rpc_columns() -> Vec<RpcColumn> {
    vec![
        RpcColumn {
            name: "id".into(),
            type_name: "BIGINT".into(),
            position: 0,
        },
        RpcColumn {
            name: "name".into(),
            type_name: "STRING".into(),
            position: 1,
        },
    ]
}

fn batch(rows: &[Row]) -> ColumnarBatch {
    let columns: Vec<ColumnInfo> = rpc_columns().iter().map(Into::into).collect();
    let bytes = encode_rows(&columns, rows).unwrap();
    ColumnarBatch::decode(bytes.as_slice()).unwrap()
}

fn page(rows: &[Row], has_more_rows: bool, with_metadata: bool) -> FetchResultsResp {
    FetchResultsResp {
        status: Some(RpcStatus::success()),
        has_more_rows,
        metadata: with_metadata.then(|| ResultSetMetadata {
            columns: rpc_columns(),
        }),
        batch: Some(batch(rows)),
    }
}

fn operation() -> OperationHandle {
    OperationHandle {
        guid: OPERATION_GUID.to_vec(),
        has_result_set: true,
    }
}

fn operation_status(state: OperationState) -> GetOperationStatusResp {
    GetOperationStatusResp {
        status: Some(RpcStatus::success()),
        operation_state: state as i32,
        error_code: String::new(),
        error_message: String::new(),
    }
}

fn user(id: i64, name: Option<&str>) -> Row {
    Row::new(vec![Value::Int64(id), name.map(Value::from).unwrap_or(Value::Null)])
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rpc/v1/OpenSession"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(proto(OpenSessionResp {
            status: Some(RpcStatus::success()),
            session: Some(RpcSessionHandle {
                guid: SESSION_GUID.to_vec(),
                secret: vec![7, 7],
            }),
        }))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn session_id_is_hex_of_session_guid() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    let client = client(&server);
    let session = client.connect().await.unwrap();
    assert_eq!(session.id(), "abcd01");
    assert_eq!(session.secret(), &[7, 7]);

    // A second connect reuses the open session.
    assert_eq!(client.connect().await.unwrap(), session);
}

#[tokio::test]
async fn pending_operation_is_polled_then_paged_in() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/ExecuteStatement"))
        .respond_with(proto(OperationResp {
            status: Some(RpcStatus::success()),
            operation: Some(operation()),
            direct_results: None,
        }))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/GetOperationStatus"))
        .respond_with(proto(operation_status(OperationState::Finished)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/FetchResults"))
        .respond_with(proto(page(&[user(1, Some("a")), user(2, None)], true, true)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/FetchResults"))
        .respond_with(proto(page(&[user(3, Some("c"))], false, false)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/CloseOperation"))
        .respond_with(proto(StatusResp {
            status: Some(RpcStatus::success()),
        }))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/CloseSession"))
        .respond_with(proto(StatusResp {
            status: Some(RpcStatus::success()),
        }))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut cursor = client.execute("SELECT id, name FROM users", Vec::new()).await.unwrap();
    assert_eq!(cursor.statement_id(), "0fa0");
    assert_eq!(cursor.state(), StatementState::Succeeded);
    assert_eq!(cursor.columns()[0].name, "id");
    assert_eq!(
        cursor.collect_all().await.unwrap(),
        vec![user(1, Some("a")), user(2, None), user(3, Some("c"))]
    );

    let fetches: Vec<FetchResultsReq> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/rpc/v1/FetchResults")
        .map(|request| FetchResultsReq::decode(request.body.as_slice()).unwrap())
        .collect();
    assert_eq!(fetches.len(), 2);
    assert!(fetches[0].include_metadata);
    assert!(!fetches[1].include_metadata);
    assert_eq!(fetches[0].operation, Some(operation()));

    client.disconnect().await.unwrap();
    assert!(client.session().await.is_none());
}

#[tokio::test]
async fn direct_results_skip_status_polling() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/ExecuteStatement"))
        .respond_with(proto(OperationResp {
            status: Some(RpcStatus::success()),
            operation: Some(operation()),
            direct_results: Some(DirectResults {
                operation_status: Some(operation_status(OperationState::Finished)),
                result_set: Some(page(&[user(42, Some("answer"))], false, true)),
            }),
        }))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/GetOperationStatus"))
        .respond_with(proto(operation_status(OperationState::Running)))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/FetchResults"))
        .respond_with(proto(page(&[], false, false)))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/CloseOperation"))
        .respond_with(proto(StatusResp {
            status: Some(RpcStatus::success()),
        }))
        .expect(1)
        .mount(&server)
        .await;

    let mut cursor = client(&server).execute("SELECT 42", Vec::new()).await.unwrap();
    assert_eq!(cursor.collect_all().await.unwrap(), vec![user(42, Some("answer"))]);
}

#[tokio::test]
async fn failed_operation_reports_server_error() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/ExecuteStatement"))
        .respond_with(proto(OperationResp {
            status: Some(RpcStatus::success()),
            operation: Some(operation()),
            direct_results: Some(DirectResults {
                operation_status: Some(GetOperationStatusResp {
                    error_code: "TABLE_OR_VIEW_NOT_FOUND".into(),
                    error_message: "Table `missing` not found".into(),
                    ..operation_status(OperationState::Error)
                }),
                result_set: None,
            }),
        }))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .execute("SELECT * FROM missing", Vec::new())
        .await
        .unwrap_err();

    match err {
        LinkError::ExecutionFailed {
            statement_id,
            state,
            error_code,
            message,
            ..
        } => {
            assert_eq!(statement_id, "0fa0");
            assert_eq!(state, StatementState::Failed);
            assert_eq!(error_code.as_deref(), Some("TABLE_OR_VIEW_NOT_FOUND"));
            assert_eq!(message, "Table `missing` not found");
        },
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn error_status_on_open_session_is_a_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/OpenSession"))
        .respond_with(proto(OpenSessionResp {
            status: Some(RpcStatus::error("INVALID_STATE", "Cluster is terminated")),
            session: None,
        }))
        .expect(1)
        .mount(&server)
        .await;

    match client(&server).connect().await {
        Err(LinkError::Protocol(message)) => {
            assert!(message.contains("INVALID_STATE"), "{}", message);
            assert!(message.contains("Cluster is terminated"), "{}", message);
        },
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn catalogs_are_read_and_operation_closed() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    let catalog_column = vec![RpcColumn {
        name: "TABLE_CAT".into(),
        type_name: "STRING".into(),
        position: 0,
    }];
    let columns: Vec<ColumnInfo> = catalog_column.iter().map(Into::into).collect();
    let rows = vec![Row::new(vec![Value::from("main")]), Row::new(vec![Value::from("samples")])];
    let batch = ColumnarBatch::decode(encode_rows(&columns, &rows).unwrap().as_slice()).unwrap();

    Mock::given(method("POST"))
        .and(path("/rpc/v1/GetCatalogs"))
        .respond_with(proto(OperationResp {
            status: Some(RpcStatus::success()),
            operation: Some(operation()),
            direct_results: Some(DirectResults {
                operation_status: Some(operation_status(OperationState::Finished)),
                result_set: Some(FetchResultsResp {
                    status: Some(RpcStatus::success()),
                    has_more_rows: false,
                    metadata: Some(ResultSetMetadata {
                        columns: catalog_column,
                    }),
                    batch: Some(batch),
                }),
            }),
        }))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc/v1/CloseOperation"))
        .respond_with(proto(StatusResp {
            status: Some(RpcStatus::success()),
        }))
        .expect(1)
        .mount(&server)
        .await;

    let descriptor = client(&server).catalogs().await.unwrap();
    assert_eq!(descriptor.columns[0].name, "TABLE_CAT");
    match descriptor.data {
        ResultData::Inline(found) => assert_eq!(found, rows),
        other => panic!("expected inline rows, got {:?}", other),
    }
}

#[tokio::test]
async fn key_metadata_is_unsupported_without_a_request() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    let client = client(&server);
    let filter = MetadataFilter::default();

    match client.primary_keys(&filter).await {
        Err(LinkError::UnsupportedOperation { operation, backend }) => {
            assert_eq!(operation, "primary_keys");
            assert_eq!(backend, "rpc");
        },
        other => panic!("unexpected result {:?}", other),
    }
    assert!(matches!(
        client.cross_references(&filter, &filter).await,
        Err(LinkError::UnsupportedOperation {
            operation: "cross_references",
            ..
        })
    ));

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/rpc/v1/OpenSession".to_string()]);
}

#[tokio::test]
async fn chunk_fetch_is_unsupported() {
    let transport = ScriptedTransport::new();
    let engine = RetryEngine::new(
        transport.clone() as Arc<dyn HttpTransport>,
        RetryBudget::default(),
        BackoffPolicy::default(),
    );
    let client = BinaryRpcClient::new(
        "https://cluster.example.com",
        engine,
        Arc::new(StaticCredentials::bearer(TOKEN)),
    );

    let err = client
        .fetch_chunk(&StatementHandle::new("0fa0"), &fresh_link(0, 10), &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::UnsupportedOperation {
            operation: "fetch_chunk",
            backend: "rpc"
        }
    ));
    assert_eq!(transport.calls(), 0);
}
