//! Protobuf messages of the binary RPC service.
//!
//! Each request is POSTed to `/rpc/v1/<Method>` and answered with the
//! matching response message. Every response carries an [`RpcStatus`].

use std::collections::HashMap;

use crate::codec::ColumnarBatch;
use crate::models::{ColumnInfo, StatementState};

/// Outcome class of an RPC call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    SuccessWithInfo = 1,
    StillExecuting = 2,
    Error = 3,
    InvalidHandle = 4,
}

/// Server-side lifecycle of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum OperationState {
    Initialized = 0,
    Pending = 1,
    Running = 2,
    Finished = 3,
    Canceled = 4,
    Closed = 5,
    Error = 6,
    TimedOut = 7,
}

impl OperationState {
    pub fn to_statement_state(self) -> StatementState {
        match self {
            OperationState::Initialized | OperationState::Pending => StatementState::Pending,
            OperationState::Running => StatementState::Running,
            OperationState::Finished => StatementState::Succeeded,
            OperationState::Canceled => StatementState::Canceled,
            OperationState::Closed => StatementState::Closed,
            OperationState::Error | OperationState::TimedOut => StatementState::Failed,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcStatus {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub code: i32,

    #[prost(string, tag = "2")]
    pub error_code: String,

    #[prost(string, tag = "3")]
    pub error_message: String,
}

impl RpcStatus {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success as i32,
            error_code: String::new(),
            error_message: String::new(),
        }
    }

    pub fn error(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error as i32,
            error_code: error_code.into(),
            error_message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::try_from(self.code).unwrap_or(StatusCode::Error)
    }

    pub fn is_ok(&self) -> bool {
        matches!(
            self.status_code(),
            StatusCode::Success | StatusCode::SuccessWithInfo | StatusCode::StillExecuting
        )
    }
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct RpcSessionHandle {
    #[prost(bytes = "vec", tag = "1")]
    pub guid: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub secret: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct OperationHandle {
    #[prost(bytes = "vec", tag = "1")]
    pub guid: Vec<u8>,

    #[prost(bool, tag = "2")]
    pub has_result_set: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenSessionReq {
    #[prost(string, tag = "1")]
    pub compute_id: String,

    #[prost(string, optional, tag = "2")]
    pub catalog: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub schema: Option<String>,

    #[prost(map = "string, string", tag = "4")]
    pub configuration: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenSessionResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,

    #[prost(message, optional, tag = "2")]
    pub session: Option<RpcSessionHandle>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CloseSessionReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,
}

/// Response of calls that only report a status.
#[derive(Clone, PartialEq, prost::Message)]
pub struct StatusResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcParameter {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,

    #[prost(string, tag = "3")]
    pub type_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DirectResultsReq {
    #[prost(int64, tag = "1")]
    pub max_rows: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExecuteStatementReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,

    #[prost(string, tag = "2")]
    pub statement: String,

    #[prost(message, repeated, tag = "3")]
    pub parameters: Vec<RpcParameter>,

    #[prost(bool, tag = "4")]
    pub run_async: bool,

    #[prost(message, optional, tag = "5")]
    pub direct_results: Option<DirectResultsReq>,

    #[prost(bool, tag = "6")]
    pub columnar: bool,
}

/// Results returned together with the response of an operation-starting call.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DirectResults {
    #[prost(message, optional, tag = "1")]
    pub operation_status: Option<GetOperationStatusResp>,

    #[prost(message, optional, tag = "2")]
    pub result_set: Option<FetchResultsResp>,
}

/// Response of ExecuteStatement and of the metadata calls.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OperationResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,

    #[prost(message, optional, tag = "2")]
    pub operation: Option<OperationHandle>,

    #[prost(message, optional, tag = "3")]
    pub direct_results: Option<DirectResults>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OperationReq {
    #[prost(message, optional, tag = "1")]
    pub operation: Option<OperationHandle>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetOperationStatusResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,

    #[prost(enumeration = "OperationState", tag = "2")]
    pub operation_state: i32,

    #[prost(string, tag = "3")]
    pub error_code: String,

    #[prost(string, tag = "4")]
    pub error_message: String,
}

impl GetOperationStatusResp {
    pub fn state(&self) -> OperationState {
        OperationState::try_from(self.operation_state).unwrap_or(OperationState::Error)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchResultsReq {
    #[prost(message, optional, tag = "1")]
    pub operation: Option<OperationHandle>,

    #[prost(int64, tag = "2")]
    pub max_rows: i64,

    #[prost(bool, tag = "3")]
    pub include_metadata: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcColumn {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub type_name: String,

    #[prost(uint32, tag = "3")]
    pub position: u32,
}

impl From<&RpcColumn> for ColumnInfo {
    fn from(column: &RpcColumn) -> Self {
        ColumnInfo::new(column.name.clone(), column.type_name.clone(), column.position as usize)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResultSetMetadata {
    #[prost(message, repeated, tag = "1")]
    pub columns: Vec<RpcColumn>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchResultsResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,

    #[prost(bool, tag = "2")]
    pub has_more_rows: bool,

    #[prost(message, optional, tag = "3")]
    pub metadata: Option<ResultSetMetadata>,

    #[prost(message, optional, tag = "4")]
    pub batch: Option<ColumnarBatch>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetCatalogsReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetSchemasReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,

    #[prost(string, optional, tag = "2")]
    pub catalog: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub schema_pattern: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTablesReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,

    #[prost(string, optional, tag = "2")]
    pub catalog: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub schema_pattern: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub table_pattern: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetColumnsReq {
    #[prost(message, optional, tag = "1")]
    pub session: Option<RpcSessionHandle>,

    #[prost(string, optional, tag = "2")]
    pub catalog: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub schema_pattern: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub table_pattern: Option<String>,

    #[prost(string, optional, tag = "5")]
    pub column_pattern: Option<String>,
}

/// Lower-case hex rendering of a handle guid.
pub fn guid_hex(guid: &[u8]) -> String {
    hex::encode(guid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_operation_state_mapping() {
        assert_eq!(OperationState::Initialized.to_statement_state(), StatementState::Pending);
        assert_eq!(OperationState::Running.to_statement_state(), StatementState::Running);
        assert_eq!(OperationState::Finished.to_statement_state(), StatementState::Succeeded);
        assert_eq!(OperationState::TimedOut.to_statement_state(), StatementState::Failed);
        assert_eq!(OperationState::Canceled.to_statement_state(), StatementState::Canceled);
    }

    #[test]
    fn test_unknown_enum_values_degrade_to_error() {
        let resp = GetOperationStatusResp {
            status: None,
            operation_state: 42,
            error_code: String::new(),
            error_message: String::new(),
        };
        assert_eq!(resp.state(), OperationState::Error);

        let status = RpcStatus {
            code: 99,
            ..RpcStatus::success()
        };
        assert!(!status.is_ok());
    }

    #[test]
    fn test_guid_hex() {
        assert_eq!(guid_hex(&[0x01, 0xab, 0xff]), "01abff");
        assert_eq!(guid_hex(&[0x00, 0x0f]), "000f");
        assert_eq!(guid_hex(&[]), "");
    }

    #[test]
    fn test_execute_request_wire_roundtrip() {
        let request = ExecuteStatementReq {
            session: Some(RpcSessionHandle {
                guid: vec![1, 2],
                secret: vec![3],
            }),
            statement: "SELECT 1".into(),
            parameters: vec![RpcParameter {
                name: None,
                value: Some("1".into()),
                type_name: "INT".into(),
            }],
            run_async: true,
            direct_results: Some(DirectResultsReq { max_rows: 1000 }),
            columnar: true,
        };
        let decoded = ExecuteStatementReq::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, request);
    }
}
