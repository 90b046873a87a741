//! Data model shared by the protocol clients, the execution coordinator and
//! the result pager.

pub mod backend;
pub mod chunk_link;
pub mod column_info;
pub mod compute_ref;
pub mod query_parameter;
pub mod result_descriptor;
pub mod row;
pub mod server_error;
pub mod session_handle;
pub mod statement_handle;
pub mod statement_state;
pub mod statement_status;
pub mod value;


pub use backend::Backend;
pub use chunk_link::ChunkLink;
pub use column_info::{ColumnInfo, ColumnType};
pub use compute_ref::ComputeRef;
pub use query_parameter::QueryParameter;
pub use result_descriptor::{ResultData, ResultDescriptor};
pub use row::Row;
pub use server_error::ServerError;
pub use session_handle::SessionHandle;
pub use statement_handle::StatementHandle;
pub use statement_state::StatementState;
pub use statement_status::{StatementStatus, Submission};
pub use value::Value;
