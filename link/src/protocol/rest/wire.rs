//! JSON bodies of the statement-execution API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChunkLink, ColumnInfo, QueryParameter, ServerError, StatementState};

pub(crate) const DISPOSITION_INLINE: &str = "INLINE";
pub(crate) const DISPOSITION_EXTERNAL_LINKS: &str = "EXTERNAL_LINKS";
pub(crate) const FORMAT_JSON_ARRAY: &str = "JSON_ARRAY";
pub(crate) const FORMAT_COLUMNAR: &str = "COLUMNAR";

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub warehouse_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub session_confs: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteStatementRequest<'a> {
    pub statement: &'a str,
    pub warehouse_id: &'a str,
    pub session_id: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<WireParameter>,
    pub wait_timeout: String,
    pub on_wait_timeout: &'static str,
    pub disposition: &'static str,
    pub format: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct WireParameter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl From<&QueryParameter> for WireParameter {
    fn from(parameter: &QueryParameter) -> Self {
        Self {
            name: parameter.name.clone(),
            value: parameter.value_text(),
            type_name: parameter.effective_type_name(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementResponse {
    pub statement_id: String,
    pub status: WireStatus,
    #[serde(default)]
    pub manifest: Option<Manifest>,
    #[serde(default)]
    pub result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStatus {
    pub state: StatementState,
    #[serde(default)]
    pub error: Option<ServerError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Manifest {
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub total_chunk_count: Option<u64>,
    #[serde(default)]
    pub total_row_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Schema {
    #[serde(default)]
    pub columns: Vec<WireColumn>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireColumn {
    pub name: String,
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub position: Option<usize>,
}

/// `result` of a status response, and the body of the chunks endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResultChunk {
    #[serde(default)]
    pub data_array: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub external_links: Option<Vec<ExternalLink>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExternalLink {
    pub chunk_index: u64,
    #[serde(default)]
    pub row_offset: u64,
    #[serde(default)]
    pub row_count: u64,
    pub external_link: String,
    pub expiration: DateTime<Utc>,
}

impl From<ExternalLink> for ChunkLink {
    fn from(link: ExternalLink) -> Self {
        ChunkLink {
            index: link.chunk_index,
            url: link.external_link,
            expires_at: link.expiration,
            row_count: link.row_count,
            row_offset: link.row_offset,
        }
    }
}

impl Manifest {
    pub(crate) fn columns(&self) -> Vec<ColumnInfo> {
        self.schema
            .as_ref()
            .map(|schema| {
                schema
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        ColumnInfo::new(
                            column.name.clone(),
                            column.type_name.clone(),
                            column.position.unwrap_or(index),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Format the sync wait budget the way the API expects (`"10s"`).
pub(crate) fn wait_timeout_param(secs: u64) -> String {
    format!("{}s", secs)
}
