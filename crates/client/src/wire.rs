//! JSON bodies exchanged with the statements API.

use serde::{Deserialize, Serialize};

/// One raw row: cells are strings on the wire, SQL NULL is `null`.
pub type RawRow = Vec<Option<String>>;

/// Body of `POST /api/v2/statements`.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRequest {
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<serde_json::Value>,
    /// Server-side execution timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub parameters: StatementParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementParameters {
    /// Sent as a string, which is what the service documents.
    #[serde(rename = "MULTI_STATEMENT_COUNT")]
    pub multi_statement_count: String,
}

/// Response to a submission, poll, or (final) completed statement.
///
/// A pending (202) response only carries the handle; a completed one also
/// carries metadata and the first partition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    pub statement_handle: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    pub data: Option<Vec<RawRow>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    #[serde(default)]
    pub num_rows: Option<u64>,
    pub row_type: Vec<RowType>,
    #[serde(default)]
    pub partition_info: Vec<PartitionInfo>,
}

/// Column description as sent by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub scale: Option<i64>,
    #[serde(default)]
    pub precision: Option<i64>,
    #[serde(default)]
    pub nullable: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub row_count: usize,
}

/// Body of `GET /api/v2/statements/{handle}?partition=n`.
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionResponse {
    #[serde(default)]
    pub data: Vec<RawRow>,
}
