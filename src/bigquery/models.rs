// BigQuery REST API request and response models

use crate::cache::QueryParams;
use crate::warehouse::{JobOptions, QueryPriority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `POST /projects/{project}/queries` (jobs.query).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub use_legacy_sql: bool,
    pub dry_run: bool,
    pub use_query_cache: bool,

    /// int64 values travel as decimal strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_options: Option<FormatOptions>,
}

impl QueryRequest {
    /// Non-billed validation request. The service cache is always bypassed so
    /// the estimate reflects a real scan.
    pub fn dry_run(sql: &str, options: &JobOptions, location: Option<&str>) -> Self {
        let (parameter_mode, query_parameters) = encode_parameters(options.parameters.as_ref());
        Self {
            query: sql.to_string(),
            use_legacy_sql: options.use_legacy_sql,
            dry_run: true,
            use_query_cache: false,
            maximum_bytes_billed: options.maximum_bytes_billed.map(|b| b.to_string()),
            location: location.map(str::to_string),
            labels: BTreeMap::new(),
            parameter_mode,
            query_parameters,
            request_id: None,
            timeout_ms: None,
            format_options: None,
        }
    }

    /// Billed request carrying every job customisation.
    pub fn execute(
        sql: &str,
        options: &JobOptions,
        location: Option<&str>,
        request_id: String,
        timeout_ms: u64,
    ) -> Self {
        let (parameter_mode, query_parameters) = encode_parameters(options.parameters.as_ref());
        Self {
            query: sql.to_string(),
            use_legacy_sql: options.use_legacy_sql,
            dry_run: false,
            use_query_cache: options.use_query_cache,
            maximum_bytes_billed: options.maximum_bytes_billed.map(|b| b.to_string()),
            location: location.map(str::to_string),
            labels: options.labels.clone(),
            parameter_mode,
            query_parameters,
            request_id: Some(request_id),
            timeout_ms: Some(timeout_ms),
            format_options: Some(FormatOptions::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    /// Timestamps come back as int64 microseconds instead of float seconds.
    pub use_int64_timestamp: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            use_int64_timestamp: true,
        }
    }
}

/// Body of `POST /projects/{project}/jobs` (jobs.insert), used for
/// batch-priority queries which jobs.query cannot schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInsertRequest {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub query: JobConfigurationQuery,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: String,
    pub use_legacy_sql: bool,
    pub use_query_cache: bool,
    pub priority: QueryPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameter>,
}

impl JobInsertRequest {
    pub fn query(
        sql: &str,
        options: &JobOptions,
        project_id: &str,
        location: Option<&str>,
        job_id: String,
    ) -> Self {
        let (parameter_mode, query_parameters) = encode_parameters(options.parameters.as_ref());
        Self {
            job_reference: JobReference {
                project_id: project_id.to_string(),
                job_id,
                location: location.map(str::to_string),
            },
            configuration: JobConfiguration {
                query: JobConfigurationQuery {
                    query: sql.to_string(),
                    use_legacy_sql: options.use_legacy_sql,
                    use_query_cache: options.use_query_cache,
                    priority: options.priority,
                    maximum_bytes_billed: options.maximum_bytes_billed.map(|b| b.to_string()),
                    parameter_mode,
                    query_parameters,
                },
                labels: options.labels.clone(),
                dry_run: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    /// Absent on dry-run responses.
    #[serde(default)]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Named query parameter (`@name`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub parameter_value: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterType {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_type: Option<Box<ParameterType>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_values: Option<Vec<ParameterValue>>,
}

impl ParameterType {
    fn scalar(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            array_type: None,
        }
    }
}

/// Maps JSON parameter values onto BigQuery parameter types.
///
/// Strings are STRING, integers INT64, other numbers FLOAT64, booleans BOOL,
/// arrays ARRAY of their first element's type, objects JSON. Null is a
/// valueless STRING.
pub fn encode_parameter(name: &str, value: &Value) -> QueryParameter {
    let (parameter_type, parameter_value) = encode_value(value);
    QueryParameter {
        name: name.to_string(),
        parameter_type,
        parameter_value,
    }
}

fn encode_value(value: &Value) -> (ParameterType, ParameterValue) {
    let scalar = |type_name: &str, value: Option<String>| {
        (
            ParameterType::scalar(type_name),
            ParameterValue {
                value,
                array_values: None,
            },
        )
    };

    match value {
        Value::Null => scalar("STRING", None),
        Value::Bool(b) => scalar("BOOL", Some(b.to_string())),
        Value::Number(n) if n.is_i64() || n.is_u64() => scalar("INT64", Some(n.to_string())),
        Value::Number(n) => scalar("FLOAT64", Some(n.to_string())),
        Value::String(s) => scalar("STRING", Some(s.clone())),
        Value::Array(items) => {
            let element_type = items
                .first()
                .map(|first| encode_value(first).0)
                .unwrap_or_else(|| ParameterType::scalar("STRING"));
            let values = items.iter().map(|item| encode_value(item).1).collect();
            (
                ParameterType {
                    type_name: "ARRAY".to_string(),
                    array_type: Some(Box::new(element_type)),
                },
                ParameterValue {
                    value: None,
                    array_values: Some(values),
                },
            )
        }
        Value::Object(_) => scalar("JSON", Some(value.to_string())),
    }
}

fn encode_parameters(params: Option<&QueryParams>) -> (Option<String>, Vec<QueryParameter>) {
    match params.filter(|p| !p.is_empty()) {
        Some(params) => (
            Some("NAMED".to_string()),
            params
                .iter()
                .map(|(name, value)| encode_parameter(name, value))
                .collect(),
        ),
        None => (None, Vec::new()),
    }
}

/// Response of jobs.query and jobs.getQueryResults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: Option<bool>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub total_rows: Option<String>,
    #[serde(default)]
    pub total_bytes_processed: Option<String>,
    #[serde(default)]
    pub total_bytes_billed: Option<String>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
}

impl QueryResponse {
    pub fn is_complete(&self) -> bool {
        self.job_complete.unwrap_or(false)
    }
}

/// Response of jobs.get and jobs.insert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub statistics: Option<JobStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobStatistics {
    #[serde(default)]
    pub query: Option<QueryStatistics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    #[serde(default)]
    pub total_bytes_billed: Option<String>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldSchema>>,
}

impl FieldSchema {
    pub fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }

    pub fn is_required(&self) -> bool {
        self.mode.as_deref() == Some("REQUIRED")
    }
}

/// One result row: cells in schema order.
#[derive(Debug, Clone, Deserialize)]
pub struct Row {
    #[serde(rename = "f", default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub v: Value,
}

/// Response of tables.get.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_reference: TableReference,
    #[serde(default)]
    pub num_rows: Option<String>,
    #[serde(default)]
    pub num_bytes: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}
