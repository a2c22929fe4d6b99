// BigQuery REST client implementing the query service

use super::models::{Job, JobInsertRequest, JobReference, QueryRequest, QueryResponse, Row, Table};
use super::rows::decode_rows;
use crate::auth::TokenManager;
use crate::config::BigQueryConfig;
use crate::error::{GuardError, RemoteError, Result};
use crate::utils::logging::sanitize;
use crate::warehouse::{
    DryRunStats, JobOptions, QueryPriority, QueryResult, QueryService, TableField, TableInfo,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Server-side wait per jobs.query / getQueryResults call.
const SERVER_WAIT_MS: u64 = 10_000;

/// Client for the BigQuery v2 REST API.
///
/// Implements [`QueryService`]: dry runs, billed executions with result
/// polling and page draining, and table metadata lookups. Never retries on
/// its own; see [`crate::utils::retry::with_retry`].
pub struct BigQueryClient {
    http_client: Client,
    config: BigQueryConfig,
    token_manager: TokenManager,
}

impl BigQueryClient {
    /// Create a new client for `config.project_id`.
    pub fn new(config: &BigQueryConfig, token_manager: TokenManager) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(GuardError::Config(
                "bigquery.project_id is required".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .use_rustls_tls()
            .build()
            .map_err(|e| GuardError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created BigQuery HTTP client for {}", config.api_base_url);

        Ok(Self {
            http_client,
            config: config.clone(),
            token_manager,
        })
    }

    /// Get the project that runs the jobs
    pub fn project_id(&self) -> &str {
        self.config.project_id.trim()
    }

    /// Get the API base_url
    pub fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    fn project_url(&self, project: &str) -> String {
        format!("{}/projects/{}", self.base_url(), project)
    }

    /// Send an authorized request and decode a JSON response.
    ///
    /// Remote failures are wrapped by `classify` and carry the HTTP status
    /// when one was received.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        classify: fn(RemoteError) -> GuardError,
    ) -> Result<T> {
        let token = self.token_manager.get_token().await?;

        let response = request.bearer_auth(token).send().await.map_err(|e| {
            classify(RemoteError::transport(format!(
                "HTTP error: {}",
                sanitize(&e.to_string())
            )))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            classify(RemoteError::transport(format!(
                "Failed to read response body: {}",
                e
            )))
        })?;

        if !status.is_success() {
            let message = Self::extract_error_message(&body).unwrap_or(body);
            return Err(classify(RemoteError::new(
                Some(status.as_u16()),
                sanitize(&message),
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            classify(RemoteError::new(
                Some(status.as_u16()),
                format!("Invalid response: {}", e),
            ))
        })
    }

    /// Extract error message from API response JSON
    fn extract_error_message(response_text: &str) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
            status: Option<String>,
        }

        if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(response_text) {
            if let Some(error) = error_resp.error {
                return error.message.or(error.status);
            }
        }
        None
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = format!(
            "{}/queries/{}",
            self.project_url(&job.project_id),
            job.job_id
        );

        let mut query: Vec<(&str, String)> = vec![
            ("timeoutMs", SERVER_WAIT_MS.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = job.location.as_deref() {
            query.push(("location", location.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        self.send(
            self.http_client.get(&url).query(&query),
            GuardError::QueryExecution,
        )
        .await
    }

    async fn get_job(&self, job: &JobReference) -> Result<Job> {
        let url = format!("{}/jobs/{}", self.project_url(&job.project_id), job.job_id);
        let mut request = self.http_client.get(&url);
        if let Some(location) = job.location.as_deref() {
            request = request.query(&[("location", location)]);
        }
        self.send(request, GuardError::QueryExecution).await
    }

    /// Start the job and return the first response that reports completion.
    async fn run_to_completion(&self, sql: &str, options: &JobOptions) -> Result<QueryResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let location = self.config.location.as_deref();

        let (mut response, job) = match options.priority {
            QueryPriority::Interactive => {
                let body =
                    QueryRequest::execute(sql, options, location, request_id, SERVER_WAIT_MS);
                let url = format!("{}/queries", self.project_url(self.project_id()));
                let response: QueryResponse = self
                    .send(
                        self.http_client.post(&url).json(&body),
                        GuardError::QueryExecution,
                    )
                    .await?;
                let job = response.job_reference.clone();
                (response, job)
            }
            QueryPriority::Batch => {
                let job_id = format!("bqguard_{}", request_id.replace('-', ""));
                let body =
                    JobInsertRequest::query(sql, options, self.project_id(), location, job_id);
                let url = format!("{}/jobs", self.project_url(self.project_id()));
                let inserted: Job = self
                    .send(
                        self.http_client.post(&url).json(&body),
                        GuardError::QueryExecution,
                    )
                    .await?;
                if let Some(error) = inserted.status.as_ref().and_then(|s| s.error_result.as_ref()) {
                    return Err(GuardError::QueryExecution(RemoteError::new(
                        None,
                        error.message.clone().unwrap_or_default(),
                    )));
                }
                info!("Inserted batch job {}", inserted.job_reference.job_id);
                (QueryResponse::default(), Some(inserted.job_reference))
            }
        };

        if response.is_complete() {
            return Ok(response);
        }

        let job = job.ok_or_else(|| {
            GuardError::QueryExecution(RemoteError::new(
                None,
                "Incomplete query response without a job reference",
            ))
        })?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            debug!("Job {} still running; polling", job.job_id);
            response = self.get_query_results(&job, None).await?;
            if response.is_complete() {
                if response.job_reference.is_none() {
                    response.job_reference = Some(job);
                }
                return Ok(response);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl QueryService for BigQueryClient {
    async fn dry_run(&self, sql: &str, options: &JobOptions) -> Result<DryRunStats> {
        let body = QueryRequest::dry_run(sql, options, self.config.location.as_deref());
        let url = format!("{}/queries", self.project_url(self.project_id()));

        let response: QueryResponse = self
            .send(
                self.http_client.post(&url).json(&body),
                GuardError::CostEstimation,
            )
            .await?;

        let bytes_processed =
            parse_count(response.total_bytes_processed.as_deref(), "totalBytesProcessed")
                .map_err(GuardError::CostEstimation)?;

        Ok(DryRunStats { bytes_processed })
    }

    async fn execute(&self, sql: &str, options: &JobOptions) -> Result<QueryResult> {
        let first = self.run_to_completion(sql, options).await?;

        let mut rows: Vec<Row> = first.rows.unwrap_or_default();
        let mut page_token = first.page_token;

        while let Some(token) = page_token.take() {
            let job = first.job_reference.as_ref().ok_or_else(|| {
                GuardError::QueryExecution(RemoteError::new(
                    None,
                    "Paged query response without a job reference",
                ))
            })?;
            debug!("Fetching next result page for job {}", job.job_id);
            let page = self.get_query_results(job, Some(&token)).await?;
            rows.extend(page.rows.unwrap_or_default());
            page_token = page.page_token;
        }

        // getQueryResults does not report billing; fall back to the job statistics.
        let mut cache_hit = first.cache_hit.unwrap_or(false);
        let mut billed = first.total_bytes_billed;
        if billed.is_none() {
            if let Some(job) = first.job_reference.as_ref() {
                let details = self.get_job(job).await?;
                if let Some(stats) = details.statistics.and_then(|s| s.query) {
                    billed = stats.total_bytes_billed;
                    cache_hit = stats.cache_hit.unwrap_or(cache_hit);
                }
            }
        }

        let bytes_billed = parse_count(billed.as_deref(), "totalBytesBilled")
            .map_err(GuardError::QueryExecution)?;
        let batch = decode_rows(first.schema.as_ref(), &rows)?;

        Ok(QueryResult {
            batch,
            bytes_billed,
            cache_hit,
            job_id: first.job_reference.map(|job| job.job_id),
        })
    }

    async fn table_info(&self, table_id: &str) -> Result<TableInfo> {
        let (project, dataset, table) = parse_table_id(table_id, self.project_id())?;
        let url = format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(&project),
            dataset,
            table
        );

        let table: Table = self
            .send(self.http_client.get(&url), GuardError::QueryExecution)
            .await?;

        Ok(TableInfo {
            project: table.table_reference.project_id,
            dataset_id: table.table_reference.dataset_id,
            table_id: table.table_reference.table_id,
            num_rows: table.num_rows.and_then(|n| n.parse().ok()),
            num_bytes: table.num_bytes.and_then(|n| n.parse().ok()),
            created: table.creation_time.as_deref().and_then(millis_to_datetime),
            modified: table.last_modified_time.as_deref().and_then(millis_to_datetime),
            fields: table
                .schema
                .map(|schema| {
                    schema
                        .fields
                        .into_iter()
                        .map(|field| TableField {
                            name: field.name,
                            field_type: field.field_type,
                            mode: field.mode,
                            description: field.description,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// Parse an int64 count the API sends as a decimal string; absent means zero.
fn parse_count(value: Option<&str>, name: &str) -> std::result::Result<u64, RemoteError> {
    match value {
        None => Ok(0),
        Some(raw) => raw.parse::<u64>().map_err(|e| {
            RemoteError::new(None, format!("Invalid {} '{}': {}", name, raw, e))
        }),
    }
}

fn millis_to_datetime(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Split `project.dataset.table`, `project:dataset.table` or `dataset.table`
/// (in `default_project`).
pub fn parse_table_id(table_id: &str, default_project: &str) -> Result<(String, String, String)> {
    let normalized = table_id.trim().replacen(':', ".", 1);
    let parts: Vec<&str> = normalized.split('.').collect();

    let (project, dataset, table) = match parts.as_slice() {
        [project, dataset, table] => (*project, *dataset, *table),
        [dataset, table] => (default_project, *dataset, *table),
        _ => {
            return Err(GuardError::Config(format!(
                "Invalid table id '{}' (expected project.dataset.table or dataset.table)",
                table_id
            )))
        }
    };

    if [project, dataset, table].iter().any(|part| part.is_empty()) {
        return Err(GuardError::Config(format!(
            "Invalid table id '{}': empty component",
            table_id
        )));
    }

    Ok((project.to_string(), dataset.to_string(), table.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_id() {
        assert_eq!(
            parse_table_id("p.d.t", "default").unwrap(),
            ("p".to_string(), "d".to_string(), "t".to_string())
        );
        assert_eq!(
            parse_table_id("d.t", "default").unwrap(),
            ("default".to_string(), "d".to_string(), "t".to_string())
        );
        assert_eq!(
            parse_table_id("p:d.t", "default").unwrap(),
            ("p".to_string(), "d".to_string(), "t".to_string())
        );
        assert!(parse_table_id("t", "default").is_err());
        assert!(parse_table_id("p..t", "default").is_err());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(None, "n").unwrap(), 0);
        assert_eq!(parse_count(Some("1024"), "n").unwrap(), 1024);
        assert!(parse_count(Some("lots"), "n").is_err());
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error":{"code":400,"message":"Syntax error: Unexpected end of script at [1:7]","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            BigQueryClient::extract_error_message(body).as_deref(),
            Some("Syntax error: Unexpected end of script at [1:7]")
        );
        assert_eq!(BigQueryClient::extract_error_message("not json"), None);
    }

    #[test]
    fn test_project_is_required() {
        let config = BigQueryConfig::default();
        let tokens = TokenManager::with_static_token("ya29.test");
        assert!(matches!(
            BigQueryClient::new(&config, tokens),
            Err(GuardError::Config(_))
        ));
    }
}
