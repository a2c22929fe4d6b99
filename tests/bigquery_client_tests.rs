// BigQuery REST client tests against a mock HTTP server

use arrow::array::{Array, Int64Array, StringArray};
use bqguard::auth::TokenManager;
use bqguard::bigquery::BigQueryClient;
use bqguard::cache::QueryParams;
use bqguard::config::BigQueryConfig;
use bqguard::error::GuardError;
use bqguard::warehouse::{JobOptions, QueryPriority, QueryService};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

const TOKEN: &str = "ya29.test-token";

fn client_for(server: &ServerGuard) -> BigQueryClient {
    let config = BigQueryConfig {
        project_id: "p".to_string(),
        api_base_url: server.url(),
        poll_interval_ms: 10,
        ..Default::default()
    };
    BigQueryClient::new(&config, TokenManager::with_static_token(TOKEN)).unwrap()
}

fn schema_json() -> serde_json::Value {
    json!({"fields": [
        {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
        {"name": "name", "type": "STRING", "mode": "NULLABLE"}
    ]})
}

#[tokio::test]
async fn test_dry_run_reports_bytes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/queries")
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .match_body(Matcher::PartialJson(json!({
            "query": "SELECT 1",
            "dryRun": true,
            "useQueryCache": false,
            "maximumBytesBilled": "10737418240"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "location": "US"},
                "jobComplete": true,
                "totalBytesProcessed": "5368709120",
                "cacheHit": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let options = JobOptions {
        maximum_bytes_billed: Some(10 << 30),
        ..Default::default()
    };
    let stats = client_for(&server).dry_run("SELECT 1", &options).await.unwrap();

    assert_eq!(stats.bytes_processed, 5 << 30);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_dry_run_without_bytes_is_zero() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/queries")
        .with_status(200)
        .with_body(json!({"jobComplete": true}).to_string())
        .create_async()
        .await;

    let stats = client_for(&server)
        .dry_run("SELECT 1", &JobOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.bytes_processed, 0);
}

#[tokio::test]
async fn test_dry_run_failure_is_cost_estimation_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/queries")
        .with_status(400)
        .with_body(
            json!({"error": {
                "code": 400,
                "message": "Unrecognized name: adress at [1:8]",
                "status": "INVALID_ARGUMENT"
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let err = client_for(&server)
        .dry_run("SELECT adress FROM t", &JobOptions::default())
        .await
        .unwrap_err();

    match err {
        GuardError::CostEstimation(remote) => {
            assert_eq!(remote.status, Some(400));
            assert_eq!(remote.message, "Unrecognized name: adress at [1:8]");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_service_is_transient() {
    let config = BigQueryConfig {
        project_id: "p".to_string(),
        api_base_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let client = BigQueryClient::new(&config, TokenManager::with_static_token(TOKEN)).unwrap();

    let err = client
        .dry_run("SELECT 1", &JobOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(&err, GuardError::CostEstimation(remote) if remote.status.is_none()));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_execute_single_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/queries")
        .match_body(Matcher::PartialJson(json!({
            "dryRun": false,
            "useQueryCache": true,
            "parameterMode": "NAMED",
            "formatOptions": {"useInt64Timestamp": true}
        })))
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "job_1", "location": "US"},
                "jobComplete": true,
                "schema": schema_json(),
                "rows": [
                    {"f": [{"v": "1"}, {"v": "alice"}]},
                    {"f": [{"v": "2"}, {"v": null}]}
                ],
                "totalRows": "2",
                "totalBytesProcessed": "1048576",
                "totalBytesBilled": "10485760",
                "cacheHit": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let options =
        JobOptions::default().with_parameters(QueryParams::new().with("min_id", 1));
    let result = client_for(&server)
        .execute("SELECT id, name FROM t WHERE id >= @min_id", &options)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.num_rows(), 2);
    assert_eq!(result.bytes_billed, 10_485_760);
    assert_eq!(result.job_id.as_deref(), Some("job_1"));

    let ids = result
        .batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(ids.values(), &[1, 2]);
    let names = result
        .batch
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(names.value(0), "alice");
    assert!(names.is_null(1));
}

#[tokio::test]
async fn test_execute_polls_and_drains_pages() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/queries")
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "job_2"},
                "jobComplete": false
            })
            .to_string(),
        )
        .create_async()
        .await;
    let first_page = server
        .mock("GET", "/projects/p/queries/job_2")
        .match_query(Matcher::Regex("useInt64Timestamp=true$".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "job_2"},
                "jobComplete": true,
                "schema": schema_json(),
                "rows": [{"f": [{"v": "1"}, {"v": "a"}]}],
                "pageToken": "t2",
                "totalRows": "3"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second_page = server
        .mock("GET", "/projects/p/queries/job_2")
        .match_query(Matcher::Regex("pageToken=t2$".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "jobComplete": true,
                "schema": schema_json(),
                "rows": [
                    {"f": [{"v": "2"}, {"v": "b"}]},
                    {"f": [{"v": "3"}, {"v": "c"}]}
                ],
                "totalRows": "3"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let job = server
        .mock("GET", "/projects/p/jobs/job_2")
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "job_2"},
                "status": {"state": "DONE"},
                "statistics": {"query": {"totalBytesBilled": "20971520", "cacheHit": false}}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result = client_for(&server)
        .execute("SELECT id, name FROM t", &JobOptions::default())
        .await
        .unwrap();

    first_page.assert_async().await;
    second_page.assert_async().await;
    job.assert_async().await;
    assert_eq!(result.num_rows(), 3);
    assert_eq!(result.bytes_billed, 20_971_520);
}

#[tokio::test]
async fn test_paged_response_without_job_reference_is_an_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/queries")
        .with_status(200)
        .with_body(
            json!({
                "jobComplete": true,
                "schema": schema_json(),
                "rows": [{"f": [{"v": "1"}, {"v": "a"}]}],
                "pageToken": "t2"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = client_for(&server)
        .execute("SELECT id, name FROM t", &JobOptions::default())
        .await
        .unwrap_err();

    match err {
        GuardError::QueryExecution(remote) => {
            assert!(remote.message.contains("job reference"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_failure_is_query_execution_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/queries")
        .with_status(403)
        .with_body(
            json!({"error": {
                "code": 403,
                "message": "Query exceeded limit for bytes billed: 10737418240.",
                "status": "PERMISSION_DENIED"
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let err = client_for(&server)
        .execute("SELECT * FROM big", &JobOptions::default())
        .await
        .unwrap_err();

    match &err {
        GuardError::QueryExecution(remote) => {
            assert_eq!(remote.status, Some(403));
            assert!(remote.message.contains("bytes billed"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_batch_priority_inserts_job() {
    let mut server = Server::new_async().await;
    let insert = server
        .mock("POST", "/projects/p/jobs")
        .match_body(Matcher::PartialJson(json!({
            "configuration": {"query": {"priority": "BATCH", "query": "SELECT 1"}}
        })))
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "batch_1", "location": "EU"},
                "status": {"state": "PENDING"}
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/projects/p/queries/batch_1")
        .match_query(Matcher::UrlEncoded("location".into(), "EU".into()))
        .with_status(200)
        .with_body(
            json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "n", "type": "INTEGER"}]},
                "rows": [{"f": [{"v": "1"}]}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/projects/p/jobs/batch_1")
        .with_status(200)
        .with_body(
            json!({
                "jobReference": {"projectId": "p", "jobId": "batch_1"},
                "statistics": {"query": {"totalBytesBilled": "0", "cacheHit": true}}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let options = JobOptions {
        priority: QueryPriority::Batch,
        ..Default::default()
    };
    let result = client_for(&server).execute("SELECT 1", &options).await.unwrap();

    insert.assert_async().await;
    assert_eq!(result.num_rows(), 1);
    assert_eq!(result.bytes_billed, 0);
    assert!(result.cache_hit);
    assert_eq!(result.job_id.as_deref(), Some("batch_1"));
}

#[tokio::test]
async fn test_table_info() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/projects/other/datasets/events/tables/daily")
        .with_status(200)
        .with_body(
            json!({
                "tableReference": {"projectId": "other", "datasetId": "events", "tableId": "daily"},
                "numRows": "1200",
                "numBytes": "52428800",
                "creationTime": "1704067200000",
                "lastModifiedTime": "1704153600000",
                "schema": {"fields": [
                    {"name": "day", "type": "DATE", "mode": "REQUIRED", "description": "Partition day"},
                    {"name": "count", "type": "INTEGER"}
                ]}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let info = client_for(&server)
        .table_info("other.events.daily")
        .await
        .unwrap();

    assert_eq!(info.project, "other");
    assert_eq!(info.dataset_id, "events");
    assert_eq!(info.table_id, "daily");
    assert_eq!(info.num_rows, Some(1200));
    assert_eq!(info.num_bytes, Some(52_428_800));
    assert_eq!(info.created.unwrap().timestamp(), 1_704_067_200);
    assert_eq!(info.fields.len(), 2);
    assert_eq!(info.fields[0].description.as_deref(), Some("Partition day"));
}

#[tokio::test]
async fn test_table_info_uses_configured_project() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/projects/p/datasets/events/tables/daily")
        .with_status(404)
        .with_body(json!({"error": {"code": 404, "message": "Not found: Table p:events.daily"}}).to_string())
        .create_async()
        .await;

    let err = client_for(&server)
        .table_info("events.daily")
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(err.to_string().contains("Not found"));
}
