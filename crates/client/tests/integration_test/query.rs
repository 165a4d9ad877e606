//! Submission and in-memory assembly.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flakesql_client::{Client, ClientError, QueryOptions, Value};

use crate::helpers::*;

#[tokio::test]
async fn test_immediate_single_partition_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .and(query_param("async", "false"))
        .and(header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT"))
        .and(header("Content-Type", "application/json"))
        .and(header("Accept", "application/json"))
        .and(header_exists("Authorization"))
        .and(body_partial_json(json!({
            "statement": "SELECT n, name FROM t",
            "warehouse": "WH",
            "parameters": { "MULTI_STATEMENT_COUNT": "1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body(&[3])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let result = client
        .query("SELECT n, name FROM t", QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(numbers(&result), vec![1, 2, 3]);
    let first = result.first().unwrap();
    assert_eq!(first.get("NAME").unwrap(), Value::Text("name-1".into()));
    assert_eq!(first.get(0usize).unwrap(), Value::Integer(1));
    assert_eq!(
        result.last().unwrap().get("name").unwrap(),
        Value::Text("name-3".into())
    );
}

#[tokio::test]
async fn test_options_are_sent_upper_cased() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .and(body_partial_json(json!({
            "warehouse": "OTHER_WH",
            "database": "SALES",
            "schema": "PUBLIC",
            "role": "ANALYST",
            "timeout": 30,
            "bindings": { "1": { "type": "FIXED", "value": "7" } },
            "parameters": { "MULTI_STATEMENT_COUNT": "2" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body(&[1])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let options = QueryOptions::new()
        .warehouse("other_wh")
        .database("sales")
        .schema("public")
        .role("analyst")
        .timeout(30)
        .bindings(json!({ "1": { "type": "FIXED", "value": "7" } }));
    let result = client
        .query("BEGIN; SELECT ?", options)
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
}

#[tokio::test]
async fn test_many_partitions_fetched_in_parallel_stay_ordered() {
    let sizes = [3, 2, 4, 1, 3, 2, 2, 5];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;
    mount_partitions(&server, &sizes).await;

    // 8 partitions at scale factor 4 gives 2 fetch threads.
    let client = Client::new(config(&server)).unwrap();
    let result = client.query("SELECT 1", QueryOptions::new()).await.unwrap();

    let total: usize = sizes.iter().sum();
    assert_eq!(result.partition_count(), sizes.len());
    assert_eq!(numbers(&result), (1..=total as i128).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_few_partitions_fetched_sequentially() {
    let sizes = [2, 2, 2];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;
    mount_partitions(&server, &sizes).await;

    let client = Client::new(config(&server)).unwrap();
    let result = client.query("SELECT 1", QueryOptions::new()).await.unwrap();

    assert_eq!(numbers(&result), vec![1, 2, 3, 4, 5, 6]);
    let rows = result.get_all_rows().unwrap();
    assert_eq!(rows[5]["name"], Value::Text("name-6".into()));
}

#[tokio::test]
async fn test_partition_row_count_mismatch_fails_query() {
    let sizes = [1, 10];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;

    // Partition 1 declares 10 rows but only 9 come back.
    let mut short = partition_rows(&sizes, 1);
    short.as_array_mut().unwrap().pop();
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/statements/{HANDLE}")))
        .and(query_param("partition", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": short })))
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let err = client
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::PartitionMismatch {
            partition: 1,
            expected: 10,
            actual: 9
        }
    ));
}

#[tokio::test]
async fn test_display_renders_table() {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&[2])),
    )
    .await;

    let client = Client::new(config(&server)).unwrap();
    let result = client.query("SELECT 1", QueryOptions::new()).await.unwrap();
    let table = result.to_string();

    assert!(table.starts_with("N"));
    assert!(table.contains("name-2"));
}
