//! Streaming results against the mocked API.

use wiremock::{MockServer, ResponseTemplate};

use flakesql_client::{Client, ClientError, QueryOptions, Value};

use crate::helpers::*;

#[tokio::test]
async fn test_streaming_yields_every_row_in_order() {
    let sizes = [2, 3, 1, 4];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;
    mount_partitions(&server, &sizes).await;

    let client = Client::new(config(&server)).unwrap();
    let mut stream = client
        .query_streaming("SELECT 1", QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(stream.partition_count(), 4);

    let mut seen = Vec::new();
    while let Some(row) = stream.next().await {
        let row = row.unwrap();
        let n = row.get("n").unwrap().as_i128().unwrap();
        assert_eq!(row.get("name").unwrap(), Value::Text(format!("name-{n}")));
        seen.push(n);
    }
    assert_eq!(seen, (1..=10).collect::<Vec<i128>>());
}

#[tokio::test]
async fn test_streaming_size_and_last_unsupported() {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&[1])),
    )
    .await;

    let client = Client::new(config(&server)).unwrap();
    let stream = client
        .query_streaming("SELECT 1", QueryOptions::new())
        .await
        .unwrap();

    assert!(matches!(stream.size(), Err(ClientError::Unsupported(_))));
    assert!(matches!(stream.last(), Err(ClientError::Unsupported(_))));
}
