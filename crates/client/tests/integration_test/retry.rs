//! Status classification and retry behaviour.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flakesql_client::{Client, ClientError, QueryOptions};

use crate::helpers::*;

#[tokio::test]
async fn test_too_many_requests_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        // 1 attempt + 2 retries
        .expect(3)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let err = client
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();

    match err {
        ClientError::BadResponse { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected BadResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let err = client
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_transient_server_error_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body(&[2])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let result = client.query("SELECT 1", QueryOptions::new()).await.unwrap();
    assert_eq!(numbers(&result), vec![1, 2]);
}

#[tokio::test]
async fn test_partition_fetch_retries_forbidden() {
    let sizes = [1, 1];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;
    // A token expiring mid-flight shows up as 403.
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/statements/{HANDLE}")))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_partitions(&server, &sizes).await;

    let client = Client::new(config(&server)).unwrap();
    let result = client.query("SELECT 1", QueryOptions::new()).await.unwrap();
    assert_eq!(numbers(&result), vec![1, 2]);
}

#[tokio::test]
async fn test_unreachable_host_is_request_error() {
    let config = flakesql_client::ClientConfig::new(
        "http://127.0.0.1:1",
        flakesql_client::Credentials::new(None, "acct", "user", private_key_pem()),
    )
    .with_http_retries(1)
    .with_retry_backoff_base(Duration::from_millis(1));

    let err = Client::new(config)
        .unwrap()
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Request(_)));
}

#[tokio::test]
async fn test_token_is_signed_once_across_requests() {
    let sizes = [1, 1, 1];
    let server = MockServer::start().await;
    mount_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(completed_body(&sizes)),
    )
    .await;
    mount_partitions(&server, &sizes).await;

    let client = Client::new(config(&server)).unwrap();
    let before = client.create_jwt_token().await.unwrap();
    client.query("SELECT 1", QueryOptions::new()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    for request in requests {
        let auth = request.headers.get("authorization").unwrap().to_str().unwrap();
        assert_eq!(auth, format!("Bearer {before}"));
    }
}

#[tokio::test]
async fn test_redirect_is_retried_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/elsewhere"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body(&[1])))
        .expect(0)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let err = client
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::BadResponse { status: 302, .. }));
}

#[tokio::test]
async fn test_slow_response_times_out_and_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completed_body(&[1]))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = config(&server)
        .with_http_retries(1)
        .with_request_timeout(Duration::from_millis(100));
    let err = Client::new(config)
        .unwrap()
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Request(_)));
}

#[tokio::test]
async fn test_slow_response_recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body(&[2])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server).with_request_timeout(Duration::from_millis(100));
    let result = Client::new(config)
        .unwrap()
        .query("SELECT 1", QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(numbers(&result), vec![1, 2]);
}
