use std::sync::OnceLock;
use std::time::Duration;

use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flakesql_client::{ClientConfig, Credentials};

pub const HANDLE: &str = "01b2c3d4-0000-1111-0000-000000000001";

/// One RSA key per test binary; generating 2048-bit keys is slow.
pub fn private_key_pem() -> &'static str {
    static KEY: OnceLock<String> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .unwrap()
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

/// Client config aimed at `server`, with fast polling and backoff.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        server.uri(),
        Credentials::new(Some("acme".into()), "main", "tester", private_key_pem()),
    )
    .with_default_warehouse("wh")
    .with_poll_interval(Duration::from_millis(10))
    .with_retry_backoff_base(Duration::from_millis(1))
    .with_http_retries(2)
    .with_connection_timeout(Duration::from_secs(5))
}

/// Rows `[n, "name-n"]` numbered consecutively across partitions.
pub fn partition_rows(sizes: &[usize], index: usize) -> Value {
    let start: usize = sizes[..index].iter().sum();
    let rows: Vec<Value> = (start + 1..=start + sizes[index])
        .map(|n| json!([n.to_string(), format!("name-{n}")]))
        .collect();
    Value::Array(rows)
}

/// A completed statement response carrying partition 0.
pub fn completed_body(sizes: &[usize]) -> Value {
    let partition_info: Vec<Value> = sizes.iter().map(|n| json!({ "rowCount": n })).collect();
    let data = if sizes.is_empty() {
        json!([])
    } else {
        partition_rows(sizes, 0)
    };
    json!({
        "code": "090001",
        "statementHandle": HANDLE,
        "message": "Statement executed successfully.",
        "resultSetMetaData": {
            "numRows": sizes.iter().sum::<usize>(),
            "format": "jsonv2",
            "rowType": [
                { "name": "N", "type": "FIXED", "scale": 0, "precision": 38, "nullable": false },
                { "name": "NAME", "type": "TEXT", "nullable": true }
            ],
            "partitionInfo": partition_info
        },
        "data": data
    })
}

pub fn pending_body() -> Value {
    json!({
        "code": "333334",
        "message": "Asynchronous execution in progress.",
        "statementHandle": HANDLE,
        "statementStatusUrl": format!("/api/v2/statements/{HANDLE}")
    })
}

pub async fn mount_submit(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/v2/statements"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Serve partitions `1..N`, each once.
pub async fn mount_partitions(server: &MockServer, sizes: &[usize]) {
    for index in 1..sizes.len() {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/statements/{HANDLE}")))
            .and(query_param("partition", index.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": partition_rows(sizes, index) })),
            )
            .expect(1)
            .mount(server)
            .await;
    }
}

/// `N` column of every row, in iteration order.
pub fn numbers(result: &flakesql_client::QueryResult) -> Vec<i128> {
    result
        .iter()
        .map(|row| row.get("n").unwrap().as_i128().unwrap())
        .collect()
}
