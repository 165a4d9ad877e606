//! Authenticated request execution with retry and status classification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::auth::{KeyPairAuth, AUTH_TOKEN_TYPE};
use crate::error::{ClientError, Result};
use crate::pool::{ConnectionPool, PooledConnection};

pub const AUTH_TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Statement finished (or the request otherwise succeeded).
pub const STATUS_OK: u16 = 200;
/// Statement accepted and still running.
pub const STATUS_PENDING: u16 = 202;

/// Whether a non-success status is worth retrying.
///
/// 403 can mean the token expired in flight; 3xx and 5xx are usually transient.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 400 | 403 | 405 | 408 | 429)
        || (300..=399).contains(&status)
        || (500..=599).contains(&status)
}

pub fn is_success_status(status: u16) -> bool {
    status == STATUS_OK || status == STATUS_PENDING
}

/// A request against the API, relative to the account base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/api/v2/statements?requestId=...`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body,
        }
    }
}

/// A successful (200 or 202) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_pending(&self) -> bool {
        self.status.as_u16() == STATUS_PENDING
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let started = Instant::now();
        let parsed = serde_json::from_str(&self.body)
            .map_err(|e| ClientError::Parse(format!("invalid response body: {e}")))?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = self.body.len(),
            "JSON parsing finished"
        );
        Ok(parsed)
    }
}

enum Failure {
    Retryable(ClientError),
    Fatal(ClientError),
}

/// Issues authenticated requests over the shared connection pool.
pub struct RequestExecutor {
    pool: ConnectionPool,
    auth: Arc<KeyPairAuth>,
    retries: u32,
    backoff_base: Duration,
}

impl RequestExecutor {
    pub fn new(
        pool: ConnectionPool,
        auth: Arc<KeyPairAuth>,
        retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            pool,
            auth,
            retries,
            backoff_base,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Check out a connection for one request and return it afterwards.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut conn = self.pool.checkout().await?;
        self.execute_on(&mut conn, request).await
    }

    /// Run `request` on an already checked-out connection, retrying retryable
    /// failures up to `retries` times with exponential backoff.
    pub async fn execute_on(
        &self,
        conn: &mut PooledConnection,
        request: &ApiRequest,
    ) -> Result<ApiResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(conn, request).await {
                Ok(response) => return Ok(response),
                Err(Failure::Fatal(err)) => return Err(err),
                Err(Failure::Retryable(err)) if attempt >= self.retries => return Err(err),
                Err(Failure::Retryable(err)) => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        path = %request.path,
                        "Retry attempt {} because {}",
                        attempt,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// `backoff_base * 2^attempt`: 1s, 2s, 4s, ... with the default base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn attempt(
        &self,
        conn: &mut PooledConnection,
        request: &ApiRequest,
    ) -> std::result::Result<ApiResponse, Failure> {
        // A fresh token per attempt lets a retry recover from expiry mid-flight.
        let token = self.auth.token().await.map_err(Failure::Fatal)?;
        let target = format!("{}{}", conn.base_url().as_str().trim_end_matches('/'), request.path);
        let url = url::Url::parse(&target).map_err(|e| {
            Failure::Fatal(ClientError::Config(format!("invalid request URL {target}: {e}")))
        })?;

        let mut builder = conn
            .client()
            .map_err(Failure::Fatal)?
            .request(request.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(AUTH_TOKEN_TYPE_HEADER, AUTH_TOKEN_TYPE)
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let started = Instant::now();
        let response = conn.send(builder).await.map_err(Failure::Retryable)?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            conn.close();
            Failure::Retryable(ClientError::Request(format!("failed reading response body: {e}")))
        })?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HTTP request finished"
        );

        let code = status.as_u16();
        if is_success_status(code) {
            return Ok(ApiResponse { status, body });
        }

        let err = ClientError::BadResponse { status: code, body };
        if is_retryable_status(code) {
            Err(Failure::Retryable(err))
        } else {
            Err(Failure::Fatal(err))
        }
    }
}
