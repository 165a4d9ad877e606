//! Statement execution client.
//!
//! Provides [`Client`] for running SQL statements over the REST API: submit,
//! poll until complete (with timeout and best-effort cancellation), then
//! assemble the partitioned result with the strategy that fits its size.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::KeyPairAuth;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::executor::{ApiRequest, RequestExecutor};
use crate::pool::{ConnectionPool, ConnectionSettings, PooledConnection};
use crate::result::QueryResult;
use crate::strategy::streaming::StreamingResult;
use crate::strategy::{self, number_of_threads, PartitionFetcher, ResultSeed};
use crate::wire::{PartitionResponse, RawRow, StatementParameters, StatementRequest, StatementResponse};

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

/// Per-statement overrides. Unset fields fall back to the client defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    /// Positional bind values, e.g. `{"1": {"type": "FIXED", "value": "42"}}`.
    pub bindings: Option<serde_json::Value>,
    /// Number of statements in the text. Counted from `;` when unset.
    pub statement_count: Option<usize>,
    /// Server-side execution timeout in seconds.
    pub timeout: Option<u64>,
    /// Ask the service to answer 202 straight away and poll for the result.
    pub asynchronous: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn bindings(mut self, bindings: serde_json::Value) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn statement_count(mut self, count: usize) -> Self {
        self.statement_count = Some(count);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }
}

/// Number of non-empty `;`-separated segments, at least 1.
///
/// Semicolons inside string literals or comments are counted too.
pub fn count_statements(statement: &str) -> usize {
    statement
        .split(';')
        .filter(|segment| !segment.trim().is_empty())
        .count()
        .max(1)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for one account.
///
/// Owns its token cache and connection pool. Share it across tasks with
/// `Arc<Client>`.
pub struct Client {
    config: ClientConfig,
    auth: Arc<KeyPairAuth>,
    executor: Arc<RequestExecutor>,
}

impl Client {
    /// Create a client. The base URI is parsed and the pool built up front;
    /// connections themselves open lazily.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_uri)
            .map_err(|e| ClientError::Config(format!("invalid base URI {}: {e}", config.base_uri)))?;

        let auth = Arc::new(KeyPairAuth::new(
            config.credentials.clone(),
            config.effective_jwt_token_ttl(),
        ));
        let pool = ConnectionPool::new(
            ConnectionSettings::new(base_url).with_request_timeout(config.request_timeout),
            config.max_connections,
            config.connection_timeout,
        );
        let executor = Arc::new(RequestExecutor::new(
            pool,
            Arc::clone(&auth),
            config.http_retries,
            config.retry_backoff_base,
        ));

        info!(
            base_uri = %config.base_uri,
            account = %config.credentials.qualified_account(),
            max_connections = config.max_connections,
            "Client initialised"
        );

        Ok(Self {
            config,
            auth,
            executor,
        })
    }

    /// Create a client from `SNOWFLAKE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Run a statement and load its whole result into memory.
    ///
    /// Small results are fetched on the calling task; larger ones fan out
    /// over up to `max_threads_per_query` concurrent partition fetches.
    pub async fn query(&self, statement: &str, options: QueryOptions) -> Result<QueryResult> {
        let response = self.run_statement(statement, &options).await?;
        let handle = response.statement_handle.clone();
        let seed = ResultSeed::from_response(response)?;

        let threads = number_of_threads(
            seed.partition_count(),
            self.config.thread_scale_factor,
            self.config.max_threads_per_query,
        );
        info!(
            statement_handle = %handle,
            partitions = seed.partition_count(),
            threads,
            "Assembling result"
        );

        let started = Instant::now();
        let fetcher = Arc::new(StatementPartitions {
            executor: Arc::clone(&self.executor),
            statement_handle: handle.clone(),
        });
        let result = if threads == 1 {
            strategy::sequential::assemble(seed, fetcher.as_ref()).await?
        } else {
            strategy::parallel::assemble(seed, fetcher, threads).await?
        };

        info!(
            statement_handle = %handle,
            rows = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Result assembled"
        );
        Ok(result)
    }

    /// Run a statement and read its result lazily, one partition at a time.
    pub async fn query_streaming(
        &self,
        statement: &str,
        options: QueryOptions,
    ) -> Result<StreamingResult> {
        let response = self.run_statement(statement, &options).await?;
        let handle = response.statement_handle.clone();
        let seed = ResultSeed::from_response(response)?;
        info!(
            statement_handle = %handle,
            partitions = seed.partition_count(),
            "Streaming result"
        );

        let fetcher = Arc::new(StatementPartitions {
            executor: Arc::clone(&self.executor),
            statement_handle: handle,
        });
        Ok(StreamingResult::new(seed, fetcher))
    }

    /// Cancel a running statement.
    ///
    /// Returns `Ok(true)` when the service accepted the cancel or no longer
    /// knows the statement (404, typically because it already finished).
    pub async fn cancel_statement(&self, statement_handle: &str) -> Result<bool> {
        let mut conn = self.executor.pool().checkout().await?;
        self.request_cancel(&mut conn, statement_handle).await
    }

    /// A bearer token for the configured key pair, from cache when still valid.
    pub async fn create_jwt_token(&self) -> Result<String> {
        self.auth.token().await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn statement_request(&self, statement: &str, options: &QueryOptions) -> StatementRequest {
        let pick = |explicit: &Option<String>, default: &Option<String>| {
            explicit
                .as_ref()
                .or(default.as_ref())
                .map(|v| v.to_uppercase())
        };
        let count = options
            .statement_count
            .unwrap_or_else(|| count_statements(statement));

        StatementRequest {
            statement: statement.to_string(),
            warehouse: pick(&options.warehouse, &self.config.default_warehouse),
            database: pick(&options.database, &self.config.default_database),
            schema: pick(&options.schema, &self.config.default_schema),
            role: pick(&options.role, &self.config.default_role),
            bindings: options.bindings.clone(),
            timeout: options.timeout,
            parameters: StatementParameters {
                multi_statement_count: count.to_string(),
            },
        }
    }

    /// Submit a statement and wait until its first partition is available.
    async fn run_statement(
        &self,
        statement: &str,
        options: &QueryOptions,
    ) -> Result<StatementResponse> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let body = serde_json::to_value(self.statement_request(statement, options))
            .map_err(|e| ClientError::Parse(format!("cannot encode statement request: {e}")))?;
        let path = format!(
            "/api/v2/statements?requestId={request_id}&async={}",
            options.asynchronous
        );

        info!(request_id = %request_id, asynchronous = options.asynchronous, "Submitting statement");
        let response = self.executor.execute(&ApiRequest::post(path, Some(body))).await?;
        let submitted: StatementResponse = response.json()?;
        info!(
            request_id = %request_id,
            statement_handle = %submitted.statement_handle,
            pending = response.is_pending(),
            "Statement submitted"
        );

        if !response.is_pending() {
            return Ok(submitted);
        }
        self.poll_until_complete(&submitted.statement_handle, started)
            .await
    }

    /// Re-poll a pending statement until it completes or the query timeout,
    /// measured from submission, runs out.
    async fn poll_until_complete(
        &self,
        statement_handle: &str,
        started: Instant,
    ) -> Result<StatementResponse> {
        let mut conn = self.executor.pool().checkout().await?;
        let poll = ApiRequest::get(format!("/api/v2/statements/{statement_handle}"));

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let elapsed = started.elapsed();
            if elapsed > self.config.query_timeout {
                warn!(
                    statement_handle = %statement_handle,
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_secs = self.config.query_timeout.as_secs(),
                    "Query timed out, cancelling"
                );
                let cancelled = self.cancel_silently(&mut conn, statement_handle).await;
                return Err(ClientError::QueryTimeout {
                    statement_handle: statement_handle.to_string(),
                    elapsed,
                    cancelled,
                });
            }

            let response = self.executor.execute_on(&mut conn, &poll).await?;
            debug!(
                statement_handle = %statement_handle,
                status = response.status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Polling statement status"
            );
            if !response.is_pending() {
                return response.json();
            }
        }
    }

    async fn request_cancel(
        &self,
        conn: &mut PooledConnection,
        statement_handle: &str,
    ) -> Result<bool> {
        info!(statement_handle = %statement_handle, "Cancelling statement");
        let cancel = ApiRequest::post(format!("/api/v2/{statement_handle}/cancel"), None);
        match self.executor.execute_on(conn, &cancel).await {
            Ok(_) => Ok(true),
            // Already gone: finished or cancelled before we got there.
            Err(e) if e.status() == Some(404) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Best-effort cancel for the timeout path; failures are logged, not raised.
    async fn cancel_silently(&self, conn: &mut PooledConnection, statement_handle: &str) -> bool {
        match self.request_cancel(conn, statement_handle).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                error!(
                    statement_handle = %statement_handle,
                    error = %e,
                    "Error on attempting to cancel statement"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Partition fetcher
// ---------------------------------------------------------------------------

/// Fetches partitions of one completed statement over the client's pool.
struct StatementPartitions {
    executor: Arc<RequestExecutor>,
    statement_handle: String,
}

#[async_trait]
impl PartitionFetcher for StatementPartitions {
    async fn fetch_partition(&self, index: usize) -> Result<Vec<RawRow>> {
        let path = format!(
            "/api/v2/statements/{}?partition={index}&requestId={}",
            self.statement_handle,
            Uuid::new_v4()
        );
        let response = self.executor.execute(&ApiRequest::get(path)).await?;
        let partition: PartitionResponse = response.json()?;
        Ok(partition.data)
    }
}
