use std::env;
use std::fmt;
use std::fs;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Longest token lifetime the service accepts is one hour; stay a minute
/// under it so clock skew never pushes a token past the limit.
pub const MAX_JWT_TOKEN_TTL: Duration = Duration::from_secs(3540);

pub const DEFAULT_JWT_TOKEN_TTL: Duration = MAX_JWT_TOKEN_TTL;
/// How long a task waits for a pooled connection before erroring.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on a single HTTP request; a request that runs past it is retried.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;
pub const DEFAULT_MAX_THREADS_PER_QUERY: usize = 8;
/// Partitions per fetch worker (4 => a second worker once there are 5 partitions).
pub const DEFAULT_THREAD_SCALE_FACTOR: usize = 4;
/// Retries for retryable HTTP responses (429, 504, ...).
pub const DEFAULT_HTTP_RETRIES: u32 = 2;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Env helpers ──────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_required(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| ClientError::Config(format!("{key} must be set")))
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_opt(key)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_opt(key)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

// ── Credentials ──────────────────────────────────────────────────

/// Identity used to sign key-pair tokens.
#[derive(Clone)]
pub struct Credentials {
    /// Organization name; omitted from the token when empty.
    pub organization: Option<String>,
    pub account: String,
    pub user: String,
    /// PEM text of an RSA private key (PKCS#8 or PKCS#1).
    pub private_key_pem: String,
    /// `SHA256:<base64>` fingerprint of the public key. Derived when `None`.
    pub public_key_fingerprint: Option<String>,
}

impl Credentials {
    pub fn new(
        organization: Option<String>,
        account: impl Into<String>,
        user: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.filter(|o| !o.is_empty()),
            account: account.into(),
            user: user.into(),
            private_key_pem: private_key_pem.into(),
            public_key_fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.public_key_fingerprint = Some(fingerprint.into());
        self
    }

    /// `{ORG-}ACCOUNT`, the account identifier used in token claims.
    pub fn qualified_account(&self) -> String {
        match self.organization.as_deref().filter(|o| !o.is_empty()) {
            Some(org) => format!("{}-{}", org.to_uppercase(), self.account.to_uppercase()),
            None => self.account.to_uppercase(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.account.is_empty() {
            return Err(ClientError::Config("account must be set".into()));
        }
        if self.user.is_empty() {
            return Err(ClientError::Config("user must be set".into()));
        }
        if self.private_key_pem.trim().is_empty() {
            return Err(ClientError::Config("private key must be set".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("organization", &self.organization)
            .field("account", &self.account)
            .field("user", &self.user)
            .field("private_key_pem", &"<redacted>")
            .field("public_key_fingerprint", &self.public_key_fingerprint)
            .finish()
    }
}

// ── ClientConfig ─────────────────────────────────────────────────

/// Connection settings and tuning knobs for a [`Client`](crate::Client).
///
/// Precedence is explicit `with_*` override, then environment
/// ([`ClientConfig::from_env`]), then the `DEFAULT_*` constants.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URI of the account, e.g. `https://myorg-myaccount.snowflakecomputing.com`.
    pub base_uri: String,
    pub credentials: Credentials,
    pub default_warehouse: Option<String>,
    pub default_database: Option<String>,
    pub default_schema: Option<String>,
    pub default_role: Option<String>,
    /// Lifetime of each signed token. Capped at [`MAX_JWT_TOKEN_TTL`].
    pub jwt_token_ttl: Duration,
    /// Maximum wait for a pooled connection.
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
    pub max_connections: usize,
    pub max_threads_per_query: usize,
    pub thread_scale_factor: usize,
    pub http_retries: u32,
    /// Maximum time from submission until the statement must be complete.
    pub query_timeout: Duration,
    pub poll_interval: Duration,
    /// First retry sleeps this long; each later retry doubles it.
    pub retry_backoff_base: Duration,
}

impl ClientConfig {
    pub fn new(base_uri: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_uri: base_uri.into(),
            credentials,
            default_warehouse: None,
            default_database: None,
            default_schema: None,
            default_role: None,
            jwt_token_ttl: DEFAULT_JWT_TOKEN_TTL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_threads_per_query: DEFAULT_MAX_THREADS_PER_QUERY,
            thread_scale_factor: DEFAULT_THREAD_SCALE_FACTOR,
            http_retries: DEFAULT_HTTP_RETRIES,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
        }
    }

    /// Build config from `SNOWFLAKE_*` environment variables.
    ///
    /// The private key comes from `SNOWFLAKE_PRIVATE_KEY` or, failing that, the
    /// file named by `SNOWFLAKE_PRIVATE_KEY_PATH`. Numeric knobs that are
    /// missing or unparsable fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let private_key_pem = match env_opt("SNOWFLAKE_PRIVATE_KEY") {
            Some(key) => key,
            None => match env_opt("SNOWFLAKE_PRIVATE_KEY_PATH") {
                Some(path) => fs::read_to_string(&path).map_err(|e| {
                    ClientError::Config(format!("cannot read private key at {path}: {e}"))
                })?,
                None => {
                    return Err(ClientError::Config(
                        "either SNOWFLAKE_PRIVATE_KEY or SNOWFLAKE_PRIVATE_KEY_PATH must be set"
                            .into(),
                    ))
                }
            },
        };

        let mut credentials = Credentials::new(
            env_opt("SNOWFLAKE_ORGANIZATION"),
            env_required("SNOWFLAKE_ACCOUNT")?,
            env_required("SNOWFLAKE_USER")?,
            private_key_pem,
        );
        credentials.public_key_fingerprint = env_opt("SNOWFLAKE_PUBLIC_KEY_FINGERPRINT");

        Ok(Self {
            base_uri: env_required("SNOWFLAKE_URI")?,
            credentials,
            default_warehouse: env_opt("SNOWFLAKE_DEFAULT_WAREHOUSE"),
            default_database: env_opt("SNOWFLAKE_DEFAULT_DATABASE"),
            default_schema: env_opt("SNOWFLAKE_DEFAULT_SCHEMA"),
            default_role: env_opt("SNOWFLAKE_DEFAULT_ROLE"),
            jwt_token_ttl: env_secs("SNOWFLAKE_JWT_TOKEN_TTL", DEFAULT_JWT_TOKEN_TTL),
            connection_timeout: env_secs("SNOWFLAKE_CONNECTION_TIMEOUT", DEFAULT_CONNECTION_TIMEOUT),
            request_timeout: env_secs("SNOWFLAKE_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT),
            max_connections: env_usize("SNOWFLAKE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            max_threads_per_query: env_usize(
                "SNOWFLAKE_MAX_THREADS_PER_QUERY",
                DEFAULT_MAX_THREADS_PER_QUERY,
            ),
            thread_scale_factor: env_usize(
                "SNOWFLAKE_THREAD_SCALE_FACTOR",
                DEFAULT_THREAD_SCALE_FACTOR,
            ),
            http_retries: env_u32("SNOWFLAKE_HTTP_RETRIES", DEFAULT_HTTP_RETRIES),
            query_timeout: env_secs("SNOWFLAKE_QUERY_TIMEOUT", DEFAULT_QUERY_TIMEOUT),
            poll_interval: env_millis("SNOWFLAKE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL),
            retry_backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
        })
    }

    pub fn with_default_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.default_warehouse = Some(warehouse.into());
        self
    }

    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = Some(role.into());
        self
    }

    pub fn with_jwt_token_ttl(mut self, ttl: Duration) -> Self {
        self.jwt_token_ttl = ttl;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_threads_per_query(mut self, max: usize) -> Self {
        self.max_threads_per_query = max;
        self
    }

    pub fn with_thread_scale_factor(mut self, factor: usize) -> Self {
        self.thread_scale_factor = factor;
        self
    }

    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_backoff_base(mut self, base: Duration) -> Self {
        self.retry_backoff_base = base;
        self
    }

    /// Token lifetime actually used for signing.
    pub fn effective_jwt_token_ttl(&self) -> Duration {
        self.jwt_token_ttl.min(MAX_JWT_TOKEN_TTL)
    }

    /// Check that every required field is present and every knob is usable.
    pub fn validate(&self) -> Result<()> {
        if self.base_uri.is_empty() {
            return Err(ClientError::Config("base URI must be set".into()));
        }
        self.credentials.validate()?;
        if self.max_connections == 0 {
            return Err(ClientError::Config("max_connections must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("request_timeout must be positive".into()));
        }
        if self.max_threads_per_query == 0 {
            return Err(ClientError::Config(
                "max_threads_per_query must be at least 1".into(),
            ));
        }
        if self.thread_scale_factor == 0 {
            return Err(ClientError::Config(
                "thread_scale_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Client config loaded:");
        tracing::info!("  base_uri:    {}", self.base_uri);
        tracing::info!(
            "  identity:    account={}, user={}",
            self.credentials.qualified_account(),
            self.credentials.user.to_uppercase()
        );
        tracing::info!(
            "  defaults:    warehouse={}, database={}, schema={}, role={}",
            self.default_warehouse.as_deref().unwrap_or("(none)"),
            self.default_database.as_deref().unwrap_or("(none)"),
            self.default_schema.as_deref().unwrap_or("(none)"),
            self.default_role.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  pool:        max_connections={}, checkout_timeout={}s, request_timeout={}s",
            self.max_connections,
            self.connection_timeout.as_secs(),
            self.request_timeout.as_secs()
        );
        tracing::info!(
            "  fetch:       max_threads={}, scale_factor={}, retries={}, query_timeout={}s",
            self.max_threads_per_query,
            self.thread_scale_factor,
            self.http_retries,
            self.query_timeout.as_secs()
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────
