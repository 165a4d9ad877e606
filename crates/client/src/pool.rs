//! Bounded pool of self-healing HTTP connections.
//!
//! Each [`HttpConnection`] owns a single keep-alive connection to the account
//! host. The pool hands out at most `capacity` of them at once; callers that
//! cannot get one within the checkout timeout receive
//! [`ClientError::PoolExhausted`].

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use url::Url;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{ClientError, Result};

/// Idle time after which a kept-alive connection is assumed closed by the server.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(55);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How connections are opened.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// One persistent connection that reopens itself when it has gone stale.
pub struct HttpConnection {
    settings: ConnectionSettings,
    client: Option<reqwest::Client>,
    last_used: Instant,
    opened: u32,
}

impl HttpConnection {
    fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            client: None,
            last_used: Instant::now(),
            opened: 0,
        }
    }

    /// A connection is active once opened and not idle past the keep-alive window.
    pub fn is_active(&self) -> bool {
        self.client.is_some() && self.last_used.elapsed() < self.settings.idle_timeout
    }

    /// How many times this connection has been (re)opened.
    pub fn times_opened(&self) -> u32 {
        self.opened
    }

    pub fn base_url(&self) -> &Url {
        &self.settings.base_url
    }

    /// Open the underlying connection, replacing any previous one.
    ///
    /// Redirects are never followed: a 3xx comes back to the caller as is.
    pub fn start(&mut self) -> Result<()> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(self.settings.idle_timeout)
            .tcp_keepalive(self.settings.idle_timeout)
            .build()
            .map_err(|e| ClientError::Connection(format!("Error connecting to server: {e}")))?;

        self.opened += 1;
        self.client = Some(client);
        self.last_used = Instant::now();
        debug!(
            host = self.settings.base_url.host_str().unwrap_or_default(),
            opened = self.opened,
            "Opened HTTP connection"
        );
        Ok(())
    }

    /// Send a request, reconnecting first if the connection is closed or stale.
    ///
    /// Transport failures mark the connection closed so the next use reopens it.
    pub async fn send(&mut self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build().map_err(|e| ClientError::Request(e.to_string()))?;
        let client = self.client()?.clone();

        match client.execute(request).await {
            Ok(response) => {
                self.last_used = Instant::now();
                Ok(response)
            }
            Err(e) => {
                self.close();
                Err(ClientError::Request(format!("HTTP error requesting data: {e}")))
            }
        }
    }

    /// Client bound to this connection, reopening it if needed.
    pub fn client(&mut self) -> Result<&reqwest::Client> {
        if !self.is_active() {
            self.start()?;
        }
        self.client
            .as_ref()
            .ok_or_else(|| ClientError::Connection("connection not open".into()))
    }

    pub fn close(&mut self) {
        self.client = None;
    }
}

struct PoolInner {
    settings: ConnectionSettings,
    idle: Mutex<Vec<HttpConnection>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    checkout_timeout: Duration,
}

/// Fixed-capacity pool; connections are created on first checkout.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(settings: ConnectionSettings, capacity: usize, checkout_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                settings,
                idle: Mutex::new(Vec::with_capacity(capacity)),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                checkout_timeout,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Connections not currently checked out.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Borrow a connection, waiting at most the checkout timeout.
    pub async fn checkout(&self) -> Result<PooledConnection> {
        let waited = self.inner.checkout_timeout;
        let permit = tokio::time::timeout(waited, Arc::clone(&self.inner.permits).acquire_owned())
            .await
            .map_err(|_| ClientError::PoolExhausted { waited })?
            .map_err(|_| ClientError::Connection("connection pool closed".into()))?;

        let conn = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| HttpConnection::new(self.inner.settings.clone()));

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct PooledConnection {
    conn: Option<HttpConnection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = HttpConnection;

    fn deref(&self) -> &HttpConnection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut HttpConnection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(conn);
        }
    }
}
