//! Error type shared by every layer of the client.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors that can occur while talking to the SQL API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required setting or credential is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The private key could not be read or used for signing.
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Opening (or re-opening) a pooled connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport failed while a request was in flight.
    #[error("Request error: {0}")]
    Request(String),

    /// The service answered with a status that is not retried (or retries ran out).
    #[error("Bad response! Got code: {status}, w/ message {body}")]
    BadResponse { status: u16, body: String },

    /// No pooled connection became free within the checkout timeout.
    #[error("Connection pool exhausted: no connection available after {waited:?}")]
    PoolExhausted { waited: Duration },

    /// A parallel partition fetch died without producing a domain error.
    #[error("Partition fetch starved: {0}")]
    ConnectionStarved(String),

    /// The statement did not finish within the configured query timeout.
    #[error(
        "Query timed out. Query cancelled? {cancelled}; Duration: {}s; Statement handle: {statement_handle}",
        .elapsed.as_secs()
    )]
    QueryTimeout {
        statement_handle: String,
        elapsed: Duration,
        cancelled: bool,
    },

    /// A partition held a different number of rows than its metadata declared.
    #[error("Partition {partition} declared {expected} rows but returned {actual}")]
    PartitionMismatch {
        partition: usize,
        expected: usize,
        actual: usize,
    },

    /// A response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A cell could not be converted to its declared column type.
    #[error("Cannot decode {value:?} in column {column} as {column_type}: {reason}")]
    Decode {
        column: String,
        column_type: String,
        value: String,
        reason: String,
    },

    /// Row lookup by a name or index that the result does not have.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// The operation is not available on this kind of result.
    #[error("{0} is not supported on a streaming result")]
    Unsupported(&'static str),
}

impl ClientError {
    /// HTTP status carried by a [`ClientError::BadResponse`], if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::BadResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}
