pub mod auth;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod pool;
pub mod result;
pub mod row;
pub mod strategy;
pub mod wire;

pub use auth::{fingerprint_from_pem, KeyPairAuth};
pub use client::{count_statements, Client, QueryOptions};
pub use config::{load_dotenv, ClientConfig, Credentials};
pub use decode::{decode, Value};
pub use error::{ClientError, Result};
pub use result::{Column, Columns, QueryResult};
pub use row::{ColumnKey, Row};
pub use strategy::streaming::StreamingResult;
pub use strategy::{number_of_threads, PartitionFetcher};
