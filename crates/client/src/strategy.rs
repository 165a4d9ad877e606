//! Result assembly strategies.
//!
//! A completed statement arrives with its column metadata, the declared row
//! count of every partition, and the rows of partition 0. The remaining
//! partitions are fetched one of three ways:
//!
//! - [`sequential`]: in order, on the calling task.
//! - [`parallel`]: one task per partition, bounded by the per-query thread count.
//! - [`streaming`]: lazily, with one partition prefetched ahead of the reader.

pub mod parallel;
pub mod sequential;
pub mod streaming;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ClientError, Result};
use crate::result::{check_partition, Columns};
use crate::wire::{PartitionInfo, RawRow, StatementResponse};

/// Source of the rows of partitions `1..N` of one statement.
#[async_trait]
pub trait PartitionFetcher: Send + Sync {
    async fn fetch_partition(&self, index: usize) -> Result<Vec<RawRow>>;
}

/// Everything a strategy starts from: metadata plus the embedded partition 0.
#[derive(Debug, Clone)]
pub struct ResultSeed {
    pub columns: Arc<Columns>,
    pub partitions: Vec<PartitionInfo>,
    pub first: Vec<RawRow>,
}

impl ResultSeed {
    /// Build from a completed (non-pending) statement response.
    ///
    /// Partition 0 is checked against its declared row count here, so every
    /// strategy sees an already validated first partition. A response without
    /// partition info has zero partitions and must not carry rows.
    pub fn from_response(response: StatementResponse) -> Result<Self> {
        let meta = response.result_set_meta_data.ok_or_else(|| {
            ClientError::Parse(format!(
                "statement {} completed without resultSetMetaData",
                response.statement_handle
            ))
        })?;
        let first = response.data.unwrap_or_default();

        match meta.partition_info.first() {
            Some(declared) => check_partition(0, declared, &first)?,
            None if !first.is_empty() => {
                return Err(ClientError::PartitionMismatch {
                    partition: 0,
                    expected: 0,
                    actual: first.len(),
                })
            }
            None => {}
        }

        Ok(Self {
            columns: Arc::new(Columns::from_row_types(&meta.row_type)),
            partitions: meta.partition_info,
            first,
        })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

/// Worker count for a result: `ceil(partitions / scale_factor)`, clamped to
/// `1..=max_threads`.
pub fn number_of_threads(partition_count: usize, scale_factor: usize, max_threads: usize) -> usize {
    partition_count
        .div_ceil(scale_factor.max(1))
        .clamp(1, max_threads.max(1))
}
