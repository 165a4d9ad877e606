use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::result::{check_partition, Columns};
use crate::row::Row;
use crate::wire::{PartitionInfo, RawRow};

use super::{PartitionFetcher, ResultSeed};

type Prefetch = JoinHandle<Result<Vec<RawRow>>>;

/// A result read partition by partition.
///
/// Only the partition being read is held in memory. While it is consumed
/// the next one is already being fetched in the background; the reader only
/// waits when it reaches a partition whose fetch has not finished yet.
///
/// Rows borrow from the result, so iteration is a lending loop:
///
/// ```ignore
/// while let Some(row) = stream.next().await {
///     let row = row?;
///     println!("{}", row.get("id")?);
/// }
/// ```
pub struct StreamingResult {
    columns: Arc<Columns>,
    declared: Vec<PartitionInfo>,
    fetcher: Arc<dyn PartitionFetcher>,
    current: Vec<RawRow>,
    current_partition: usize,
    next_row: usize,
    pending: Option<Prefetch>,
    done: bool,
}

impl StreamingResult {
    /// Start streaming from a validated seed. Must be called inside a Tokio runtime.
    pub fn new(seed: ResultSeed, fetcher: Arc<dyn PartitionFetcher>) -> Self {
        let mut stream = Self {
            columns: seed.columns,
            declared: seed.partitions,
            fetcher,
            current: seed.first,
            current_partition: 0,
            next_row: 0,
            pending: None,
            done: false,
        };
        stream.prefetch(1);
        stream
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn partition_count(&self) -> usize {
        self.declared.len()
    }

    /// Whether a background fetch of the next partition has been started.
    pub fn is_prefetching(&self) -> bool {
        self.pending.is_some()
    }

    /// Next row in partition-then-row order, or `None` once exhausted.
    ///
    /// After an error the stream is finished.
    pub async fn next(&mut self) -> Option<Result<Row<'_>>> {
        while self.next_row >= self.current.len() {
            if self.done {
                return None;
            }
            match self.advance().await {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let index = self.next_row;
        self.next_row += 1;
        Some(Ok(Row::new(&self.columns, &self.current[index])))
    }

    /// Not available: the total is only known after every partition is read.
    pub fn size(&self) -> Result<usize> {
        Err(ClientError::Unsupported("size"))
    }

    /// Not available: would require reading the whole result.
    pub fn last(&self) -> Result<Row<'_>> {
        Err(ClientError::Unsupported("last"))
    }

    /// Swap in the next partition, waiting for its prefetch if needed.
    async fn advance(&mut self) -> Result<bool> {
        let index = self.current_partition + 1;
        if index >= self.declared.len() {
            return Ok(false);
        }

        let handle = match self.pending.take() {
            Some(handle) => handle,
            None => self.spawn_fetch(index),
        };
        let rows = handle.await.map_err(|e| {
            ClientError::ConnectionStarved(format!("partition {index} fetch failed: {e}"))
        })??;
        check_partition(index, &self.declared[index], &rows)?;
        debug!(partition = index, rows = rows.len(), "Streaming partition");

        self.current = rows;
        self.current_partition = index;
        self.next_row = 0;
        self.prefetch(index + 1);
        Ok(true)
    }

    fn prefetch(&mut self, index: usize) {
        if index < self.declared.len() {
            self.pending = Some(self.spawn_fetch(index));
        }
    }

    fn spawn_fetch(&self, index: usize) -> Prefetch {
        let fetcher = Arc::clone(&self.fetcher);
        tokio::spawn(async move { fetcher.fetch_partition(index).await })
    }
}

impl Drop for StreamingResult {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
