use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::result::{QueryResult, ResultBuilder};

use super::{PartitionFetcher, ResultSeed};

/// Fetch partitions `1..N` concurrently, at most `threads` at a time.
///
/// Each partition lands in its own slot, so the result is ordered by index
/// whatever order the fetches finish in. The first failure aborts the
/// remaining fetches; fetcher errors come back unchanged, a task that panics
/// or is cancelled becomes [`ClientError::ConnectionStarved`].
pub async fn assemble(
    seed: ResultSeed,
    fetcher: Arc<dyn PartitionFetcher>,
    threads: usize,
) -> Result<QueryResult> {
    let mut builder = ResultBuilder::new(seed.columns, seed.partitions);
    let count = builder.partition_count();
    if count == 0 {
        return builder.finish();
    }
    builder.insert(0, seed.first)?;

    let slots = Arc::new(Semaphore::new(threads.max(1)));
    let mut tasks = JoinSet::new();
    for index in 1..count {
        let fetcher = Arc::clone(&fetcher);
        let slots = Arc::clone(&slots);
        tasks.spawn(async move {
            let _slot = slots
                .acquire_owned()
                .await
                .map_err(|_| ClientError::ConnectionStarved("fetch slots closed".into()))?;
            let rows = fetcher.fetch_partition(index).await?;
            Ok::<_, ClientError>((index, rows))
        });
    }

    // Dropping `tasks` on an early return aborts whatever is still running.
    while let Some(joined) = tasks.join_next().await {
        let (index, rows) = joined.map_err(|e| {
            ClientError::ConnectionStarved(format!(
                "partition fetch task failed ({e}); concurrent queries may be contending for the connection pool"
            ))
        })??;
        debug!(partition = index, rows = rows.len(), "Fetched partition");
        builder.insert(index, rows)?;
    }
    builder.finish()
}
