use tracing::debug;

use crate::error::Result;
use crate::result::{QueryResult, ResultBuilder};

use super::{PartitionFetcher, ResultSeed};

/// Fetch partitions `1..N` one after another on the calling task.
pub async fn assemble(seed: ResultSeed, fetcher: &dyn PartitionFetcher) -> Result<QueryResult> {
    let mut builder = ResultBuilder::new(seed.columns, seed.partitions);
    let count = builder.partition_count();
    if count == 0 {
        return builder.finish();
    }

    builder.insert(0, seed.first)?;
    for index in 1..count {
        let rows = fetcher.fetch_partition(index).await?;
        debug!(partition = index, rows = rows.len(), "Fetched partition");
        builder.insert(index, rows)?;
    }
    builder.finish()
}
