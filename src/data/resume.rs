/// Resume cursors: where each symbol's next run starts
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::storage::CandleStore;
use crate::types::Partition;

/// Resolve the start time of every symbol with one grouped lookup, in `symbols` order.
///
/// A failed lookup is expected on a first run (the table does not exist yet), so it
/// is logged and every symbol falls back to `now - lookback`.
pub async fn resolve(
    store: &dyn CandleStore,
    partition: &Partition,
    symbols: &[String],
    lookback_ms: i64,
    now_ms: i64,
) -> Vec<(String, i64)> {
    let cursors = match store.latest_close_time(partition, symbols).await {
        Ok(cursors) => cursors,
        Err(e) => {
            let failure = SyncError::PartitionLookupFailure {
                partition: partition.to_string(),
                reason: e.to_string(),
            };
            warn!("⚠️  {} [{}], starting from lookback", failure, failure.error_code());
            HashMap::new()
        }
    };

    let fallback = now_ms - lookback_ms;

    symbols
        .iter()
        .map(|symbol| {
            let start = match cursors.get(symbol) {
                Some(&latest) => latest,
                None => {
                    debug!("No cursor for {} in {}, using lookback", symbol, partition);
                    fallback
                }
            };
            (symbol.clone(), start)
        })
        .collect()
}
