/// Batched upsert writer with per-batch retry and skip-on-exhaustion
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{Result, SyncError};
use crate::storage::CandleStore;
use crate::types::{Candle, Partition};
use crate::utils::batch_key;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub batches: usize,
    pub batches_written: usize,
    /// Indices of batches skipped after exhausting their retries
    pub failed_batches: Vec<usize>,
    pub rows_written: u64,
}

pub struct BatchWriter {
    store: Arc<dyn CandleStore>,
    batch_size: usize,
    max_attempts: u32,
    retry_delay: Duration,
}

/// Drop repeated (symbol, close_time) keys, keeping the first
fn dedup_batch(batch: &[Candle]) -> Vec<Candle> {
    let mut seen = HashSet::with_capacity(batch.len());
    let mut unique = Vec::with_capacity(batch.len());
    for candle in batch {
        if seen.insert((candle.symbol.as_str(), candle.close_time)) {
            unique.push(candle.clone());
        }
    }
    unique
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn CandleStore>,
        batch_size: usize,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Persist a cleaned series. Only a failure to create the partition is returned;
    /// a batch that cannot be written is logged and skipped.
    pub async fn write(
        &self,
        partition: &Partition,
        symbol: &str,
        candles: &[Candle],
    ) -> Result<WriteReport> {
        self.store.ensure_partition(partition).await?;

        let mut report = WriteReport::default();

        for (index, chunk) in candles.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            let batch = dedup_batch(chunk);
            let key = batch_key(partition, symbol, &batch);

            match self.upsert_with_retry(partition, &batch, &key).await {
                Ok(rows) => {
                    report.batches_written += 1;
                    report.rows_written += rows;
                    debug!(
                        "   Batch {} [{}] for {}: {} rows",
                        index, key, symbol, rows
                    );
                }
                Err((attempts, e)) => {
                    let failure = SyncError::BatchPersistFailure {
                        symbol: symbol.to_string(),
                        batch_index: index,
                        attempts,
                        reason: e.to_string(),
                    };
                    error!("❌ {} [{}] batch_key={}, skipping", failure, failure.error_code(), key);
                    report.failed_batches.push(index);
                }
            }
        }

        Ok(report)
    }

    async fn upsert_with_retry(
        &self,
        partition: &Partition,
        batch: &[Candle],
        key: &str,
    ) -> std::result::Result<u64, (u32, SyncError)> {
        let mut attempt = 1;
        loop {
            match self.store.upsert_batch(partition, batch).await {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "⚠️  Upsert of batch {} failed (attempt {}/{}): {}",
                        key, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err((attempt, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCandleStore;
    use crate::types::MarketType;
    use rust_decimal::Decimal;

    const T0: i64 = 1_699_999_980_000;
    const MINUTE: i64 = 60_000;

    fn candle(open_time: i64) -> Candle {
        Candle {
            symbol: "BTCUSDT".to_string(),
            open_time,
            close_time: open_time + MINUTE,
            open: Decimal::new(open_time / MINUTE, 0),
            high: Decimal::new(open_time / MINUTE, 0),
            low: Decimal::new(open_time / MINUTE, 0),
            close: Decimal::new(open_time / MINUTE, 0),
            volume: Decimal::new(5, 1),
        }
    }

    fn series(count: i64) -> Vec<Candle> {
        (0..count).map(|i| candle(T0 + i * MINUTE)).collect()
    }

    fn partition() -> Partition {
        Partition::new("binance", MarketType::Spot, "1m")
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_does_not_block_others() {
        // Batch 2 (open times 20..30) always fails
        let poisoned = T0 + 20 * MINUTE;
        let store = Arc::new(
            MemoryCandleStore::new().with_failing_batches(move |rows| rows.iter().any(|c| c.open_time == poisoned)),
        );
        let writer = BatchWriter::new(store.clone(), 10, 3, Duration::from_secs(1));

        let report = writer.write(&partition(), "BTCUSDT", &series(50)).await.unwrap();

        assert_eq!(report.batches, 5);
        assert_eq!(report.batches_written, 4);
        assert_eq!(report.failed_batches, vec![2]);
        assert_eq!(report.rows_written, 40);

        let stored: Vec<i64> = store.rows(&partition()).await.iter().map(|c| c.open_time).collect();
        assert_eq!(stored.len(), 40);
        assert!(!stored.contains(&poisoned));
        assert!(stored.contains(&(T0 + 49 * MINUTE)));

        // 4 good batches + 3 attempts for the poisoned one
        assert_eq!(store.upsert_calls().await, 7);
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_are_dropped() {
        let store = Arc::new(MemoryCandleStore::new());
        let writer = BatchWriter::new(store.clone(), 10, 3, Duration::ZERO);

        let mut candles = series(4);
        let mut dup = candle(T0 + MINUTE);
        dup.close = Decimal::new(-1, 0);
        candles.insert(2, dup);

        let report = writer.write(&partition(), "BTCUSDT", &candles).await.unwrap();

        assert_eq!(report.rows_written, 4);
        let rows = store.rows(&partition()).await;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].close, candle(T0 + MINUTE).close);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = Arc::new(MemoryCandleStore::new());
        let writer = BatchWriter::new(store.clone(), 7, 3, Duration::ZERO);

        writer.write(&partition(), "BTCUSDT", &series(30)).await.unwrap();
        let first = store.rows(&partition()).await;

        let report = writer.write(&partition(), "BTCUSDT", &series(30)).await.unwrap();
        let second = store.rows(&partition()).await;

        assert_eq!(report.batches, 5);
        assert!(report.failed_batches.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_partition_failure_is_returned() {
        let store = Arc::new(MemoryCandleStore::unavailable());
        let writer = BatchWriter::new(store, 10, 3, Duration::ZERO);

        assert!(writer.write(&partition(), "BTCUSDT", &series(3)).await.is_err());
    }

    #[tokio::test]
    async fn test_partition_created_without_rows() {
        let store = Arc::new(MemoryCandleStore::new());
        let writer = BatchWriter::new(store.clone(), 10, 3, Duration::ZERO);
        assert!(!store.has_partition(&partition()).await);

        let report = writer.write(&partition(), "BTCUSDT", &[]).await.unwrap();

        assert_eq!(report, WriteReport::default());
        assert!(store.has_partition(&partition()).await);
        assert_eq!(store.upsert_calls().await, 0);
    }
}
