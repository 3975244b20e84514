/// In-process candle storage with the same upsert semantics as the Postgres store.
/// Used for dry runs and tests.
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::storage::CandleStore;
use crate::types::{Candle, Partition};

type Table = BTreeMap<(String, i64), Candle>;
type FailurePredicate = Arc<dyn Fn(&[Candle]) -> bool + Send + Sync>;

#[derive(Default)]
pub struct MemoryCandleStore {
    tables: RwLock<HashMap<String, Table>>,
    fail_when: Option<FailurePredicate>,
    unavailable: bool,
    upsert_calls: RwLock<usize>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upsert whose rows match the predicate
    pub fn with_failing_batches<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Candle]) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Simulate a store that cannot be reached at all
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// All rows of a partition, ordered by (symbol, open_time)
    pub async fn rows(&self, partition: &Partition) -> Vec<Candle> {
        let tables = self.tables.read().await;
        tables
            .get(&partition.table_name())
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, partition: &Partition) -> usize {
        let tables = self.tables.read().await;
        tables.get(&partition.table_name()).map_or(0, |t| t.len())
    }

    pub async fn has_partition(&self, partition: &Partition) -> bool {
        self.tables.read().await.contains_key(&partition.table_name())
    }

    pub async fn upsert_calls(&self) -> usize {
        *self.upsert_calls.read().await
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(SyncError::StorageError("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn ensure_partition(&self, partition: &Partition) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        tables.entry(partition.table_name()).or_default();
        Ok(())
    }

    async fn upsert_batch(&self, partition: &Partition, rows: &[Candle]) -> Result<u64> {
        self.check_available()?;
        *self.upsert_calls.write().await += 1;

        if let Some(predicate) = &self.fail_when {
            if predicate(rows) {
                return Err(SyncError::StorageError("injected batch failure".to_string()));
            }
        }

        let mut tables = self.tables.write().await;
        let table = tables.get_mut(&partition.table_name()).ok_or_else(|| {
            SyncError::StorageError(format!("relation {} does not exist", partition.table_name()))
        })?;

        for row in rows {
            table.insert((row.symbol.clone(), row.open_time), row.clone());
        }

        debug!("Upserted {} rows into {}", rows.len(), partition.table_name());
        Ok(rows.len() as u64)
    }

    async fn latest_close_time(
        &self,
        partition: &Partition,
        symbols: &[String],
    ) -> Result<HashMap<String, i64>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let table = tables.get(&partition.table_name()).ok_or_else(|| {
            SyncError::StorageError(format!("relation {} does not exist", partition.table_name()))
        })?;

        let mut latest = HashMap::new();
        for candle in table.values() {
            if symbols.contains(&candle.symbol) {
                let entry = latest.entry(candle.symbol.clone()).or_insert(candle.close_time);
                *entry = (*entry).max(candle.close_time);
            }
        }
        Ok(latest)
    }

    async fn health_check(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketType;
    use rust_decimal::Decimal;

    fn candle(symbol: &str, open_time: i64, close: i64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            open_time,
            close_time: open_time + 60_000,
            open: Decimal::from(close),
            high: Decimal::from(close),
            low: Decimal::from(close),
            close: Decimal::from(close),
            volume: Decimal::ONE,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryCandleStore::new();
        let partition = Partition::new("binance", MarketType::Spot, "1m");
        store.ensure_partition(&partition).await.unwrap();
        store.ensure_partition(&partition).await.unwrap();

        let batch = vec![candle("BTCUSDT", 0, 10), candle("BTCUSDT", 60_000, 11)];
        store.upsert_batch(&partition, &batch).await.unwrap();
        let first = store.rows(&partition).await;

        store.upsert_batch(&partition, &batch).await.unwrap();
        let second = store.rows(&partition).await;

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_values_not_keys() {
        let store = MemoryCandleStore::new();
        let partition = Partition::new("binance", MarketType::Spot, "1m");
        store.ensure_partition(&partition).await.unwrap();

        store.upsert_batch(&partition, &[candle("BTCUSDT", 0, 10)]).await.unwrap();
        store.upsert_batch(&partition, &[candle("BTCUSDT", 0, 99)]).await.unwrap();

        let rows = store.rows(&partition).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, Decimal::from(99));
    }

    #[tokio::test]
    async fn test_latest_close_time() {
        let store = MemoryCandleStore::new();
        let partition = Partition::new("binance", MarketType::Usdm, "1m");

        // Absent table behaves like a missing relation
        assert!(store.latest_close_time(&partition, &["BTCUSDT".to_string()]).await.is_err());

        store.ensure_partition(&partition).await.unwrap();
        store
            .upsert_batch(
                &partition,
                &[candle("BTCUSDT", 0, 1), candle("BTCUSDT", 120_000, 1), candle("ETHUSDT", 60_000, 1)],
            )
            .await
            .unwrap();

        let latest = store
            .latest_close_time(&partition, &["BTCUSDT".to_string(), "SOLUSDT".to_string()])
            .await
            .unwrap();

        assert_eq!(latest.get("BTCUSDT"), Some(&180_000));
        assert!(!latest.contains_key("SOLUSDT"));
        assert!(!latest.contains_key("ETHUSDT"));
    }
}
