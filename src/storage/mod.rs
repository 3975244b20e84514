pub mod memory;
pub mod postgres;

pub use memory::MemoryCandleStore;
pub use postgres::PostgresCandleStore;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{Candle, Partition};

/// Durable keyed candle storage.
/// Rows are keyed by (symbol, open_time); an upsert replaces value columns only.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Create the partition's table if absent. Safe to call repeatedly.
    async fn ensure_partition(&self, partition: &Partition) -> Result<()>;

    /// Insert-or-replace one batch, returns the number of rows written
    async fn upsert_batch(&self, partition: &Partition, rows: &[Candle]) -> Result<u64>;

    /// Latest persisted close time per symbol; symbols without rows are absent from the map
    async fn latest_close_time(
        &self,
        partition: &Partition,
        symbols: &[String],
    ) -> Result<HashMap<String, i64>>;

    /// Cheap connectivity check run at the start of each cycle
    async fn health_check(&self) -> Result<()>;
}
