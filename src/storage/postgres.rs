/// PostgreSQL candle storage, one table per partition
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::storage::CandleStore;
use crate::types::{Candle, DatabaseConfig, Partition};

pub struct PostgresCandleStore {
    pool: PgPool,
}

impl PostgresCandleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a bounded pool. Connections are opened lazily so that an unreachable
    /// database surfaces as a failed cycle rather than a failed process start.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_sec))
            .connect_lazy(&config.url)?;

        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CandleStore for PostgresCandleStore {
    async fn ensure_partition(&self, partition: &Partition) -> Result<()> {
        let table = partition.table_name();

        // Table names are sanitized to [a-z0-9_] by Partition::table_name
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                symbol      TEXT        NOT NULL,
                open_time   BIGINT      NOT NULL,
                close_time  BIGINT      NOT NULL,
                open        NUMERIC     NOT NULL,
                high        NUMERIC     NOT NULL,
                low         NUMERIC     NOT NULL,
                close       NUMERIC     NOT NULL,
                volume      NUMERIC     NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (symbol, open_time)
            )
            "#
        );

        sqlx::query(&query).execute(&self.pool).await?;
        debug!("✓ Ensured partition table {}", table);
        Ok(())
    }

    async fn upsert_batch(&self, partition: &Partition, rows: &[Candle]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let table = partition.table_name();
        let mut query_builder = QueryBuilder::new(format!(
            "INSERT INTO {} (symbol, open_time, close_time, open, high, low, close, volume) ",
            table
        ));

        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(&row.symbol)
                .push_bind(row.open_time)
                .push_bind(row.close_time)
                .push_bind(row.open)
                .push_bind(row.high)
                .push_bind(row.low)
                .push_bind(row.close)
                .push_bind(row.volume);
        });

        query_builder.push(
            " ON CONFLICT (symbol, open_time) DO UPDATE SET \
             close_time = EXCLUDED.close_time, \
             open = EXCLUDED.open, \
             high = EXCLUDED.high, \
             low = EXCLUDED.low, \
             close = EXCLUDED.close, \
             volume = EXCLUDED.volume, \
             updated_at = NOW()",
        );

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn latest_close_time(
        &self,
        partition: &Partition,
        symbols: &[String],
    ) -> Result<HashMap<String, i64>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!(
            "SELECT symbol, MAX(close_time) FROM {} WHERE symbol = ANY($1) GROUP BY symbol",
            partition.table_name()
        );

        let rows: Vec<(String, Option<i64>)> = sqlx::query_as(&query)
            .bind(symbols)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(symbol, latest)| latest.map(|t| (symbol, t)))
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
