/// Sequential page fetching with bounded rate-limit retry
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::planner::FetchPlan;
use crate::error::{Result, SyncError};
use crate::source::CandleSource;
use crate::types::{MarketType, RawCandle, SyncConfig};

pub struct PagedFetcher {
    source: Arc<dyn CandleSource>,
    inter_request_delay: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl PagedFetcher {
    pub fn new(
        source: Arc<dyn CandleSource>,
        inter_request_delay: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            inter_request_delay,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(source: Arc<dyn CandleSource>, config: &SyncConfig) -> Self {
        Self::new(
            source,
            Duration::from_millis(config.inter_request_delay_ms),
            config.rate_limit_max_attempts,
            Duration::from_secs(config.rate_limit_backoff_sec),
        )
    }

    /// One page with retry. A rate-limit signal waits the fixed back-off and tries
    /// again until the attempt ceiling; anything else fails at once.
    pub async fn fetch_one(
        &self,
        market: MarketType,
        symbol: &str,
        interval_label: &str,
        start_time: i64,
        max_count: usize,
    ) -> Result<Vec<RawCandle>> {
        let mut attempt = 1;
        loop {
            match self
                .source
                .fetch_page(market, symbol, interval_label, start_time, max_count)
                .await
            {
                Ok(page) => return Ok(page),
                Err(e) if e.is_rate_limited() => {
                    if attempt >= self.max_attempts {
                        return Err(SyncError::RateLimitExhausted {
                            symbol: symbol.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "⏳ Rate limited on {} (attempt {}/{}), backing off {}s: {}",
                        symbol,
                        attempt,
                        self.max_attempts,
                        self.backoff.as_secs(),
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SyncError::UpstreamFetchError {
                        symbol: symbol.to_string(),
                        cause: Box::new(e),
                    })
                }
            }
        }
    }

    /// Execute every planned request in order and concatenate the pages
    pub async fn fetch_all(
        &self,
        market: MarketType,
        interval_label: &str,
        plan: &FetchPlan,
    ) -> Result<Vec<RawCandle>> {
        let total = plan.num_pages();
        let mut candles = Vec::with_capacity(plan.total_needed);

        for request in &plan.requests {
            if request.index > 0 && !self.inter_request_delay.is_zero() {
                tokio::time::sleep(self.inter_request_delay).await;
            }

            let page = self
                .fetch_one(market, &plan.symbol, interval_label, request.start_time, request.limit)
                .await?;

            debug!(
                "   [{}/{}] {} page from {}: {} candles",
                request.index + 1,
                total,
                plan.symbol,
                request.start_time,
                page.len()
            );
            candles.extend(page);
        }

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::planner;
    use crate::source::testing::ScriptedSource;
    use tokio::time::Instant;

    const T0: i64 = 1_699_999_980_000;
    const MINUTE: i64 = 60_000;

    fn rate_limited() -> SyncError {
        SyncError::ApiError {
            code: -1003,
            message: "Too much request weight used".to_string(),
        }
    }

    fn fetcher(source: Arc<ScriptedSource>) -> PagedFetcher {
        PagedFetcher::new(source, Duration::from_millis(250), 3, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let source = Arc::new(ScriptedSource::new(MINUTE, 100).with_series("BTCUSDT", T0, T0 + 50 * MINUTE));
        source.fail_next(vec![rate_limited(), rate_limited()]);

        let started = Instant::now();
        let page = fetcher(source.clone())
            .fetch_one(MarketType::Spot, "BTCUSDT", "1m", T0, 100)
            .await
            .unwrap();

        assert_eq!(page.len(), 50);
        assert_eq!(source.calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted() {
        let source = Arc::new(ScriptedSource::new(MINUTE, 100).with_series("BTCUSDT", T0, T0 + 50 * MINUTE));
        source.fail_next(vec![
            SyncError::RateLimited("429".to_string()),
            SyncError::RateLimited("429".to_string()),
            SyncError::RateLimited("429".to_string()),
        ]);

        let err = fetcher(source.clone())
            .fetch_one(MarketType::Spot, "BTCUSDT", "1m", T0, 100)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RateLimitExhausted { attempts: 3, .. }));
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let source = Arc::new(ScriptedSource::new(MINUTE, 100).with_series("BTCUSDT", T0, T0 + 50 * MINUTE));
        source.fail_next(vec![SyncError::ApiError {
            code: -1121,
            message: "Invalid symbol.".to_string(),
        }]);

        let started = Instant::now();
        let err = fetcher(source.clone())
            .fetch_one(MarketType::Spot, "BTCUSDT", "1m", T0, 100)
            .await
            .unwrap_err();

        match err {
            SyncError::UpstreamFetchError { symbol, cause } => {
                assert_eq!(symbol, "BTCUSDT");
                assert!(matches!(*cause, SyncError::ApiError { code: -1121, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(source.calls().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_in_order() {
        let end = T0 + 25 * MINUTE;
        let source = Arc::new(ScriptedSource::new(MINUTE, 10).with_series("ETHUSDT", T0, end));
        let fetch_plan = planner::plan("ETHUSDT", MINUTE, 10, T0, T0, Some(end), 0);

        let started = Instant::now();
        let candles = fetcher(source.clone())
            .fetch_all(MarketType::Usdm, "1m", &fetch_plan)
            .await
            .unwrap();

        assert_eq!(candles.len(), 25);
        let starts: Vec<i64> = source.calls().iter().map(|c| c.1).collect();
        assert_eq!(starts, vec![T0, T0 + 10 * MINUTE, T0 + 20 * MINUTE]);
        // Courtesy delay between the three requests only
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_aborts_on_fatal_page() {
        let end = T0 + 25 * MINUTE;
        let source = Arc::new(ScriptedSource::new(MINUTE, 10).with_series("ETHUSDT", T0, end));
        let fetch_plan = planner::plan("ETHUSDT", MINUTE, 10, T0, T0, Some(end), 0);
        source.fail_next(vec![SyncError::Other("connection reset".to_string())]);

        let result = fetcher(source.clone()).fetch_all(MarketType::Usdm, "1m", &fetch_plan).await;

        assert!(matches!(result, Err(SyncError::UpstreamFetchError { .. })));
        assert_eq!(source.calls().len(), 1);
    }
}
