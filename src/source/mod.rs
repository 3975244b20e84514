pub mod binance;

pub use binance::BinanceClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MarketType, RawCandle};

/// Paginated upstream candle capability
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Source name, used as the first half of the partition key
    fn name(&self) -> &str;

    /// Fetch up to `max_count` candles starting at `start_time`, ascending by open time
    async fn fetch_page(
        &self,
        market: MarketType,
        symbol: &str,
        interval_label: &str,
        start_time: i64,
        max_count: usize,
    ) -> Result<Vec<RawCandle>>;

    /// Tradeable symbols for one market, in upstream order
    async fn list_symbols(&self, market: MarketType) -> Result<Vec<String>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::SyncError;
    use rust_decimal::Decimal;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Deterministic minute-candle source with scripted failures
    pub struct ScriptedSource {
        pub interval_ms: i64,
        /// Per-symbol listing window [first, end) and a cap the source enforces per page
        series: HashMap<String, (i64, i64)>,
        pub page_cap: usize,
        /// Open times that the source skips, to simulate exchange outages
        holes: Vec<i64>,
        /// Pages served verbatim for a symbol, ignoring the series window
        fixed_pages: HashMap<String, Vec<RawCandle>>,
        failures: Mutex<VecDeque<SyncError>>,
        listing_failures: Mutex<HashMap<MarketType, SyncError>>,
        calls: Mutex<Vec<(String, i64, usize)>>,
    }

    impl ScriptedSource {
        pub fn new(interval_ms: i64, page_cap: usize) -> Self {
            ScriptedSource {
                interval_ms,
                series: HashMap::new(),
                page_cap,
                holes: Vec::new(),
                fixed_pages: HashMap::new(),
                failures: Mutex::new(VecDeque::new()),
                listing_failures: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_series(mut self, symbol: &str, first: i64, end: i64) -> Self {
            self.series.insert(symbol.to_string(), (first, end));
            self
        }

        pub fn with_holes(mut self, holes: Vec<i64>) -> Self {
            self.holes = holes;
            self
        }

        pub fn with_page(mut self, symbol: &str, page: Vec<RawCandle>) -> Self {
            self.fixed_pages.insert(symbol.to_string(), page);
            self
        }

        /// Next listing of `market` returns `error`
        pub fn fail_listing(&self, market: MarketType, error: SyncError) {
            self.listing_failures.lock().unwrap().insert(market, error);
        }

        /// Queue errors returned by the next calls, in order
        pub fn fail_next(&self, errors: Vec<SyncError>) {
            self.failures.lock().unwrap().extend(errors);
        }

        pub fn calls(&self) -> Vec<(String, i64, usize)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn candle_at(open_time: i64) -> RawCandle {
            let base = Decimal::new(open_time / 60_000, 0);
            RawCandle {
                open_time,
                open: base,
                high: base + Decimal::new(5, 1),
                low: base - Decimal::new(5, 1),
                close: base + Decimal::new(1, 2),
                volume: Decimal::new(12345, 3),
            }
        }
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_page(
            &self,
            _market: MarketType,
            symbol: &str,
            _interval_label: &str,
            start_time: i64,
            max_count: usize,
        ) -> Result<Vec<RawCandle>> {
            self.calls.lock().unwrap().push((symbol.to_string(), start_time, max_count));

            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            if let Some(page) = self.fixed_pages.get(symbol) {
                return Ok(page.iter().take(max_count).cloned().collect());
            }

            let Some(&(first, end)) = self.series.get(symbol) else {
                return Ok(Vec::new());
            };

            let limit = max_count.min(self.page_cap);
            // Align up to the interval grid, never before the listing
            let mut t = start_time.max(first);
            let offset = (t - first).rem_euclid(self.interval_ms);
            if offset != 0 {
                t += self.interval_ms - offset;
            }

            let mut page = Vec::with_capacity(limit);
            while t < end && page.len() < limit {
                if !self.holes.contains(&t) {
                    page.push(Self::candle_at(t));
                }
                t += self.interval_ms;
            }
            Ok(page)
        }

        async fn list_symbols(&self, market: MarketType) -> Result<Vec<String>> {
            if let Some(err) = self.listing_failures.lock().unwrap().remove(&market) {
                return Err(err);
            }
            let mut symbols: Vec<String> = self.series.keys().cloned().collect();
            symbols.sort();
            Ok(symbols)
        }
    }
}
