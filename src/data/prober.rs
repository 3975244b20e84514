/// Interval probe: one fetch to learn the real page size and native candle spacing
use tracing::debug;

use crate::data::fetcher::PagedFetcher;
use crate::error::{Result, SyncError};
use crate::types::MarketType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Rows the source actually returned for a maximal request
    pub page_size: usize,
    pub interval_ms: i64,
    pub first_two: [i64; 2],
}

impl ProbeResult {
    pub fn first_candle_time(&self) -> i64 {
        self.first_two[0]
    }
}

/// Issue exactly one fetch of `page_size_cap` rows starting at `start_time`.
/// Rate-limit signals get the fetcher's bounded retry; an empty or single-row
/// reply is fatal for the symbol.
pub async fn probe(
    fetcher: &PagedFetcher,
    market: MarketType,
    symbol: &str,
    interval_label: &str,
    start_time: i64,
    page_size_cap: usize,
) -> Result<ProbeResult> {
    let page = fetcher
        .fetch_one(market, symbol, interval_label, start_time, page_size_cap)
        .await?;

    let result = match page.as_slice() {
        [] => Err(SyncError::NoDataAvailable {
            symbol: symbol.to_string(),
        }),
        [_] => Err(SyncError::InsufficientData {
            symbol: symbol.to_string(),
        }),
        [first, second, ..] => {
            let interval_ms = second.open_time - first.open_time;
            if interval_ms <= 0 {
                Err(SyncError::InvalidCandle(format!(
                    "{}: non-increasing open times {} -> {}",
                    symbol, first.open_time, second.open_time
                )))
            } else {
                Ok(ProbeResult {
                    page_size: page.len(),
                    interval_ms,
                    first_two: [first.open_time, second.open_time],
                })
            }
        }
    };

    if let Ok(probe) = &result {
        debug!(
            "Probed {}: page_size={}, interval={}ms, first={}",
            symbol, probe.page_size, probe.interval_ms, probe.first_two[0]
        );
    }

    result
}
