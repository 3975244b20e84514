/// Merge fetched pages into a clean series: dedup, sort, trim, count gaps
use std::collections::HashSet;

use crate::types::{Candle, RawCandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedSeries {
    pub candles: Vec<Candle>,
    /// Expected candles absent from the series; diagnostic only
    pub missing_candles: u64,
}

/// Keep the first occurrence of each open time. Pages arrive in increasing time order,
/// so on divergent overlaps the earliest fetched value wins.
pub fn dedup_by_open_time(candles: Vec<RawCandle>) -> Vec<RawCandle> {
    let mut seen = HashSet::with_capacity(candles.len());
    candles
        .into_iter()
        .filter(|c| seen.insert(c.open_time))
        .collect()
}

/// Sum of `floor(delta / interval) - 1` over adjacent pairs wider than one interval
pub fn count_missing(open_times: &[i64], interval_ms: i64) -> u64 {
    if interval_ms <= 0 {
        return 0;
    }

    open_times
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|delta| *delta > interval_ms)
        .map(|delta| (delta / interval_ms - 1) as u64)
        .sum()
}

pub fn merge_pages(
    symbol: &str,
    pages: Vec<RawCandle>,
    interval_ms: i64,
    total_needed: usize,
) -> MergedSeries {
    let mut unique = dedup_by_open_time(pages);
    unique.sort_by_key(|c| c.open_time);
    unique.truncate(total_needed);

    let open_times: Vec<i64> = unique.iter().map(|c| c.open_time).collect();
    let missing_candles = count_missing(&open_times, interval_ms);

    let candles = unique
        .into_iter()
        .map(|raw| Candle::from_raw(symbol, raw, interval_ms))
        .collect();

    MergedSeries {
        candles,
        missing_candles,
    }
}
