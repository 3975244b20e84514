/// Range planning: how many candles a run needs and which pages fetch them
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub index: usize,
    pub start_time: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchPlan {
    pub symbol: String,
    pub interval_ms: i64,
    pub start_time: i64,
    /// None means "up to now", resolved into `target_end` at plan time
    pub end_time: Option<i64>,
    pub target_end: i64,
    pub page_size: usize,
    pub total_needed: usize,
    pub requests: Vec<PageRequest>,
}

impl FetchPlan {
    pub fn num_pages(&self) -> usize {
        self.requests.len()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.requests.is_empty()
    }
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

/// Compute the fetch plan for one symbol.
///
/// `total_needed` counts candles from `first_candle_time` to the target end; requests
/// start at `max(start_time, first_candle_time)` and step by one full page.
pub fn plan(
    symbol: &str,
    interval_ms: i64,
    page_size: usize,
    first_candle_time: i64,
    start_time: i64,
    end_time: Option<i64>,
    now_ms: i64,
) -> FetchPlan {
    let interval_ms = interval_ms.max(1);
    let page_size = page_size.max(1);
    let target_end = end_time.unwrap_or(now_ms);

    let span = target_end - first_candle_time;
    let total_needed = if span > 0 { ceil_div(span, interval_ms) } else { 0 };
    let num_pages = ceil_div(total_needed, page_size as i64);

    let anchor = start_time.max(first_candle_time);
    let page_span = page_size as i64 * interval_ms;

    let requests = (0..num_pages as usize)
        .map(|index| PageRequest {
            index,
            start_time: anchor + index as i64 * page_span,
            limit: page_size,
        })
        .collect();

    FetchPlan {
        symbol: symbol.to_string(),
        interval_ms,
        start_time,
        end_time,
        target_end,
        page_size,
        total_needed: total_needed as usize,
        requests,
    }
}
