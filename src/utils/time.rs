/// Time utilities for epoch-millisecond candle timestamps
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, SyncError};

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert an interval label ("1m", "15m", "1h", "1d", "1w") to milliseconds
pub fn interval_label_to_ms(label: &str) -> Result<i64> {
    let label = label.trim();
    let invalid = || SyncError::ConfigError(format!("Invalid interval label: {:?}", label));

    let split = label.char_indices().last().map(|(i, _)| i).ok_or_else(invalid)?;
    let (count, unit) = label.split_at(split);
    let count: i64 = count.parse().map_err(|_| invalid())?;
    if count <= 0 {
        return Err(invalid());
    }

    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(SyncError::ConfigError(format!("Unknown interval unit in {:?}", label))),
    };

    Ok(count * unit_ms)
}

/// Render epoch milliseconds for logs
pub fn format_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{}ms", ms),
    }
}

/// Parse either epoch milliseconds or an RFC 3339 timestamp
pub fn parse_time_arg(raw: &str) -> Result<i64> {
    if let Ok(ms) = raw.trim().parse::<i64>() {
        return Ok(ms);
    }

    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| SyncError::ConfigError(format!("Invalid timestamp {:?}: {}", raw, e)))
}
