/// Core type definitions for the candle sync engine
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// One row as delivered by the source, before symbol and close time are attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Fixed-interval OHLCV candle, keyed by (symbol, open_time) within a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Attach symbol and derive close time; the source never supplies it
    pub fn from_raw(symbol: &str, raw: RawCandle, interval_ms: i64) -> Self {
        Candle {
            symbol: symbol.to_string(),
            open_time: raw.open_time,
            close_time: raw.open_time + interval_ms,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

/// Market type of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Usdm,
}

impl MarketType {
    pub fn as_str(&self) -> &str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Usdm => "usdm",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(MarketType::Spot),
            "usdm" | "futures" | "perp" => Ok(MarketType::Usdm),
            other => Err(SyncError::ConfigError(format!("Unknown market type: {}", other))),
        }
    }
}

/// Storage grouping by source and market type, at one fixed interval
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub source: String,
    pub market_type: MarketType,
    pub interval_label: String,
}

impl Partition {
    pub fn new(source: &str, market_type: MarketType, interval_label: &str) -> Self {
        Partition {
            source: source.to_string(),
            market_type,
            interval_label: interval_label.to_string(),
        }
    }

    /// Table name, restricted to [a-z0-9_] so it can be interpolated into DDL
    pub fn table_name(&self) -> String {
        let raw = format!(
            "candles_{}_{}_{}",
            self.source,
            self.market_type.as_str(),
            self.interval_label
        );
        raw.to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.market_type, self.interval_label)
    }
}

/// Configuration for the sync daemon
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub filters: FilterConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_sec: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            acquire_timeout_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub name: String,
    pub spot_base_url: String,
    pub futures_base_url: String,
    pub request_timeout_sec: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "binance".to_string(),
            spot_base_url: "https://api.binance.com".to_string(),
            futures_base_url: "https://fapi.binance.com".to_string(),
            request_timeout_sec: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_label: String,
    pub market_types: Vec<String>,

    // Pagination
    pub page_size_cap: usize,
    pub batch_size: usize,
    pub batch_size_overrides: HashMap<String, usize>,

    // Resume
    pub lookback_days: i64,
    pub skip_unclosed: bool,

    // Rate limiting
    pub inter_request_delay_ms: u64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_backoff_sec: u64,

    // Storage retry
    pub storage_max_attempts: u32,
    pub storage_retry_delay_ms: u64,

    // Trigger
    pub schedule_interval_sec: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_label: "1m".to_string(),
            market_types: vec!["spot".to_string()],
            page_size_cap: 1000,
            batch_size: 500,
            batch_size_overrides: HashMap::new(),
            lookback_days: 30,
            skip_unclosed: true,
            inter_request_delay_ms: 250,
            rate_limit_max_attempts: 3,
            rate_limit_backoff_sec: 60,
            storage_max_attempts: 3,
            storage_retry_delay_ms: 1000,
            schedule_interval_sec: 3600,
        }
    }
}

impl SyncConfig {
    /// Batch size for one partition, falling back to the global value
    pub fn batch_size_for(&self, market_type: MarketType) -> usize {
        self.batch_size_overrides
            .get(market_type.as_str())
            .copied()
            .unwrap_or(self.batch_size)
    }

    pub fn parsed_market_types(&self) -> Result<Vec<MarketType>, SyncError> {
        let mut parsed = Vec::with_capacity(self.market_types.len());
        for raw in &self.market_types {
            let market: MarketType = raw.parse()?;
            if !parsed.contains(&market) {
                parsed.push(market);
            }
        }
        Ok(parsed)
    }

    pub fn lookback_ms(&self) -> i64 {
        self.lookback_days * 24 * 60 * 60 * 1000
    }
}

/// Symbol universe filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include_symbols: Vec<String>,
    pub exclude_symbols: Vec<String>,
    pub quote_assets: Vec<String>,
}

impl FilterConfig {
    pub fn accepts(&self, symbol: &str) -> bool {
        let symbol = symbol.to_uppercase();

        if !self.quote_assets.is_empty()
            && !self.quote_assets.iter().any(|q| symbol.ends_with(&q.to_uppercase()))
        {
            return false;
        }

        if !self.include_symbols.is_empty()
            && !self.include_symbols.iter().any(|s| s.eq_ignore_ascii_case(&symbol))
        {
            return false;
        }

        !self.exclude_symbols.iter().any(|s| s.eq_ignore_ascii_case(&symbol))
    }

    /// Keep accepted symbols, preserving upstream order
    pub fn apply(&self, symbols: Vec<String>) -> Vec<String> {
        symbols.into_iter().filter(|s| self.accepts(s)).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub health_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
