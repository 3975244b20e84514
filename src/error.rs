/// Centralized error types for the candle sync engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    // Series Errors (fatal for one symbol, never retried)
    #[error("No data available for {symbol}")]
    NoDataAvailable { symbol: String },

    #[error("Insufficient data for {symbol}: a single candle cannot reveal the interval")]
    InsufficientData { symbol: String },

    #[error("Invalid candle data: {0}")]
    InvalidCandle(String),

    // Upstream Errors
    #[error("Rate limit exhausted for {symbol} after {attempts} attempts")]
    RateLimitExhausted { symbol: String, attempts: u32 },

    #[error("Upstream fetch failed for {symbol}: {cause}")]
    UpstreamFetchError {
        symbol: String,
        #[source]
        cause: Box<SyncError>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Source API error: {code} - {message}")]
    ApiError { code: i64, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    // Storage Errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Batch {batch_index} for {symbol} not persisted after {attempts} attempts: {reason}")]
    BatchPersistFailure {
        symbol: String,
        batch_index: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Resume cursor lookup failed for {partition}: {reason}")]
    PartitionLookupFailure { partition: String, reason: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // File I/O Errors
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Check if the error carries a rate-limiting indicator from the source
    pub fn is_rate_limited(&self) -> bool {
        match self {
            SyncError::RateLimited(_) => true,
            // 429 Too Many Requests, 418 IP ban after ignoring 429s, -1003 Binance request weight
            SyncError::ApiError { code, message } => {
                matches!(code, 429 | 418 | -1003) || mentions_rate_limit(message)
            }
            SyncError::HttpError(e) => e
                .status()
                .map(|s| s.as_u16() == 429 || s.as_u16() == 418)
                .unwrap_or(false),
            SyncError::Other(message) => mentions_rate_limit(message),
            _ => false,
        }
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            SyncError::NoDataAvailable { .. } => "SERIES_001",
            SyncError::InsufficientData { .. } => "SERIES_002",
            SyncError::InvalidCandle(_) => "SERIES_003",
            SyncError::RateLimitExhausted { .. } => "UP_001",
            SyncError::UpstreamFetchError { .. } => "UP_002",
            SyncError::RateLimited(_) => "UP_003",
            SyncError::ApiError { .. } => "UP_004",
            SyncError::HttpError(_) => "NET_001",
            SyncError::DeserializationError(_) => "DATA_001",
            SyncError::DatabaseError(_) => "DB_001",
            SyncError::BatchPersistFailure { .. } => "DB_002",
            SyncError::PartitionLookupFailure { .. } => "DB_003",
            SyncError::StorageError(_) => "DB_004",
            SyncError::ConfigError(_) => "CFG_001",
            SyncError::FileError(_) => "FILE_001",
            SyncError::Other(_) => "GEN_001",
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}
