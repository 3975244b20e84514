/// Binance REST kline client (spot and USD-margined futures)
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::source::CandleSource;
use crate::types::{MarketType, RawCandle, SourceConfig};

const SPOT_MAX_LIMIT: usize = 1000;
const FUTURES_MAX_LIMIT: usize = 1500;

/// Kline row: [open time, open, high, low, close, volume, close time, quote volume,
/// trades, taker base volume, taker quote volume, ignore]
#[derive(Debug, Deserialize)]
struct BinanceKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeSymbol {
    symbol: String,
    status: String,
    #[serde(default)]
    contract_type: Option<String>,
}

/// Binance public market-data client
pub struct BinanceClient {
    client: Client,
    name: String,
    spot_base_url: String,
    futures_base_url: String,
}

impl BinanceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()?;

        Ok(BinanceClient {
            client,
            name: config.name.clone(),
            spot_base_url: config.spot_base_url.trim_end_matches('/').to_string(),
            futures_base_url: config.futures_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn klines_url(&self, market: MarketType) -> String {
        match market {
            MarketType::Spot => format!("{}/api/v3/klines", self.spot_base_url),
            MarketType::Usdm => format!("{}/fapi/v1/klines", self.futures_base_url),
        }
    }

    fn exchange_info_url(&self, market: MarketType) -> String {
        match market {
            MarketType::Spot => format!("{}/api/v3/exchangeInfo", self.spot_base_url),
            MarketType::Usdm => format!("{}/fapi/v1/exchangeInfo", self.futures_base_url),
        }
    }

    fn max_limit(market: MarketType) -> usize {
        match market {
            MarketType::Spot => SPOT_MAX_LIMIT,
            MarketType::Usdm => FUTURES_MAX_LIMIT,
        }
    }

    async fn public_get(&self, url: &str, params: &[(&str, String)]) -> Result<String> {
        debug!("GET {} {:?}", url, params);

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(map_error(status, &body))
        }
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &self,
        market: MarketType,
        symbol: &str,
        interval_label: &str,
        start_time: i64,
        max_count: usize,
    ) -> Result<Vec<RawCandle>> {
        // Oversized requests are clamped; the caller learns the real page size from the reply
        let limit = max_count.clamp(1, Self::max_limit(market));

        let body = self
            .public_get(
                &self.klines_url(market),
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", interval_label.to_string()),
                    ("startTime", start_time.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let candles = parse_klines(&body)?;
        debug!("Fetched {} {} candles for {} from {}", candles.len(), interval_label, symbol, start_time);
        Ok(candles)
    }

    async fn list_symbols(&self, market: MarketType) -> Result<Vec<String>> {
        let body = self.public_get(&self.exchange_info_url(market), &[]).await?;
        parse_exchange_info(&body, market)
    }
}

/// Map a non-2xx reply to a SyncError, keeping the rate-limit signal distinguishable
fn map_error(status: StatusCode, body: &str) -> SyncError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return SyncError::RateLimited(format!("HTTP {}: {}", status.as_u16(), body));
    }

    match serde_json::from_str::<BinanceError>(body) {
        Ok(error) if error.code == -1003 => SyncError::RateLimited(error.msg),
        Ok(error) => SyncError::ApiError {
            code: error.code,
            message: error.msg,
        },
        Err(_) => SyncError::ApiError {
            code: status.as_u16() as i64,
            message: body.to_string(),
        },
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| SyncError::InvalidCandle(format!("{} {:?}: {}", field, raw, e)))
}

fn parse_klines(body: &str) -> Result<Vec<RawCandle>> {
    let rows: Vec<BinanceKline> = serde_json::from_str(body)?;

    rows.into_iter()
        .map(|k| {
            Ok(RawCandle {
                open_time: k.0,
                open: parse_decimal(&k.1, "open")?,
                high: parse_decimal(&k.2, "high")?,
                low: parse_decimal(&k.3, "low")?,
                close: parse_decimal(&k.4, "close")?,
                volume: parse_decimal(&k.5, "volume")?,
            })
        })
        .collect()
}

fn parse_exchange_info(body: &str, market: MarketType) -> Result<Vec<String>> {
    let info: ExchangeInfo = serde_json::from_str(body)?;

    Ok(info
        .symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .filter(|s| match market {
            MarketType::Spot => true,
            MarketType::Usdm => s.contract_type.as_deref().map_or(true, |c| c == "PERPETUAL"),
        })
        .map(|s| s.symbol)
        .collect())
}
