/// Backfill one symbol over an explicit time range
/// Usage: cargo run --bin backfill_range -- --symbol BTCUSDT --start 2024-01-01T00:00:00Z
use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use candlesync::{
    config::{read_config, validate_config, validate_sync_config},
    data::BackfillEngine,
    storage::{CandleStore, MemoryCandleStore, PostgresCandleStore},
    source::BinanceClient,
    utils::{format_ms, init_logging, now_ms, parse_time_arg},
    MarketType,
};

#[derive(Parser)]
#[command(name = "backfill_range")]
#[command(about = "Backfill one symbol between two timestamps", long_about = None)]
struct Cli {
    /// Instrument, e.g. BTCUSDT
    #[arg(long)]
    symbol: String,

    /// spot or usdm
    #[arg(long, default_value = "spot")]
    market: String,

    /// Range start, RFC 3339 or epoch milliseconds
    #[arg(long)]
    start: String,

    /// Range end (exclusive), defaults to now
    #[arg(long)]
    end: Option<String>,

    /// Keep candles in memory instead of writing to Postgres
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "CANDLESYNC_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = read_config(&cli.config).with_context(|| format!("loading {}", cli.config))?;
    if cli.dry_run {
        validate_sync_config(&config.sync)?;
    } else {
        validate_config(&config)?;
    }
    init_logging(&config.logging);

    let market: MarketType = cli.market.parse()?;
    let start = parse_time_arg(&cli.start)?;
    let end = cli.end.as_deref().map(parse_time_arg).transpose()?;

    if let Some(end) = end {
        if end <= start {
            bail!("--end must be after --start");
        }
    }

    info!("🚀 Range backfill: {} {}", market, cli.symbol);
    info!("   From: {}", format_ms(start));
    info!("   To:   {}", end.map(format_ms).unwrap_or_else(|| "now".to_string()));

    let source = Arc::new(BinanceClient::new(&config.source)?);
    let postgres = if cli.dry_run {
        warn!("🧪 Dry run: candles stay in memory");
        None
    } else {
        Some(Arc::new(PostgresCandleStore::connect_lazy(&config.database)?))
    };
    let store: Arc<dyn CandleStore> = match &postgres {
        Some(pg) => pg.clone(),
        None => Arc::new(MemoryCandleStore::new()),
    };

    store.health_check().await.context("storage health check")?;

    let engine = BackfillEngine::new(source, store, Arc::new(config))?;
    let started = now_ms();

    match engine.sync_symbol(market, &cli.symbol.to_uppercase(), start, end).await {
        Ok(report) => {
            info!("✅ Backfill finished in {:.1}s", (now_ms() - started) as f64 / 1000.0);
            info!("   Pages fetched: {}", report.pages_fetched);
            info!("   Candles fetched: {}", report.candles_fetched);
            info!("   Candles stored: {}", report.candles_stored);
            if report.missing_candles > 0 {
                warn!("   Missing candles: {}", report.missing_candles);
            }
            if !report.failed_batches.is_empty() {
                warn!("   Skipped batches: {:?}", report.failed_batches);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Err(e) => {
            error!("❌ Backfill failed [{}]: {}", e.error_code(), e);
            return Err(e.into());
        }
    }

    if let Some(pg) = postgres {
        pg.close().await;
    }

    Ok(())
}
