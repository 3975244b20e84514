/// Candle sync daemon: one cycle at start, then one per schedule tick
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use candlesync::{
    config::load_config,
    data::BackfillEngine,
    error::Result,
    health,
    scheduler::SyncScheduler,
    source::BinanceClient,
    storage::PostgresCandleStore,
    utils::init_logging,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("CANDLESYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = Arc::new(load_config(&config_path)?);
    init_logging(&config.logging);

    info!("🚀 Candle sync daemon starting");
    info!("   Config: {}", config_path);
    info!("   Markets: {:?}, interval: {}", config.sync.market_types, config.sync.interval_label);

    let store = Arc::new(PostgresCandleStore::connect_lazy(&config.database)?);
    let source = Arc::new(BinanceClient::new(&config.source)?);

    let engine = BackfillEngine::new(source, store.clone(), config.clone())?;
    let scheduler = Arc::new(SyncScheduler::new(Arc::new(engine)));

    let health_addr = config.server.health_addr.clone();
    let health_scheduler = scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(&health_addr, health_scheduler).await {
            error!("❌ Health endpoint stopped: {}", e);
        }
    });

    // First tick completes immediately, so the initial cycle runs at start
    let mut interval = tokio::time::interval(Duration::from_secs(config.sync.schedule_interval_sec));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received - shutting down");
                break;
            }
            _ = interval.tick() => {
                // Spawned so a long cycle never blocks the next trigger or shutdown
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    scheduler.trigger().await;
                });
            }
        }
    }

    store.close().await;
    info!("✅ Candle sync daemon stopped");

    Ok(())
}
