/// Backfill-and-reconcile engine
/// Runs resume → probe → plan → fetch → merge → write for every symbol of every partition
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::data::fetcher::PagedFetcher;
use crate::data::merge::merge_pages;
use crate::data::writer::BatchWriter;
use crate::data::{planner, prober, resume};
use crate::error::{Result, SyncError};
use crate::source::CandleSource;
use crate::storage::CandleStore;
use crate::types::{Config, MarketType, Partition};
use crate::utils::{format_ms, interval_label_to_ms, now_ms};

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub market_type: MarketType,
    pub start_time: i64,
    pub up_to_date: bool,
    pub pages_fetched: usize,
    pub candles_fetched: usize,
    pub candles_stored: u64,
    pub unclosed_dropped: usize,
    pub missing_candles: u64,
    pub failed_batches: Vec<usize>,
}

impl SymbolReport {
    fn new(symbol: &str, market_type: MarketType, start_time: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            market_type,
            start_time,
            up_to_date: false,
            pages_fetched: 0,
            candles_fetched: 0,
            candles_stored: 0,
            unclosed_dropped: 0,
            missing_candles: 0,
            failed_batches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub symbols_total: usize,
    pub symbols_synced: usize,
    pub symbols_up_to_date: usize,
    pub symbols_failed: usize,
    pub candles_stored: u64,
    pub missing_candles: u64,
    pub failed_batches: usize,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
    /// Set when the cycle ended before syncing anything (storage unreachable)
    pub aborted: Option<String>,
}

impl CycleReport {
    pub fn new(cycle_id: &str) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            started_at: Utc::now(),
            symbols_total: 0,
            symbols_synced: 0,
            symbols_up_to_date: 0,
            symbols_failed: 0,
            candles_stored: 0,
            missing_candles: 0,
            failed_batches: 0,
            elapsed_ms: 0,
            errors: Vec::new(),
            aborted: None,
        }
    }

    pub fn record(&mut self, report: &SymbolReport) {
        self.symbols_total += 1;
        if report.up_to_date {
            self.symbols_up_to_date += 1;
        } else {
            self.symbols_synced += 1;
        }
        self.candles_stored += report.candles_stored;
        self.missing_candles += report.missing_candles;
        self.failed_batches += report.failed_batches.len();
    }

    pub fn record_failure(&mut self, symbol: &str, error: &SyncError) {
        self.symbols_total += 1;
        self.symbols_failed += 1;
        self.errors.push(format!("{}: {}", symbol, error));
    }

    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.symbols_failed == 0 && self.failed_batches == 0
    }

    pub fn log_summary(&self) {
        if let Some(reason) = &self.aborted {
            error!("❌ Cycle {} aborted: {}", self.cycle_id, reason);
            return;
        }

        info!("✅ Cycle {} finished in {:.1}s", self.cycle_id, self.elapsed_ms as f64 / 1000.0);
        info!("   Symbols: {} total, {} synced, {} up to date, {} failed",
              self.symbols_total, self.symbols_synced, self.symbols_up_to_date, self.symbols_failed);
        info!("   Candles stored: {}", self.candles_stored);
        if self.missing_candles > 0 {
            warn!("   Missing candles (source gaps): {}", self.missing_candles);
        }
        if self.failed_batches > 0 {
            warn!("   Skipped batches: {}", self.failed_batches);
        }
        for err in &self.errors {
            warn!("   - {}", err);
        }
    }
}

pub struct BackfillEngine {
    source: Arc<dyn CandleSource>,
    store: Arc<dyn CandleStore>,
    config: Arc<Config>,
    fetcher: PagedFetcher,
    interval_ms: i64,
    clock: fn() -> i64,
}

impl BackfillEngine {
    pub fn new(
        source: Arc<dyn CandleSource>,
        store: Arc<dyn CandleStore>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let interval_ms = interval_label_to_ms(&config.sync.interval_label)?;
        let fetcher = PagedFetcher::from_config(source.clone(), &config.sync);

        Ok(Self {
            source,
            store,
            config,
            fetcher,
            interval_ms,
            clock: now_ms,
        })
    }

    /// Replace the wall clock, for deterministic runs
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn partition(&self, market_type: MarketType) -> Partition {
        Partition::new(self.source.name(), market_type, &self.config.sync.interval_label)
    }

    fn writer_for(&self, market_type: MarketType) -> BatchWriter {
        BatchWriter::new(
            self.store.clone(),
            self.config.sync.batch_size_for(market_type),
            self.config.sync.storage_max_attempts,
            Duration::from_millis(self.config.sync.storage_retry_delay_ms),
        )
    }

    /// Backfill one symbol from `start_time` to `end_time` (or now)
    pub async fn sync_symbol(
        &self,
        market_type: MarketType,
        symbol: &str,
        start_time: i64,
        end_time: Option<i64>,
    ) -> Result<SymbolReport> {
        let sync = &self.config.sync;
        let mut report = SymbolReport::new(symbol, market_type, start_time);

        let probe = match prober::probe(
            &self.fetcher,
            market_type,
            symbol,
            &sync.interval_label,
            start_time,
            sync.page_size_cap,
        )
        .await
        {
            Ok(probe) => probe,
            // Nothing (or only the forming candle) after a recent cursor
            Err(SyncError::NoDataAvailable { .. } | SyncError::InsufficientData { .. })
                if end_time.is_none() && (self.clock)() - start_time < 2 * self.interval_ms =>
            {
                report.up_to_date = true;
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        // The partition fixes the spacing; a wider first step is a gap, not a new interval
        let interval_ms = self.interval_ms;
        if probe.interval_ms != interval_ms {
            warn!(
                "⚠️  {} reports {}ms spacing, using configured interval {}ms",
                symbol, probe.interval_ms, interval_ms
            );
        }

        let now = (self.clock)();
        let plan = planner::plan(
            symbol,
            interval_ms,
            probe.page_size,
            probe.first_candle_time(),
            start_time,
            end_time,
            now,
        );

        if plan.is_up_to_date() {
            report.up_to_date = true;
            return Ok(report);
        }

        info!(
            "📥 {} {}: {} candles from {} in {} pages",
            market_type,
            symbol,
            plan.total_needed,
            format_ms(plan.requests[0].start_time),
            plan.num_pages()
        );

        let pages = self.fetcher.fetch_all(market_type, &sync.interval_label, &plan).await?;
        report.pages_fetched = plan.num_pages();
        report.candles_fetched = pages.len();

        let mut merged = merge_pages(symbol, pages, interval_ms, plan.total_needed);
        merged.candles.retain(|c| c.open_time < plan.target_end);
        report.missing_candles = merged.missing_candles;
        if merged.missing_candles > 0 {
            warn!("⚠️  {} has {} missing candles in the fetched range", symbol, merged.missing_candles);
        }

        if sync.skip_unclosed {
            let before = merged.candles.len();
            merged.candles.retain(|c| c.close_time <= now);
            report.unclosed_dropped = before - merged.candles.len();
        }

        if merged.candles.is_empty() {
            report.up_to_date = true;
            return Ok(report);
        }

        let written = self
            .writer_for(market_type)
            .write(&self.partition(market_type), symbol, &merged.candles)
            .await?;

        report.candles_stored = written.rows_written;
        report.failed_batches = written.failed_batches;

        info!(
            "✅ {} {}: stored {} candles (through {})",
            market_type,
            symbol,
            report.candles_stored,
            merged.candles.last().map(|c| format_ms(c.close_time)).unwrap_or_default()
        );

        Ok(report)
    }

    /// Sync every accepted symbol of one partition, isolating per-symbol failures
    pub async fn sync_partition(&self, market_type: MarketType, cycle: &mut CycleReport) -> Result<()> {
        let partition = self.partition(market_type);

        let listed = self.source.list_symbols(market_type).await?;
        let symbols = self.config.filters.apply(listed);
        info!("🎯 {}: {} symbols to sync", partition, symbols.len());

        let starts = resume::resolve(
            self.store.as_ref(),
            &partition,
            &symbols,
            self.config.sync.lookback_ms(),
            (self.clock)(),
        )
        .await;

        let delay = Duration::from_millis(self.config.sync.inter_request_delay_ms);

        for (idx, (symbol, start_time)) in starts.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.sync_symbol(market_type, symbol, *start_time, None).await {
                Ok(report) => cycle.record(&report),
                Err(e) => {
                    error!("❌ [{}/{}] {} failed [{}]: {}", idx + 1, symbols.len(), symbol, e.error_code(), e);
                    cycle.record_failure(symbol, &e);
                }
            }
        }

        Ok(())
    }

    /// One full cycle over all configured market types
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        let span = info_span!("cycle", id = %cycle_id);

        async {
            let started = Instant::now();
            let mut report = CycleReport::new(&cycle_id);
            info!("🔄 Starting sync cycle");

            if let Err(e) = self.store.health_check().await {
                error!("❌ Storage unavailable [{}]: {}", e.error_code(), e);
                report.aborted = Some(e.to_string());
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                return report;
            }

            let markets = match self.config.sync.parsed_market_types() {
                Ok(markets) => markets,
                Err(e) => {
                    report.aborted = Some(e.to_string());
                    return report;
                }
            };

            for market_type in markets {
                if let Err(e) = self.sync_partition(market_type, &mut report).await {
                    error!("❌ Partition {} skipped [{}]: {}", market_type, e.error_code(), e);
                    report.errors.push(format!("{}: {}", market_type, e));
                }
            }

            report.elapsed_ms = started.elapsed().as_millis() as u64;
            report
        }
        .instrument(span)
        .await
    }
}
