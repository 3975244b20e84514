/// Cycle trigger with a single-flight guard and liveness state
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::data::{BackfillEngine, CycleReport};

/// Clears the running flag when the cycle ends, even on panic
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub cycle_running: bool,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}

pub struct SyncScheduler {
    engine: Arc<BackfillEngine>,
    running: AtomicBool,
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<BackfillEngine>) -> Self {
        Self {
            engine,
            running: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle unless one is already in progress.
    /// Returns None when the trigger was ignored.
    pub async fn trigger(&self) -> Option<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            warn!("⏭️  Sync cycle already running, trigger ignored");
            return None;
        }
        let _guard = CycleGuard(&self.running);

        let report = self.engine.run_cycle().await;
        report.log_summary();

        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_report.write().await = Some(report.clone());

        Some(report)
    }

    pub async fn health(&self) -> HealthSnapshot {
        let last_cycle = self.last_report.read().await.clone();
        let status = match &last_cycle {
            Some(report) if report.aborted.is_some() => "degraded",
            Some(report) if report.symbols_total > 0 && report.symbols_failed == report.symbols_total => "degraded",
            _ => "healthy",
        };

        HealthSnapshot {
            status: status.to_string(),
            timestamp: Utc::now(),
            cycle_running: self.is_running(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            last_cycle,
        }
    }
}
