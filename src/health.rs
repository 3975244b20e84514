/// Liveness endpoint: `GET /health`
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;
use crate::scheduler::{HealthSnapshot, SyncScheduler};

pub fn router(scheduler: Arc<SyncScheduler>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(scheduler)
}

/// Always 200 while the process serves requests; degradation is reported in the body
async fn health_check(State(scheduler): State<Arc<SyncScheduler>>) -> Json<HealthSnapshot> {
    Json(scheduler.health().await)
}

pub async fn serve(addr: &str, scheduler: Arc<SyncScheduler>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("🩺 Health endpoint listening on {}", addr);
    axum::serve(listener, router(scheduler)).await?;
    Ok(())
}
