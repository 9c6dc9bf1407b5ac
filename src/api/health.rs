//! Liveness and readiness probes

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness plus a glance at the queues
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub database: bool,
    pub providers: usize,
    pub search_queue_busy: bool,
    pub search_queue_len: usize,
    pub show_queue_len: usize,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 503 until the database answers
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = sqlx::query("SELECT 1").fetch_one(state.db.pool()).await.is_ok();
    let search = state.search_queue.queue();

    let body = ReadyResponse {
        ready: database,
        database,
        providers: state.search_queue.search_context().providers.active_providers().len(),
        search_queue_busy: search.is_busy(),
        search_queue_len: search.len(),
        show_queue_len: state.show_queue.queue().len(),
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
