//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::websocket::state::WebSocketStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub queue: &'static str,
    pub websocket: WebSocketStats,
}

fn label(healthy: bool) -> &'static str {
    if healthy {
        "healthy"
    } else {
        "unhealthy"
    }
}

async fn database_ok(state: &AppState) -> bool {
    sqlx::query("SELECT 1").execute(&state.pool).await.is_ok()
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_ok(&state).await;
    let queue = match state.queue.pending_count().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: job queue unreachable");
            false
        }
    };

    // The queue only carries notifications; calls keep working without it
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: match (database, queue) {
                (true, true) => "healthy",
                (true, false) => "degraded",
                _ => "unhealthy",
            },
            version: env!("CARGO_PKG_VERSION"),
            database: label(database),
            queue: label(queue),
            websocket: state.ws_state.get_stats().await,
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (checks if the service is ready to accept traffic)
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if database_ok(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
