use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: DatabaseHealth,
    /// Seconds since startup.
    pub uptime: u64,
    pub version: &'static str,
    pub environment: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness plus a datastore round-trip; 503 when the datastore is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = match state.users.ping().await {
        Ok(()) => true,
        Err(e) => {
            error!(error = ?e, "database health probe failed");
            false
        }
    };

    let body = HealthResponse {
        status: if db_ok { "OK" } else { "WARNING" },
        database: DatabaseHealth {
            status: if db_ok { "connected" } else { "disconnected" },
        },
        uptime: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}
