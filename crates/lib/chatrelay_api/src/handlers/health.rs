//! Health endpoint.

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /health` — reports version, conversation mode and DB connectivity.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("database health check failed: {e}");
                false
            }
        },
        None => false,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: chatrelay_core::version().to_string(),
        mode: state.relay.mode().as_str().to_string(),
        db_connected,
    })
}
