//! # chatrelay_api
//!
//! HTTP API library for the chat relay.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chatrelay_core::relay::Relay;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{chat, health};

/// Route paths.
pub mod routes {
    pub const POST_CHAT: &str = "/chat";
    pub const GET_HEALTH: &str = "/health";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation relay with its collaborators wired in.
    pub relay: Arc<Relay>,
    /// PostgreSQL connection pool, absent when running without a database.
    pub pool: Option<PgPool>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
///
/// Delegates to `chatrelay_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    chatrelay_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Chat widgets call in from arbitrary site origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(routes::POST_CHAT, post(chat::chat_handler))
        .route(routes::GET_HEALTH, get(health::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
