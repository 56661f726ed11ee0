//! Chat request handler.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chatrelay_core::relay::ExchangeRequest;
use tracing::{debug, error};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{ChatRequest, ChatResponse};

/// `POST /chat` — relay one visitor message and return the reply.
///
/// A body the JSON extractor rejects is answered with 400 in the same
/// `{error}` shape as every other failure.
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatResponse>> {
    let Json(body) = payload.map_err(|rejection| {
        debug!(status = %rejection.status(), "chat body rejected: {rejection}");
        AppError::Validation(rejection.body_text())
    })?;

    let request = ExchangeRequest {
        contact_id: body.contact_id,
        message: body.message.unwrap_or_default(),
        prompt_id: body.prompt_id,
    };
    debug!(
        contact_id = ?request.contact_id,
        message_len = request.message.len(),
        "chat request"
    );

    let timeout = state.config.exchange_timeout;
    let exchange = tokio::time::timeout(timeout, state.relay.exchange(request))
        .await
        .map_err(|_| {
            error!(timeout_secs = timeout.as_secs(), "chat exchange timed out");
            AppError::Timeout(timeout)
        })?
        .map_err(|e| {
            error!("chat exchange failed: {e}");
            AppError::from(e)
        })?;

    Ok(Json(ChatResponse {
        reply: exchange.reply,
    }))
}
