//! Application error types.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chatrelay_core::relay::RelayError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Completion API failure; carries the upstream diagnostic payload.
    #[error("Upstream error: {0}")]
    Upstream(serde_json::Value),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Exchange timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, serde_json::Value::String(m)),
            AppError::Upstream(details) => (StatusCode::INTERNAL_SERVER_ERROR, details),
            AppError::Storage(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, serde_json::Value::String(m))
            }
            AppError::Timeout(d) => (
                StatusCode::GATEWAY_TIMEOUT,
                serde_json::Value::String(format!("exchange timed out after {}s", d.as_secs())),
            ),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::MissingConversationKey | RelayError::InvalidConversationKey(_) => {
                AppError::Validation(e.to_string())
            }
            RelayError::Store(_) => AppError::Storage(e.to_string()),
            RelayError::Generation(e) => AppError::Upstream(e.details()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::generation::GenerationError;
    use chatrelay_core::store::StoreError;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse JSON")
    }

    #[tokio::test]
    async fn missing_key_maps_to_bad_request() {
        let resp = AppError::from(RelayError::MissingConversationKey).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "contact_id is required"})
        );
    }

    #[tokio::test]
    async fn upstream_payload_is_passed_through() {
        let upstream = serde_json::json!({"error": {"message": "quota exceeded", "code": "insufficient_quota"}});
        let err = RelayError::Generation(GenerationError::Api {
            status: 429,
            body: upstream.clone(),
        });
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await, serde_json::json!({ "error": upstream }));
    }

    #[tokio::test]
    async fn storage_failure_is_server_error_with_message() {
        let err = RelayError::Store(StoreError::Db(sqlx::Error::PoolTimedOut));
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Storage error:"));
    }

    #[tokio::test]
    async fn timeout_maps_to_gateway_timeout() {
        let resp = AppError::Timeout(Duration::from_secs(60)).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"error": "exchange timed out after 60s"})
        );
    }
}
