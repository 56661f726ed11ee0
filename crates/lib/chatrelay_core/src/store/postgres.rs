//! PostgreSQL transcript store.
//!
//! One row per conversation in `chat_history`; the transcript lives in a
//! single JSONB column as an array of `{role, content}` objects.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

use super::{StoreError, TranscriptStore};
use crate::transcript::Transcript;

/// Transcript store backed by the `chat_history` table.
#[derive(Debug, Clone)]
pub struct PgTranscriptStore {
    pool: PgPool,
}

impl PgTranscriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranscriptStore for PgTranscriptStore {
    async fn fetch(&self, key: &str, system_prompt: &str) -> Result<Transcript, StoreError> {
        let stored = sqlx::query_scalar::<_, Json<Transcript>>(
            "SELECT messages FROM chat_history WHERE contact_id = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some(Json(transcript)) => Ok(transcript),
            None => {
                debug!(contact_id = key, "no stored transcript, starting new");
                Ok(Transcript::new(system_prompt))
            }
        }
    }

    async fn save(&self, key: &str, transcript: &Transcript) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_history (contact_id, messages)
            VALUES ($1, $2)
            ON CONFLICT (contact_id)
            DO UPDATE SET messages = EXCLUDED.messages, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(Json(transcript))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
