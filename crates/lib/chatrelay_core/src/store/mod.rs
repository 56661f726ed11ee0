//! Transcript persistence keyed by conversation identifier.
//!
//! The store is a plain get/put abstraction: `fetch` returns the stored
//! transcript (or a fresh one holding only the system turn) and `save`
//! replaces whatever was stored under the key. There is no merge, the last
//! write wins.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::transcript::Transcript;

pub use memory::MemoryTranscriptStore;
pub use postgres::PgTranscriptStore;

/// Errors raised by transcript storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Backing store for conversation transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Load the transcript for `key`, or start a new one containing only a
    /// system turn with `system_prompt` when nothing is stored yet.
    async fn fetch(&self, key: &str, system_prompt: &str) -> Result<Transcript, StoreError>;

    /// Upsert the full transcript under `key`.
    async fn save(&self, key: &str, transcript: &Transcript) -> Result<(), StoreError>;
}
