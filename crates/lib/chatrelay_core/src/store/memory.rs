//! In-process transcript store.
//!
//! Used by tests and by development runs that have no database. Contents are
//! lost when the process exits.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{StoreError, TranscriptStore};
use crate::transcript::Transcript;

/// Transcript store backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct MemoryTranscriptStore {
    transcripts: DashMap<String, Transcript>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored transcript for `key` without initializing a missing one.
    pub fn get(&self, key: &str) -> Option<Transcript> {
        self.transcripts.get(key).map(|t| t.value().clone())
    }

    /// Number of conversations stored.
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn fetch(&self, key: &str, system_prompt: &str) -> Result<Transcript, StoreError> {
        Ok(self
            .get(key)
            .unwrap_or_else(|| Transcript::new(system_prompt)))
    }

    async fn save(&self, key: &str, transcript: &Transcript) -> Result<(), StoreError> {
        self.transcripts
            .insert(key.to_string(), transcript.clone());
        Ok(())
    }
}
