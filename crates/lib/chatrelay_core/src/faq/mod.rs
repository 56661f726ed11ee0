//! FAQ short-circuit lookup.
//!
//! Before a message reaches the completion API, it is checked against a table
//! of canned answers. An entry matches when its keyword appears anywhere in
//! the message, ignoring case. Entries are tried in ascending `id` order and
//! the first match wins.

pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub use postgres::PgFaqSource;

/// One row of the business info table.
///
/// `keyword` and `answer` are nullable in storage; entries missing either are
/// skipped during lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FaqEntry {
    pub id: i64,
    pub keyword: Option<String>,
    pub answer: Option<String>,
}

impl FaqEntry {
    pub fn new(id: i64, keyword: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            keyword: Some(keyword.into()),
            answer: Some(answer.into()),
        }
    }

    /// Answer for `lowered_text` if this entry's keyword occurs in it.
    fn answer_for(&self, lowered_text: &str) -> Option<&str> {
        let keyword = self.keyword.as_deref()?.trim();
        if keyword.is_empty() {
            return None;
        }
        let answer = self.answer.as_deref()?;
        lowered_text
            .contains(&keyword.to_lowercase())
            .then_some(answer)
    }
}

/// Source of FAQ entries, returned in ascending `id` order.
#[async_trait]
pub trait FaqSource: Send + Sync {
    async fn entries(&self) -> Result<Vec<FaqEntry>, StoreError>;
}

/// First matching answer among `entries`, in slice order.
pub fn find_answer<'a>(entries: &'a [FaqEntry], text: &str) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    entries.iter().find_map(|e| e.answer_for(&lowered))
}

/// Scan `source` for a canned answer to `text`.
pub async fn lookup(source: &dyn FaqSource, text: &str) -> Result<Option<String>, StoreError> {
    let entries = source.entries().await?;
    Ok(find_answer(&entries, text).map(str::to_string))
}

/// Fixed, in-memory FAQ table.
#[derive(Debug, Clone, Default)]
pub struct StaticFaqSource {
    entries: Vec<FaqEntry>,
}

impl StaticFaqSource {
    /// Build from `entries`, ordered by ascending `id` (stable for equal ids).
    pub fn new(mut entries: Vec<FaqEntry>) -> Self {
        entries.sort_by_key(|e| e.id);
        Self { entries }
    }
}

#[async_trait]
impl FaqSource for StaticFaqSource {
    async fn entries(&self) -> Result<Vec<FaqEntry>, StoreError> {
        Ok(self.entries.clone())
    }
}
