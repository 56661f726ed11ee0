//! FAQ entries read from the `business_info` table.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{FaqEntry, FaqSource};
use crate::store::StoreError;

/// FAQ source backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgFaqSource {
    pool: PgPool,
}

impl PgFaqSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FaqSource for PgFaqSource {
    async fn entries(&self) -> Result<Vec<FaqEntry>, StoreError> {
        let rows = sqlx::query_as::<_, FaqEntry>(
            r#"
            SELECT id, keyword, answer
            FROM business_info
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
