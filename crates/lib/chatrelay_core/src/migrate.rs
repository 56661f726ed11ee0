//! Database migration support.
//!
//! Embeds and runs SQL migrations from `chatrelay_core/migrations/`. Every
//! migration creates its table only if it is absent, so running against a
//! database provisioned by hand is safe.

use sqlx::PgPool;

/// Run all embedded database migrations against the given pool.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
