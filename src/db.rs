use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    config::DbConfig,
    error::StoreError,
    retry::{self, CONNECT_ATTEMPTS, CONNECT_DELAY},
};

/// Opens the pool with the startup retry budget, then makes sure the user
/// table and its unique email index exist.
pub async fn connect(cfg: &DbConfig) -> Result<PgPool, StoreError> {
    let url = cfg.connection_url();
    retry::with_delay(CONNECT_ATTEMPTS, CONNECT_DELAY, || async {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        ensure_schema(&pool, &cfg.collection).await?;
        Ok::<_, StoreError>(pool)
    })
    .await
    .map_err(|e| StoreError::Connection(e.to_string()))
}

/// Idempotent; safe to run on every start.
pub async fn ensure_schema(db: &PgPool, table: &str) -> Result<(), StoreError> {
    for stmt in schema_statements(table) {
        sqlx::query(&stmt).execute(db).await?;
    }
    info!(table, "user table and email index ready");
    Ok(())
}

fn schema_statements(table: &str) -> [String; 2] {
    [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id                UUID PRIMARY KEY,
                email             TEXT NOT NULL,
                username          TEXT,
                password          TEXT NOT NULL,
                description       TEXT,
                profile_image_ref TEXT,
                is_email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at        BIGINT NOT NULL,
                updated_at        BIGINT NOT NULL
            )
            "#
        ),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS {table}_email_key ON {table} (email)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_targets_configured_table_and_is_idempotent() {
        let [table, index] = schema_statements("profiles");
        assert!(table.contains("CREATE TABLE IF NOT EXISTS profiles"));
        assert!(index.contains("CREATE UNIQUE INDEX IF NOT EXISTS profiles_email_key"));
        assert!(index.ends_with("ON profiles (email)"));
    }
}
