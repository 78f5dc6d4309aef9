//! Postgres pool and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::config::DatabaseConfig;

/// Idempotent schema. Safe to run on every start.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          UUID PRIMARY KEY,
    name        VARCHAR(100) NOT NULL,
    email       VARCHAR(255) NOT NULL UNIQUE,
    balance     BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS categories (
    id          UUID PRIMARY KEY,
    name        VARCHAR(255) NOT NULL,
    parent_id   UUID REFERENCES categories(id),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS items (
    id          UUID PRIMARY KEY,
    name        VARCHAR(255) NOT NULL CHECK (length(name) > 0),
    price       BIGINT NOT NULL CHECK (price >= 0),
    description VARCHAR(2000) NOT NULL DEFAULT '',
    sold_out    BOOLEAN NOT NULL DEFAULT FALSE,
    user_id     UUID NOT NULL REFERENCES users(id),
    category_id UUID NOT NULL REFERENCES categories(id),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    deleted_at  TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_items_user_sold_out ON items (user_id, sold_out);
CREATE INDEX IF NOT EXISTS idx_items_deleted_at ON items (deleted_at);
CREATE INDEX IF NOT EXISTS idx_categories_name ON categories (name);
"#;

#[instrument(skip(config), fields(max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.url)
        .await
}

#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_rerunnable() {
        for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            assert!(
                stmt.contains("IF NOT EXISTS"),
                "statement is not idempotent: {stmt}"
            );
        }
    }

    #[test]
    fn schema_enforces_non_negative_amounts() {
        assert!(SCHEMA.contains("CHECK (balance >= 0)"));
        assert!(SCHEMA.contains("CHECK (price >= 0)"));
    }
}
