use std::sync::Arc;

use anyhow::Context;

use fleamarket_catalog::DEFAULT_CATEGORY_NAME;
use fleamarket_infra::MarketplaceService;
use fleamarket_infra::config::{AppConfig, DatabaseConfig};
use fleamarket_infra::db;
use fleamarket_infra::store::{InMemoryMarketStore, PostgresMarketStore, Repositories};

/// Everything handlers need, shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub marketplace: MarketplaceService,
}

/// Wire stores according to `USE_PERSISTENT_STORES`.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match &config.database {
        Some(database) => build_persistent_services(database).await,
        None => build_in_memory_services().await,
    }
}

pub async fn build_in_memory_services() -> anyhow::Result<AppServices> {
    // In-memory wiring (dev/test): one store plays every repository role.
    let store = Arc::new(InMemoryMarketStore::new());
    tracing::info!("using in-memory stores");
    with_default_category(Repositories::from_store(store)).await
}

async fn build_persistent_services(database: &DatabaseConfig) -> anyhow::Result<AppServices> {
    let pool = db::connect(database)
        .await
        .context("failed to connect to Postgres")?;
    db::migrate(&pool)
        .await
        .context("failed to apply schema")?;

    let store = Arc::new(PostgresMarketStore::new(pool));
    tracing::info!("using Postgres stores");
    with_default_category(Repositories::from_store(store)).await
}

async fn with_default_category(repos: Repositories) -> anyhow::Result<AppServices> {
    let marketplace = MarketplaceService::new(repos);
    let general = marketplace
        .ensure_category(DEFAULT_CATEGORY_NAME)
        .await
        .context("failed to ensure default category")?;

    Ok(AppServices {
        marketplace: marketplace.with_default_category(general.id),
    })
}
