pub mod serve;
pub mod triggers;
pub mod watch;

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

use crate::backend::postgres::{self, PgChangeFeed, PgSnapshotSource};
use crate::config::AppConfig;
use crate::dashboard::Dashboard;

pub(crate) async fn connect_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let url = config.backend.database_url.as_deref().context("DATABASE_URL is not set")?;
    postgres::connect(url, config.backend.max_connections)
        .await
        .context("failed to connect to Postgres")
}

/// Postgres-backed dashboard, not yet started
pub(crate) async fn postgres_dashboard(config: &AppConfig) -> anyhow::Result<Arc<Dashboard>> {
    let pool = connect_pool(config).await?;
    let feed = PgChangeFeed::new(pool.clone())
        .with_reconnect(config.sync.reconnect_delay(), config.sync.max_reconnect_attempts);

    Ok(Arc::new(Dashboard::new(
        Arc::new(PgSnapshotSource::new(pool)),
        Arc::new(feed),
        &config.sync,
        config.notifications.capacity,
    )))
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
}
