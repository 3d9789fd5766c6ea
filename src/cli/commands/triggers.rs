use anyhow::Context;
use sqlx::Executor;

use super::connect_pool;
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

const TRIGGER_SQL: &str = include_str!("../../../sql/realtime.sql");

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect_pool(config()).await?;

    // multi-statement script, so it goes over the simple query protocol
    pool.execute(TRIGGER_SQL).await.context("failed to install realtime triggers")?;

    output_success(&output_format, "Installed realtime triggers", None)
}
