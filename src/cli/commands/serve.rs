use anyhow::Context;
use std::sync::Arc;

use super::{postgres_dashboard, shutdown_signal};
use crate::backend::commands::EdgeFunctionClient;
use crate::cli::utils::{output_load_results, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::handlers::{router, AppState};

pub async fn handle(port: Option<u16>, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting ops-realtime in {:?} mode", config.environment);

    let dashboard = postgres_dashboard(config).await?;
    let results = dashboard.start().await;
    output_load_results(&output_format, &results)?;

    let mut state = AppState::new(dashboard.clone());
    match &config.backend.functions_url {
        Some(url) => {
            let anon_key = config.backend.functions_anon_key.clone().unwrap_or_default();
            state = state.with_commands(Arc::new(EdgeFunctionClient::new(url, anon_key)?));
        }
        None => tracing::warn!("FUNCTIONS_URL is not set; command routes will answer 503"),
    }

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    output_success(&output_format, &format!("Listening on http://{}", bind_addr), None)?;

    axum::serve(listener, router(state, &config.api))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dashboard.stop();
    Ok(())
}
