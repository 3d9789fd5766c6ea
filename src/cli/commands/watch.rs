use tokio::sync::broadcast::error::RecvError;

use super::{postgres_dashboard, shutdown_signal};
use crate::cli::utils::output_load_results;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::notifications::Notification;
use crate::types::ResourceType;

pub async fn handle(resources: Vec<ResourceType>, output_format: OutputFormat) -> anyhow::Result<()> {
    let resources = if resources.is_empty() { ResourceType::ALL.to_vec() } else { resources };

    let dashboard = postgres_dashboard(config()).await?;
    let mut added = dashboard.notifications().subscribe();

    let results = dashboard.start_only(&resources).await;
    output_load_results(&output_format, &results)?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = added.recv() => match received {
                Ok(notification) => print_notification(&output_format, &notification)?,
                Err(RecvError::Lagged(missed)) => tracing::warn!("Watcher fell behind, skipped {} notifications", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    dashboard.stop();
    Ok(())
}

fn print_notification(output_format: &OutputFormat, notification: &Notification) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string(notification)?),
        OutputFormat::Text => println!(
            "{} [{:?}] {}: {}",
            notification.created_at.format("%H:%M:%S"),
            notification.severity,
            notification.title,
            notification.message
        ),
    }
    Ok(())
}
