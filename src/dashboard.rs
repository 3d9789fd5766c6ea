//! The four mirrored collections plus the shared notification list.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::commands::CommandAction;
use crate::config::SyncConfig;
use crate::models::{Client, Deal, Event, InventoryItem};
use crate::notifications::NotificationStore;
use crate::realtime::error::FetchError;
use crate::realtime::feed::ChangeFeed;
use crate::realtime::snapshot::{SnapshotLoader, SnapshotSource};
use crate::realtime::subscriber::{wait_for_connection, SubscriptionStatus, Subscriber};
use crate::realtime::sync::{ResourceSync, SyncSummary};
use crate::types::ResourceType;

/// Dispatch a `ResourceType` to the matching typed sync
macro_rules! with_sync {
    ($dashboard:expr, $resource:expr, |$sync:ident| $body:expr) => {
        match $resource {
            ResourceType::Clients => {
                let $sync = &$dashboard.clients;
                $body
            }
            ResourceType::Events => {
                let $sync = &$dashboard.events;
                $body
            }
            ResourceType::Inventory => {
                let $sync = &$dashboard.inventory;
                $body
            }
            ResourceType::Pipeline => {
                let $sync = &$dashboard.pipeline;
                $body
            }
        }
    };
}

pub struct Dashboard {
    notifications: Arc<NotificationStore>,
    clients: ResourceSync<Client>,
    events: ResourceSync<Event>,
    inventory: ResourceSync<InventoryItem>,
    pipeline: ResourceSync<Deal>,
    connect_timeout: Duration,
}

impl Dashboard {
    pub fn new(
        snapshots: Arc<dyn SnapshotSource>,
        feed: Arc<dyn ChangeFeed>,
        config: &SyncConfig,
        notification_capacity: usize,
    ) -> Self {
        let notifications = Arc::new(NotificationStore::new(notification_capacity));

        let mut loader = SnapshotLoader::new(snapshots);
        if let Some(timeout) = config.snapshot_timeout() {
            loader = loader.with_timeout(timeout);
        }
        let subscriber = Subscriber::new(feed).with_channel_capacity(config.channel_capacity);

        Self {
            clients: ResourceSync::new(loader.clone(), subscriber.clone(), notifications.clone(), config),
            events: ResourceSync::new(loader.clone(), subscriber.clone(), notifications.clone(), config),
            inventory: ResourceSync::new(loader.clone(), subscriber.clone(), notifications.clone(), config),
            pipeline: ResourceSync::new(loader, subscriber, notifications.clone(), config),
            notifications,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Subscribe every resource, wait for the streams to connect, then load
    /// all snapshots concurrently. Changes committed during the load are
    /// buffered and replayed. A stream that fails or is still connecting
    /// after `connect_timeout` does not hold back its snapshot.
    pub async fn start(&self) -> Vec<(ResourceType, Result<usize, FetchError>)> {
        self.start_only(&ResourceType::ALL).await
    }

    /// `start` restricted to `resources`; the others stay idle and empty
    pub async fn start_only(&self, resources: &[ResourceType]) -> Vec<(ResourceType, Result<usize, FetchError>)> {
        let connecting: Vec<_> = resources
            .iter()
            .map(|&resource| (resource, with_sync!(self, resource, |sync| sync.subscribe())))
            .collect();

        futures::future::join_all(connecting.into_iter().map(|(resource, status)| async move {
            match tokio::time::timeout(self.connect_timeout, wait_for_connection(status)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("{} change stream unavailable, loading without it: {}", resource, e),
                Err(_) => tracing::warn!(
                    "{} change stream not connected after {:?}, loading anyway",
                    resource,
                    self.connect_timeout
                ),
            }
        }))
        .await;

        futures::future::join_all(resources.iter().map(|&resource| async move { (resource, self.reload(resource).await) }))
            .await
    }

    /// Unsubscribe every resource. Mirrors keep their last state.
    pub fn stop(&self) {
        for resource in ResourceType::ALL {
            with_sync!(self, resource, |sync| sync.unsubscribe());
        }
        tracing::info!("Dashboard sync stopped");
    }

    pub async fn reload(&self, resource: ResourceType) -> Result<usize, FetchError> {
        with_sync!(self, resource, |sync| sync.load().await)
    }

    /// Current mirror rows, in mirror order, as JSON
    pub fn mirror_json(&self, resource: ResourceType) -> Result<Value, serde_json::Error> {
        with_sync!(self, resource, |sync| serde_json::to_value(sync.list()))
    }

    pub fn status(&self, resource: ResourceType) -> Option<SubscriptionStatus> {
        with_sync!(self, resource, |sync| sync.status())
    }

    pub fn summary(&self, resource: ResourceType) -> SyncSummary {
        with_sync!(self, resource, |sync| sync.summary())
    }

    pub fn is_bootstrapped(&self, resource: ResourceType) -> bool {
        with_sync!(self, resource, |sync| sync.is_bootstrapped())
    }

    /// Mirrored row `id` as JSON, if present
    pub fn row_json(&self, resource: ResourceType, id: &str) -> Option<Value> {
        with_sync!(self, resource, |sync| sync.get(id).and_then(|row| serde_json::to_value(row).ok()))
    }

    /// Wait until a command on `id` shows in the mirror. `before` is the
    /// row as mirrored when the command was sent: an update counts once the
    /// row differs from it, regardless of other changes to the resource.
    pub async fn wait_for_reflection(
        &self,
        resource: ResourceType,
        action: CommandAction,
        id: &str,
        before: Option<Value>,
        timeout: Duration,
    ) -> bool {
        with_sync!(self, resource, |sync| {
            sync.wait_until(timeout, |mirror| match action {
                CommandAction::Create => mirror.contains(id),
                CommandAction::Update => mirror.get(id).map_or(false, |row| serde_json::to_value(row).ok() != before),
                CommandAction::Delete => mirror.is_bootstrapped() && !mirror.contains(id),
            })
            .await
        })
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    pub fn clients(&self) -> &ResourceSync<Client> {
        &self.clients
    }

    pub fn events(&self) -> &ResourceSync<Event> {
        &self.events
    }

    pub fn inventory(&self) -> &ResourceSync<InventoryItem> {
        &self.inventory
    }

    pub fn pipeline(&self) -> &ResourceSync<Deal> {
        &self.pipeline
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.stop();
    }
}
