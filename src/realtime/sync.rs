//! One resource kept in sync: snapshot + change stream + notifications.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::notifications::NotificationStore;
use crate::realtime::error::FetchError;
use crate::realtime::event::ChangeEvent;
use crate::realtime::mirror::{Applied, Mirror, MirrorPhase};
use crate::realtime::rules::{classify, NotificationRules};
use crate::realtime::snapshot::SnapshotLoader;
use crate::realtime::subscriber::{SubscriptionHandle, SubscriptionStatus, Subscriber};
use crate::types::ResourceType;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time view of a sync, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub resource: ResourceType,
    pub phase: &'static str,
    pub bootstrapped: bool,
    pub count: usize,
    pub pending: usize,
    pub status: String,
}

struct Active {
    handle: SubscriptionHandle,
    reload_watcher: Option<JoinHandle<()>>,
}

impl Active {
    fn stop(self) {
        if let Some(watcher) = self.reload_watcher {
            watcher.abort();
        }
        self.handle.unsubscribe();
    }
}

struct Inner<R: NotificationRules> {
    mirror: Arc<RwLock<Mirror<R>>>,
    notifications: Arc<NotificationStore>,
    loader: SnapshotLoader,
    subscriber: Subscriber,
    subscription: Mutex<Option<Active>>,
    load_lock: tokio::sync::Mutex<()>,
    // carries the mirror version after every visible change
    changed: Arc<watch::Sender<u64>>,
    reload_on_reconnect: bool,
}

impl<R: NotificationRules> Inner<R> {
    /// Finish a load: install `rows` or fall back to the previous content,
    /// then notify for every replayed event
    fn settle(&self, rows: Option<Vec<R>>) -> usize {
        let (count, version) = {
            let mut mirror = write(&self.mirror);
            let replayed = match rows {
                Some(rows) => mirror.bootstrap(rows),
                None => mirror.abort_load(),
            };
            for (event, applied) in &replayed {
                if let Some(notification) = classify(event, applied) {
                    self.notifications.add(notification);
                }
            }
            (mirror.len(), mirror.version())
        };
        self.changed.send_replace(version);
        count
    }
}

// Settles an abandoned load so the mirror never stays stuck buffering
struct PendingLoad<'a, R: NotificationRules> {
    inner: &'a Inner<R>,
    settled: bool,
}

impl<R: NotificationRules> Drop for PendingLoad<'_, R> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("{} load abandoned before the snapshot arrived", R::RESOURCE);
            self.inner.settle(None);
        }
    }
}

fn deliver<R: NotificationRules>(
    mirror: &RwLock<Mirror<R>>,
    notifications: &NotificationStore,
    changed: &watch::Sender<u64>,
    event: ChangeEvent<R>,
) {
    let (applied, version) = {
        let mut mirror = write(mirror);
        let applied = mirror.apply(&event);
        if let Some(notification) = classify(&event, &applied) {
            notifications.add(notification);
        }
        (applied, mirror.version())
    };

    match &applied {
        Applied::Buffered => {
            tracing::debug!("Buffered {} {} seq={} until snapshot", event.resource, event.kind(), event.sequence)
        }
        Applied::Unchanged => {
            tracing::debug!("Ignored redelivered {} {} for '{}'", event.resource, event.kind(), event.row_id())
        }
        Applied::Confirmed(_) => {
            tracing::debug!("{} {} for '{}' was already reflected", event.resource, event.kind(), event.row_id())
        }
        Applied::Inserted(_) | Applied::Replaced { .. } | Applied::Removed(_) => {
            changed.send_replace(version);
        }
    }
}

/// Cheaply clonable handle keeping one resource's mirror in sync
pub struct ResourceSync<R: NotificationRules> {
    inner: Arc<Inner<R>>,
}

impl<R: NotificationRules> Clone for ResourceSync<R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<R: NotificationRules> ResourceSync<R> {
    pub fn new(
        loader: SnapshotLoader,
        subscriber: Subscriber,
        notifications: Arc<NotificationStore>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                mirror: Arc::new(RwLock::new(Mirror::with_max_pending(config.max_pending_events))),
                notifications,
                loader,
                subscriber,
                subscription: Mutex::new(None),
                load_lock: tokio::sync::Mutex::new(()),
                changed: Arc::new(watch::channel(0).0),
                reload_on_reconnect: config.reload_on_reconnect,
            }),
        }
    }

    pub fn resource(&self) -> ResourceType {
        R::RESOURCE
    }

    /// Open the change stream. A live subscription is kept; a failed or
    /// closed one is replaced.
    pub fn subscribe(&self) -> watch::Receiver<SubscriptionStatus> {
        let mut slot = lock(&self.inner.subscription);
        if let Some(active) = slot.as_ref() {
            if !active.handle.status().is_terminal() {
                return active.handle.watch_status();
            }
        }
        if let Some(stale) = slot.take() {
            stale.stop();
        }

        let mirror = self.inner.mirror.clone();
        let notifications = self.inner.notifications.clone();
        let changed = self.inner.changed.clone();
        let handle = self
            .inner
            .subscriber
            .subscribe::<R, _>(move |event| deliver(&mirror, &notifications, &changed, event));

        let reload_watcher = self
            .inner
            .reload_on_reconnect
            .then(|| spawn_reload_watcher(Arc::downgrade(&self.inner), handle.watch_status()));

        let status = handle.watch_status();
        *slot = Some(Active { handle, reload_watcher });
        status
    }

    /// Stop applying change events. The mirror keeps its last state.
    pub fn unsubscribe(&self) {
        let active = lock(&self.inner.subscription).take();
        if let Some(active) = active {
            active.stop();
        }
    }

    /// Fetch a snapshot and bootstrap the mirror from it, replaying events
    /// buffered meanwhile. On failure the mirror keeps what it had and the
    /// load can be retried. Returns the number of rows mirrored.
    pub async fn load(&self) -> Result<usize, FetchError> {
        let _serial = self.inner.load_lock.lock().await;

        write(&self.inner.mirror).begin_load();
        let mut pending = PendingLoad { inner: &self.inner, settled: false };

        let result = self.inner.loader.load::<R>().await;
        pending.settled = true;

        match result {
            Ok(rows) => {
                let count = self.inner.settle(Some(rows));
                tracing::info!("Loaded {} snapshot with {} rows", R::RESOURCE, count);
                Ok(count)
            }
            Err(e) => {
                self.inner.settle(None);
                tracing::error!("Failed to load {} snapshot: {}", R::RESOURCE, e);
                Err(e)
            }
        }
    }

    /// Rows in mirror order; empty until bootstrapped
    pub fn list(&self) -> Vec<R> {
        read(&self.inner.mirror).list()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        read(&self.inner.mirror).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.inner.mirror).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bootstrapped(&self) -> bool {
        read(&self.inner.mirror).is_bootstrapped()
    }

    pub fn phase(&self) -> MirrorPhase {
        read(&self.inner.mirror).phase()
    }

    /// `None` when never subscribed or after `unsubscribe`
    pub fn status(&self) -> Option<SubscriptionStatus> {
        lock(&self.inner.subscription).as_ref().map(|a| a.handle.status())
    }

    pub fn summary(&self) -> SyncSummary {
        let (phase, bootstrapped, count, pending) = {
            let mirror = read(&self.inner.mirror);
            let phase = match mirror.phase() {
                MirrorPhase::Unbootstrapped => "unbootstrapped",
                MirrorPhase::Reloading => "reloading",
                MirrorPhase::Live => "live",
            };
            (phase, mirror.is_bootstrapped(), mirror.len(), mirror.pending_len())
        };
        let status = match self.status() {
            Some(status) => status.to_string(),
            None => "unsubscribed".to_string(),
        };
        SyncSummary { resource: R::RESOURCE, phase, bootstrapped, count, pending, status }
    }

    /// Wait until `pred` holds for the mirror. False on timeout.
    pub async fn wait_until<F>(&self, timeout: Duration, mut pred: F) -> bool
    where
        F: FnMut(&Mirror<R>) -> bool,
    {
        let mut changes = self.inner.changed.subscribe();
        let check = async {
            loop {
                let satisfied = {
                    let mirror = read(&self.inner.mirror);
                    pred(&mirror)
                };
                if satisfied {
                    return true;
                }
                if changes.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, check).await.unwrap_or(false)
    }

    /// Wait for a command's insert or update to be reflected
    pub async fn wait_for_row(&self, id: &str, timeout: Duration) -> Option<R> {
        if self.wait_until(timeout, |m| m.contains(id)).await {
            self.get(id)
        } else {
            None
        }
    }

    /// Wait for a command's delete to be reflected
    pub async fn wait_for_removal(&self, id: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, |m| m.is_bootstrapped() && !m.contains(id)).await
    }
}

fn spawn_reload_watcher<R: NotificationRules>(
    inner: Weak<Inner<R>>,
    mut status: watch::Receiver<SubscriptionStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut dropped = false;
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current {
                SubscriptionStatus::Disconnected => dropped = true,
                SubscriptionStatus::Connected if dropped => {
                    dropped = false;
                    let Some(inner) = inner.upgrade() else { break };
                    tracing::info!("Reloading {} snapshot after reconnect", R::RESOURCE);
                    let sync = ResourceSync { inner };
                    // failure is already logged by load
                    let _ = sync.load().await;
                }
                s if s.is_terminal() => break,
                _ => {}
            }
        }
    })
}
