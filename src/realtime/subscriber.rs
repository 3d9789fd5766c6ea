//! Change stream subscriptions.
//!
//! Each subscription runs two tasks. The reader pulls frames off the
//! transport, validates them into typed events, numbers them and pushes them
//! onto a bounded channel. The dispatcher drains that channel and invokes the
//! handler one event at a time, so events of one resource are never handled
//! concurrently. The dispatcher holds the subscription gate for the duration
//! of each handler call; `unsubscribe` closes the gate under the same lock,
//! which is what makes "no invocation after unsubscribe returns" hold.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::models::Resource;
use crate::realtime::error::SubscriptionError;
use crate::realtime::event::ChangeEvent;
use crate::realtime::feed::{ChangeFeed, FeedFrame};
use crate::types::ResourceType;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed(SubscriptionError),
    Closed,
}

impl SubscriptionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SubscriptionStatus::Connected)
    }

    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Failed(_) | SubscriptionStatus::Closed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubscriptionStatus::Connecting => "connecting",
            SubscriptionStatus::Connected => "connected",
            SubscriptionStatus::Disconnected => "disconnected",
            SubscriptionStatus::Failed(_) => "failed",
            SubscriptionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Failed(e) => write!(f, "failed: {}", e),
            other => f.write_str(other.label()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// Closed is sticky: a reader that is still winding down cannot overwrite it
fn set_status(status: &watch::Sender<SubscriptionStatus>, next: SubscriptionStatus) {
    status.send_if_modified(|current| {
        if *current == SubscriptionStatus::Closed || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

/// Opens change stream subscriptions over a transport
#[derive(Clone)]
pub struct Subscriber {
    feed: Arc<dyn ChangeFeed>,
    channel_capacity: usize,
}

impl Subscriber {
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self { feed, channel_capacity: DEFAULT_CHANNEL_CAPACITY }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Start delivering `R` change events to `handler`. Must be called from
    /// within a Tokio runtime. Establishment happens in the background; watch
    /// the handle's status (or `wait_connected`) to learn how it went.
    ///
    /// The handler must not unsubscribe its own handle.
    pub fn subscribe<R, H>(&self, mut handler: H) -> SubscriptionHandle
    where
        R: Resource,
        H: FnMut(ChangeEvent<R>) + Send + 'static,
    {
        let resource = R::RESOURCE;
        let (tx, mut rx) = mpsc::channel::<ChangeEvent<R>>(self.channel_capacity);
        let status = Arc::new(watch::channel(SubscriptionStatus::Connecting).0);
        let gate = Arc::new(Mutex::new(true));

        let reader = tokio::spawn(read_feed::<R>(self.feed.clone(), tx, status.clone()));

        let dispatch_gate = gate.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let delivered = {
                    let open = lock(&dispatch_gate);
                    if *open {
                        handler(event);
                    }
                    *open
                };
                if !delivered {
                    break;
                }
            }
        });

        SubscriptionHandle {
            resource,
            gate,
            status,
            tasks: Mutex::new(vec![reader, dispatcher]),
        }
    }
}

async fn read_feed<R: Resource>(
    feed: Arc<dyn ChangeFeed>,
    tx: mpsc::Sender<ChangeEvent<R>>,
    status: Arc<watch::Sender<SubscriptionStatus>>,
) {
    let resource = R::RESOURCE;

    let mut stream = match feed.open(resource).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Could not subscribe to {} changes: {}", resource, e);
            set_status(&status, SubscriptionStatus::Failed(e));
            return;
        }
    };
    tracing::info!("Subscribed to {} changes", resource);
    set_status(&status, SubscriptionStatus::Connected);

    let mut sequence = 0u64;
    loop {
        match stream.next_frame().await {
            Ok(Some(FeedFrame::Change(raw))) => {
                let kind = raw.kind;
                match raw.decode::<R>(sequence) {
                    Ok(event) => {
                        sequence += 1;
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Skipping malformed {} {} frame: {}", resource, kind, e),
                }
            }
            Ok(Some(FeedFrame::Disconnected)) => {
                tracing::warn!("{} change stream disconnected; changes until reconnect will be missed", resource);
                set_status(&status, SubscriptionStatus::Disconnected);
            }
            Ok(Some(FeedFrame::Reconnected)) => {
                tracing::info!("{} change stream reconnected", resource);
                set_status(&status, SubscriptionStatus::Connected);
            }
            Ok(None) => {
                tracing::info!("{} change stream ended", resource);
                set_status(&status, SubscriptionStatus::Closed);
                break;
            }
            Err(e) => {
                tracing::error!("{} change stream failed: {}", resource, e);
                set_status(&status, SubscriptionStatus::Failed(e));
                break;
            }
        }
    }
}

/// Wait until `rx` reports `Connected`, failing on a terminal state
pub async fn wait_for_connection(mut rx: watch::Receiver<SubscriptionStatus>) -> Result<(), SubscriptionError> {
    loop {
        let current = rx.borrow_and_update().clone();
        match current {
            SubscriptionStatus::Connected => return Ok(()),
            SubscriptionStatus::Failed(e) => return Err(e),
            SubscriptionStatus::Closed => return Err(SubscriptionError::Closed),
            SubscriptionStatus::Connecting | SubscriptionStatus::Disconnected => {}
        }
        if rx.changed().await.is_err() {
            return Err(SubscriptionError::Closed);
        }
    }
}

/// One open change stream. Dropping the handle unsubscribes.
pub struct SubscriptionHandle {
    resource: ResourceType,
    gate: Arc<Mutex<bool>>,
    status: Arc<watch::Sender<SubscriptionStatus>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    /// Lifecycle transitions as they happen
    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    pub async fn wait_connected(&self) -> Result<(), SubscriptionError> {
        wait_for_connection(self.watch_status()).await
    }

    pub fn is_active(&self) -> bool {
        *lock(&self.gate)
    }

    /// Stop delivery. Blocks until an in-flight handler call returns; no
    /// handler call starts afterwards. Idempotent.
    pub fn unsubscribe(&self) {
        {
            let mut open = lock(&self.gate);
            if !*open {
                return;
            }
            *open = false;
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.status.send_replace(SubscriptionStatus::Closed);
        tracing::info!("Unsubscribed from {} changes", self.resource);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryFeed;
    use crate::models::Deal;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn forwarding(feed: &Arc<MemoryFeed>) -> (SubscriptionHandle, mpsc::UnboundedReceiver<ChangeEvent<Deal>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Subscriber::new(feed.clone()).subscribe::<Deal, _>(move |event| {
            let _ = tx.send(event);
        });
        (handle, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ChangeEvent<Deal>>) -> ChangeEvent<Deal> {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn delivers_in_order_with_sequence_numbers() {
        let feed = Arc::new(MemoryFeed::new());
        let (handle, mut rx) = forwarding(&feed);
        handle.wait_connected().await.unwrap();

        feed.insert(ResourceType::Pipeline, json!({ "id": "d1", "stage": "negotiation", "value": 1 }));
        feed.update(ResourceType::Pipeline, json!({ "id": "d1", "stage": "signed", "value": 1 }));
        feed.delete(ResourceType::Pipeline, "d1");

        let seqs = vec![next(&mut rx).await.sequence, next(&mut rx).await.sequence, next(&mut rx).await.sequence];
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let feed = Arc::new(MemoryFeed::new());
        let (handle, mut rx) = forwarding(&feed);
        handle.wait_connected().await.unwrap();

        feed.insert(ResourceType::Pipeline, json!({ "id": "bad", "stage": "unknown" }));
        feed.insert(ResourceType::Pipeline, json!({ "id": "d2", "stage": "consulting", "value": 3 }));

        let event = next(&mut rx).await;
        assert_eq!(event.row_id(), "d2");
        assert_eq!(event.sequence, 0);
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_unsubscribe() {
        let feed = Arc::new(MemoryFeed::new());
        let (handle, mut rx) = forwarding(&feed);
        handle.wait_connected().await.unwrap();

        feed.insert(ResourceType::Pipeline, json!({ "id": "d1", "stage": "negotiation", "value": 1 }));
        next(&mut rx).await;

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert_eq!(handle.status(), SubscriptionStatus::Closed);

        feed.insert(ResourceType::Pipeline, json!({ "id": "d2", "stage": "negotiation", "value": 1 }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn surfaces_disconnect_and_reconnect() {
        let feed = Arc::new(MemoryFeed::new());
        let (handle, _rx) = forwarding(&feed);
        handle.wait_connected().await.unwrap();
        let mut status = handle.watch_status();

        feed.disconnect(ResourceType::Pipeline);
        timeout(Duration::from_secs(1), status.wait_for(|s| *s == SubscriptionStatus::Disconnected))
            .await
            .unwrap()
            .unwrap();

        feed.reconnect(ResourceType::Pipeline);
        timeout(Duration::from_secs(1), status.wait_for(|s| s.is_connected()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn refused_stream_reports_failure() {
        let feed = Arc::new(MemoryFeed::new());
        feed.refuse_next_open(ResourceType::Pipeline, SubscriptionError::Connect("denied".into()));
        let (handle, _rx) = forwarding(&feed);

        let err = handle.wait_connected().await.unwrap_err();
        assert_eq!(err, SubscriptionError::Connect("denied".into()));
        assert!(handle.status().is_terminal());
    }
}
