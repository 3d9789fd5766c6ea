//! In-process snapshot source and change feed.
//!
//! Both are fully scriptable so tests (and local demos) can force the
//! orderings a real backend only produces under load: events committed while
//! a snapshot is in flight, transport drops, refused subscriptions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

use crate::realtime::error::{FetchError, SubscriptionError};
use crate::realtime::event::RawChange;
use crate::realtime::feed::{ChangeFeed, FeedFrame, FeedStream};
use crate::realtime::snapshot::SnapshotSource;
use crate::types::ResourceType;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Collection {
    rows: Vec<Value>,
    failures: VecDeque<FetchError>,
    hold: Option<watch::Receiver<bool>>,
    fetches: usize,
}

/// Snapshot source over in-memory rows
#[derive(Default)]
pub struct MemorySnapshots {
    collections: Mutex<HashMap<ResourceType, Collection>>,
}

/// Keeps fetches of one resource pending until released or dropped
pub struct SnapshotRelease {
    tx: watch::Sender<bool>,
}

impl SnapshotRelease {
    pub fn release(self) {
        let _ = self.tx.send(true);
    }
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by subsequent fetches, in the order given
    pub fn set_rows(&self, resource: ResourceType, rows: Vec<Value>) {
        lock(&self.collections).entry(resource).or_default().rows = rows;
    }

    /// Fail the next fetch of `resource` with `error`
    pub fn fail_next(&self, resource: ResourceType, error: FetchError) {
        lock(&self.collections).entry(resource).or_default().failures.push_back(error);
    }

    /// Hold fetches of `resource` after they have read their rows. The rows
    /// are captured when the fetch starts, like a point-in-time query.
    pub fn hold(&self, resource: ResourceType) -> SnapshotRelease {
        let (tx, rx) = watch::channel(false);
        lock(&self.collections).entry(resource).or_default().hold = Some(rx);
        SnapshotRelease { tx }
    }

    pub fn fetch_count(&self, resource: ResourceType) -> usize {
        lock(&self.collections).get(&resource).map_or(0, |c| c.fetches)
    }
}

#[async_trait]
impl SnapshotSource for MemorySnapshots {
    async fn fetch(&self, resource: ResourceType) -> Result<Vec<Value>, FetchError> {
        let (rows, hold) = {
            let mut collections = lock(&self.collections);
            let collection = collections.entry(resource).or_default();
            collection.fetches += 1;
            if let Some(error) = collection.failures.pop_front() {
                return Err(error);
            }
            (collection.rows.clone(), collection.hold.clone())
        };

        if let Some(mut hold) = hold {
            // a dropped release lets the fetch through as well
            let _ = hold.wait_for(|released| *released).await;
        }
        Ok(rows)
    }
}

type FrameSender = mpsc::UnboundedSender<Result<FeedFrame, SubscriptionError>>;

#[derive(Default)]
struct FeedChannel {
    sender: Option<FrameSender>,
    disconnected: bool,
    refusal: Option<SubscriptionError>,
    opens: usize,
}

/// Change feed driven by explicit pushes. Opening a resource again replaces
/// its previous stream.
#[derive(Default)]
pub struct MemoryFeed {
    channels: Mutex<HashMap<ResourceType, FeedChannel>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: ResourceType, row: Value) -> bool {
        self.push(resource, RawChange::insert(row))
    }

    pub fn update(&self, resource: ResourceType, row: Value) -> bool {
        self.push(resource, RawChange::update(row))
    }

    pub fn delete(&self, resource: ResourceType, id: &str) -> bool {
        self.push(resource, RawChange::delete(id))
    }

    /// Deliver a change frame. Returns false when nobody is connected to
    /// receive it; such changes are lost, as on a real transport.
    pub fn push(&self, resource: ResourceType, change: RawChange) -> bool {
        let channels = lock(&self.channels);
        match channels.get(&resource) {
            Some(channel) if !channel.disconnected => channel
                .sender
                .as_ref()
                .map_or(false, |tx| tx.send(Ok(FeedFrame::Change(change))).is_ok()),
            _ => false,
        }
    }

    pub fn disconnect(&self, resource: ResourceType) {
        self.signal(resource, Ok(FeedFrame::Disconnected), |c| c.disconnected = true);
    }

    pub fn reconnect(&self, resource: ResourceType) {
        self.signal(resource, Ok(FeedFrame::Reconnected), |c| c.disconnected = false);
    }

    /// Drop the stream for good with `error`
    pub fn fail(&self, resource: ResourceType, error: SubscriptionError) {
        self.signal(resource, Err(error), |c| c.disconnected = true);
        self.close(resource);
    }

    /// End the stream cleanly
    pub fn close(&self, resource: ResourceType) {
        if let Some(channel) = lock(&self.channels).get_mut(&resource) {
            channel.sender = None;
        }
    }

    /// Make the next `open` of `resource` fail with `error`
    pub fn refuse_next_open(&self, resource: ResourceType, error: SubscriptionError) {
        lock(&self.channels).entry(resource).or_default().refusal = Some(error);
    }

    pub fn open_count(&self, resource: ResourceType) -> usize {
        lock(&self.channels).get(&resource).map_or(0, |c| c.opens)
    }

    pub fn is_open(&self, resource: ResourceType) -> bool {
        lock(&self.channels)
            .get(&resource)
            .and_then(|c| c.sender.as_ref())
            .map_or(false, |tx| !tx.is_closed())
    }

    fn signal(
        &self,
        resource: ResourceType,
        frame: Result<FeedFrame, SubscriptionError>,
        update: impl FnOnce(&mut FeedChannel),
    ) {
        let mut channels = lock(&self.channels);
        if let Some(channel) = channels.get_mut(&resource) {
            update(channel);
            if let Some(tx) = &channel.sender {
                let _ = tx.send(frame);
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn open(&self, resource: ResourceType) -> Result<Box<dyn FeedStream>, SubscriptionError> {
        let mut channels = lock(&self.channels);
        let channel = channels.entry(resource).or_default();
        if let Some(error) = channel.refusal.take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        channel.sender = Some(tx);
        channel.disconnected = false;
        channel.opens += 1;
        Ok(Box::new(MemoryStream { rx }))
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Result<FeedFrame, SubscriptionError>>,
}

#[async_trait]
impl FeedStream for MemoryStream {
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>, SubscriptionError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn changes_while_disconnected_are_lost() {
        let feed = MemoryFeed::new();
        let mut stream = feed.open(ResourceType::Events).await.unwrap();

        feed.disconnect(ResourceType::Events);
        assert!(!feed.insert(ResourceType::Events, json!({ "id": "e1" })));
        feed.reconnect(ResourceType::Events);
        assert!(feed.delete(ResourceType::Events, "e1"));

        assert_eq!(stream.next_frame().await.unwrap(), Some(FeedFrame::Disconnected));
        assert_eq!(stream.next_frame().await.unwrap(), Some(FeedFrame::Reconnected));
        assert_eq!(
            stream.next_frame().await.unwrap(),
            Some(FeedFrame::Change(RawChange::delete("e1")))
        );
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let feed = MemoryFeed::new();
        let mut stream = feed.open(ResourceType::Inventory).await.unwrap();
        feed.close(ResourceType::Inventory);
        assert_eq!(stream.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let snapshots = MemorySnapshots::new();
        snapshots.fail_next(ResourceType::Pipeline, FetchError::Transport("reset".into()));

        assert!(snapshots.fetch(ResourceType::Pipeline).await.is_err());
        assert!(snapshots.fetch(ResourceType::Pipeline).await.unwrap().is_empty());
        assert_eq!(snapshots.fetch_count(ResourceType::Pipeline), 2);
    }
}
