use async_trait::async_trait;

use crate::realtime::error::SubscriptionError;
use crate::realtime::event::RawChange;
use crate::types::ResourceType;

/// One frame read off a change stream transport
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    Change(RawChange),
    /// Transport lost; nothing is delivered until `Reconnected`
    Disconnected,
    /// Transport is back. Changes committed in between are not replayed.
    Reconnected,
}

/// Transport that can open a per-resource change stream
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn open(&self, resource: ResourceType) -> Result<Box<dyn FeedStream>, SubscriptionError>;
}

#[async_trait]
pub trait FeedStream: Send {
    /// Next frame in commit order. `Ok(None)` means the stream ended;
    /// `Err` means it dropped for good.
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>, SubscriptionError>;
}
