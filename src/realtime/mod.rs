//! Realtime synchronization: snapshots, change streams and mirrors.

pub mod error;
pub mod event;
pub mod feed;
pub mod mirror;
pub mod rules;
pub mod snapshot;
pub mod subscriber;
pub mod sync;

pub use error::{DecodeError, FetchError, SubscriptionError};
pub use event::{Change, ChangeEvent, RawChange};
pub use feed::{ChangeFeed, FeedFrame, FeedStream};
pub use mirror::{Applied, Mirror, MirrorOrder, MirrorPhase};
pub use rules::{classify, NotificationRules};
pub use snapshot::{SnapshotLoader, SnapshotSource};
pub use subscriber::{SubscriptionHandle, SubscriptionStatus, Subscriber};
pub use sync::{ResourceSync, SyncSummary};
