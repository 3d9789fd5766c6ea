pub mod client;
pub mod deal;
pub mod event;
pub mod inventory;

pub use client::{Client, ClientTier};
pub use deal::{Deal, DealStage};
pub use event::{Event, EventStatus};
pub use inventory::InventoryItem;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::realtime::mirror::MirrorOrder;
use crate::types::ResourceType;

/// A typed row of one mirrored collection.
///
/// Rows are validated into these types at the snapshot and change-frame
/// boundaries; nothing untyped flows into a mirror.
pub trait Resource:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const RESOURCE: ResourceType;

    /// Identifier, unique within the collection
    fn id(&self) -> &str;

    /// Where rows of this collection sit in the mirror
    fn mirror_order() -> MirrorOrder<Self>;
}
