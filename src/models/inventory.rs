use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Resource;
use crate::realtime::mirror::MirrorOrder;
use crate::types::ResourceType;

/// Stock below this quantity raises a low-inventory alert
pub const LOW_STOCK_THRESHOLD: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub waste_percentage: Decimal,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity < LOW_STOCK_THRESHOLD
    }
}

impl Resource for InventoryItem {
    const RESOURCE: ResourceType = ResourceType::Inventory;

    fn id(&self) -> &str {
        &self.id
    }

    fn mirror_order() -> MirrorOrder<Self> {
        MirrorOrder::Sorted(|a, b| a.category.cmp(&b.category))
    }
}
