use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Resource;
use crate::realtime::mirror::MirrorOrder;
use crate::types::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStage {
    Negotiation,
    Consulting,
    Signed,
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealStage::Negotiation => f.write_str("negotiation"),
            DealStage::Consulting => f.write_str("consulting"),
            DealStage::Signed => f.write_str("signed"),
        }
    }
}

/// A sales pipeline deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub stage: DealStage,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deal {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => "Deal",
        }
    }
}

impl Resource for Deal {
    const RESOURCE: ResourceType = ResourceType::Pipeline;

    fn id(&self) -> &str {
        &self.id
    }

    fn mirror_order() -> MirrorOrder<Self> {
        MirrorOrder::Append
    }
}
