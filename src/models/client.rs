use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Resource;
use crate::realtime::mirror::MirrorOrder;
use crate::types::ResourceType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientTier {
    #[default]
    Standard,
    Premium,
}

impl fmt::Display for ClientTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientTier::Standard => f.write_str("standard"),
            ClientTier::Premium => f.write_str("premium"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tier: ClientTier,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Client {
    const RESOURCE: ResourceType = ResourceType::Clients;

    fn id(&self) -> &str {
        &self.id
    }

    // Newest first; rows without a timestamp sink to the end
    fn mirror_order() -> MirrorOrder<Self> {
        MirrorOrder::Sorted(|a, b| b.created_at.cmp(&a.created_at))
    }
}
