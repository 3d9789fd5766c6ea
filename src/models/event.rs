use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Resource;
use crate::realtime::mirror::MirrorOrder;
use crate::types::ResourceType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Planned => f.write_str("planned"),
            EventStatus::InProgress => f.write_str("in_progress"),
            EventStatus::Completed => f.write_str("completed"),
        }
    }
}

/// A scheduled catering event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub attendees: u32,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub menu: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Event {
    const RESOURCE: ResourceType = ResourceType::Events;

    fn id(&self) -> &str {
        &self.id
    }

    fn mirror_order() -> MirrorOrder<Self> {
        MirrorOrder::Sorted(|a, b| a.date.cmp(&b.date))
    }
}
