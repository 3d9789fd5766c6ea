/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four collections mirrored by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Clients,
    Events,
    Inventory,
    Pipeline,
}

/// Sort direction for snapshot queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Clients,
        ResourceType::Events,
        ResourceType::Inventory,
        ResourceType::Pipeline,
    ];

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            ResourceType::Clients => "clients",
            ResourceType::Events => "events",
            ResourceType::Inventory => "inventory",
            ResourceType::Pipeline => "pipeline",
        }
    }

    /// Notification channel the change trigger publishes on
    pub fn channel(&self) -> String {
        format!("realtime_{}", self.table())
    }

    /// Singular name used by the write endpoints (`create-event`, `delete-client`, ...)
    pub fn singular(&self) -> &'static str {
        match self {
            ResourceType::Clients => "client",
            ResourceType::Events => "event",
            ResourceType::Inventory => "inventory",
            ResourceType::Pipeline => "pipeline",
        }
    }

    /// Canonical snapshot order: column and direction
    pub fn snapshot_order(&self) -> (&'static str, SortDirection) {
        match self {
            ResourceType::Clients => ("created_at", SortDirection::Desc),
            ResourceType::Events => ("date", SortDirection::Asc),
            ResourceType::Inventory => ("category", SortDirection::Asc),
            ResourceType::Pipeline => ("created_at", SortDirection::Asc),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown resource type: {0}")]
pub struct UnknownResource(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clients" | "client" => Ok(ResourceType::Clients),
            "events" | "event" => Ok(ResourceType::Events),
            "inventory" => Ok(ResourceType::Inventory),
            "pipeline" | "deals" | "deal" => Ok(ResourceType::Pipeline),
            _ => Err(UnknownResource(s.to_string())),
        }
    }
}

/// Kind of row mutation carried by a change frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => f.write_str("INSERT"),
            ChangeKind::Update => f.write_str("UPDATE"),
            ChangeKind::Delete => f.write_str("DELETE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resource_aliases() {
        assert_eq!("events".parse::<ResourceType>().unwrap(), ResourceType::Events);
        assert_eq!("Deals".parse::<ResourceType>().unwrap(), ResourceType::Pipeline);
        assert!("upsells".parse::<ResourceType>().is_err());
    }

    #[test]
    fn change_kind_uses_uppercase_wire_names() {
        let kind: ChangeKind = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(kind, ChangeKind::Delete);
        assert_eq!(serde_json::to_string(&ChangeKind::Insert).unwrap(), "\"INSERT\"");
    }
}
