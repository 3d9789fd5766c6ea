use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Resource;
use crate::realtime::error::DecodeError;
use crate::types::{ChangeKind, ResourceType};

/// What happened to the row
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R> {
    Insert(R),
    Update(R),
    Delete { id: String },
}

/// One mutation of one row, as delivered by the change stream
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<R> {
    pub resource: ResourceType,
    pub change: Change<R>,
    /// Delivery order within this resource's subscription
    pub sequence: u64,
}

impl<R: Resource> ChangeEvent<R> {
    pub fn insert(row: R, sequence: u64) -> Self {
        Self { resource: R::RESOURCE, change: Change::Insert(row), sequence }
    }

    pub fn update(row: R, sequence: u64) -> Self {
        Self { resource: R::RESOURCE, change: Change::Update(row), sequence }
    }

    pub fn delete(id: impl Into<String>, sequence: u64) -> Self {
        Self { resource: R::RESOURCE, change: Change::Delete { id: id.into() }, sequence }
    }

    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Insert(_) => ChangeKind::Insert,
            Change::Update(_) => ChangeKind::Update,
            Change::Delete { .. } => ChangeKind::Delete,
        }
    }

    pub fn row_id(&self) -> &str {
        match &self.change {
            Change::Insert(row) | Change::Update(row) => row.id(),
            Change::Delete { id } => id,
        }
    }
}

/// Untyped change frame as published by the database trigger:
/// `{"eventType": "UPDATE", "new": {...}, "old": {...}}`
///
/// Rows too large for a NOTIFY payload arrive as `"new": {"id": ...}` with
/// `"truncated": true`; the transport must read the full row back before
/// the frame can be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl RawChange {
    pub fn insert(row: Value) -> Self {
        Self { kind: ChangeKind::Insert, new: Some(row), old: None, truncated: false }
    }

    pub fn update(row: Value) -> Self {
        Self { kind: ChangeKind::Update, new: Some(row), old: None, truncated: false }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self { kind: ChangeKind::Delete, new: None, old: Some(json!({ "id": id.into() })), truncated: false }
    }

    /// Id of the row to read back, for a truncated insert or update
    pub fn truncated_id(&self) -> Option<String> {
        if !self.truncated || self.kind == ChangeKind::Delete {
            return None;
        }
        self.new.as_ref().and_then(|new| new.get("id")).and_then(id_to_string)
    }

    /// Swap in the full row read back for a truncated frame
    pub fn resolve(mut self, row: Value) -> Self {
        self.new = Some(row);
        self.truncated = false;
        self
    }

    /// Validate the frame into a typed event for `R`
    pub fn decode<R: Resource>(self, sequence: u64) -> Result<ChangeEvent<R>, DecodeError> {
        if self.truncated_id().is_some() {
            return Err(DecodeError::Truncated(self.kind));
        }
        match self.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let row = match self.new {
                    Some(v) if !v.is_null() => serde_json::from_value::<R>(v)?,
                    _ => return Err(DecodeError::MissingRow(self.kind)),
                };
                Ok(if self.kind == ChangeKind::Insert {
                    ChangeEvent::insert(row, sequence)
                } else {
                    ChangeEvent::update(row, sequence)
                })
            }
            ChangeKind::Delete => {
                let id = self
                    .old
                    .as_ref()
                    .and_then(|old| old.get("id"))
                    .and_then(id_to_string)
                    .ok_or(DecodeError::MissingId)?;
                Ok(ChangeEvent::delete(id, sequence))
            }
        }
    }
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
