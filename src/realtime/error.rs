use std::time::Duration;
use thiserror::Error;

use crate::types::{ChangeKind, ResourceType};

/// Snapshot load failures. The mirror stays as it was and the load can be retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Snapshot of {resource} timed out after {after:?}")]
    Timeout { resource: ResourceType, after: Duration },

    #[error("Invalid {resource} row in snapshot: {message}")]
    Decode { resource: ResourceType, message: String },
}

/// Change stream failures, surfaced through the subscription lifecycle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Could not establish change stream: {0}")]
    Connect(String),

    #[error("Change stream dropped: {0}")]
    Dropped(String),

    #[error("Subscription closed")]
    Closed,
}

/// A change frame that could not be turned into a typed event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0} frame carries no row")]
    MissingRow(ChangeKind),

    #[error("DELETE frame carries no row id")]
    MissingId,

    #[error("{0} frame was truncated to the row id and never resolved")]
    Truncated(ChangeKind),

    #[error("Invalid row: {0}")]
    Row(#[from] serde_json::Error),
}
