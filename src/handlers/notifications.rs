use axum::extract::{Path, State};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiResponse, ApiResult, AppState};
use crate::error::ApiError;
use crate::notifications::Notification;

/// GET /api/notifications - most recent first
pub async fn list(State(state): State<AppState>) -> ApiResult<Value> {
    let store = state.dashboard.notifications();
    Ok(ApiResponse::success(json!({
        "notifications": store.list(),
        "unread_count": store.unread_count(),
    })))
}

/// POST /api/notifications/read-all
pub async fn read_all(State(state): State<AppState>) -> ApiResult<Value> {
    let store = state.dashboard.notifications();
    store.mark_all_as_read();
    Ok(ApiResponse::success(json!({ "unread_count": store.unread_count() })))
}

/// POST /api/notifications/:id/read - no-op when already read
pub async fn read_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Value> {
    let store = state.dashboard.notifications();
    if !store.mark_as_read(id) && !store.list().iter().any(|n| n.id == id) {
        return Err(ApiError::not_found(format!("Notification {} not found", id)));
    }
    Ok(ApiResponse::success(json!({
        "id": id,
        "read": true,
        "unread_count": store.unread_count(),
    })))
}

/// DELETE /api/notifications/:id
pub async fn clear_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Notification> {
    state
        .dashboard
        .notifications()
        .clear(id)
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("Notification {} not found", id)))
}

/// DELETE /api/notifications
pub async fn clear_all(State(state): State<AppState>) -> ApiResult<Value> {
    let store = state.dashboard.notifications();
    store.clear_all();
    Ok(ApiResponse::success(json!({ "unread_count": 0 })))
}
