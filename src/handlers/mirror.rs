use axum::extract::{Path, State};
use serde_json::{json, Value};

use super::{ApiResponse, ApiResult, AppState};
use crate::types::ResourceType;

/// GET /api/mirror/:resource - rows in mirror order plus sync state
pub async fn mirror_get(State(state): State<AppState>, Path(resource): Path<String>) -> ApiResult<Value> {
    let resource: ResourceType = resource.parse()?;
    let rows = state.dashboard.mirror_json(resource)?;
    let meta = state.dashboard.summary(resource);

    Ok(ApiResponse::success(json!({
        "resource": resource,
        "rows": rows,
        "meta": meta,
    })))
}

/// POST /api/mirror/:resource/reload - fetch a fresh snapshot
pub async fn mirror_reload(State(state): State<AppState>, Path(resource): Path<String>) -> ApiResult<Value> {
    let resource: ResourceType = resource.parse()?;
    let count = state.dashboard.reload(resource).await?;
    tracing::info!("Reloaded {} via API ({} rows)", resource, count);

    Ok(ApiResponse::success(json!({
        "resource": resource,
        "count": count,
        "meta": state.dashboard.summary(resource),
    })))
}
