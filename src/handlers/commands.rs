use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ApiResponse, ApiResult, AppState};
use crate::backend::commands::{CommandAction, CommandError};
use crate::error::ApiError;
use crate::types::ResourceType;

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    /// Wait up to this long for the change to show in the mirror
    pub wait_ms: Option<u64>,
}

/// POST /api/commands/:resource/:action - forward to the command API
///
/// The response reports whether the change was reflected locally when
/// `wait_ms` is given; `reflected: null` otherwise.
pub async fn command_post(
    State(state): State<AppState>,
    Path((resource, action)): Path<(String, String)>,
    Query(query): Query<CommandQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let resource: ResourceType = resource.parse()?;
    let action: CommandAction = action.parse().map_err(ApiError::bad_request)?;
    let commands = state.commands.as_ref().ok_or(CommandError::Unavailable)?;

    let payload_id = payload.get("id").and_then(Value::as_str).map(str::to_string);
    if action != CommandAction::Create && payload_id.is_none() {
        return Err(ApiError::bad_request(format!("{} requires an 'id'", action)));
    }

    let before = match (action, payload_id.as_deref()) {
        (CommandAction::Update, Some(id)) => state.dashboard.row_json(resource, id),
        _ => None,
    };
    let result = commands.execute(resource, action, payload).await?;
    tracing::info!("{} {} accepted", action, resource);

    // created rows get their id from the backend
    let id = payload_id.or_else(|| {
        result
            .get("id")
            .or_else(|| result.get("data").and_then(|d| d.get("id")))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let reflected = match (query.wait_ms, id.as_deref()) {
        (Some(ms), Some(id)) => Some(
            state
                .dashboard
                .wait_for_reflection(resource, action, id, before, Duration::from_millis(ms))
                .await,
        ),
        _ => None,
    };

    Ok(ApiResponse::success(json!({
        "result": result,
        "reflected": reflected,
    })))
}
