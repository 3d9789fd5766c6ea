use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use super::AppState;
use crate::types::ResourceType;

/// GET /health - healthy once every mirror is bootstrapped and streaming
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let resources: Vec<_> = ResourceType::ALL.iter().map(|r| state.dashboard.summary(*r)).collect();

    let healthy = ResourceType::ALL.iter().all(|r| {
        state.dashboard.is_bootstrapped(*r)
            && state.dashboard.status(*r).map_or(false, |s| s.is_connected())
    });

    if healthy {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "resources": resources
                }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "realtime sync degraded",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "resources": resources
                }
            })),
        )
    }
}
