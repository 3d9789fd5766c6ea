// handlers/mod.rs - HTTP read surface over the dashboard
//
// Mirrors and notifications are served straight from memory; only reload
// and commands reach the backend.

pub mod commands;
pub mod health;
pub mod mirror;
pub mod notifications;
pub mod response;

pub use response::{ApiResponse, ApiResult};

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::commands::CommandApi;
use crate::config::ApiConfig;
use crate::dashboard::Dashboard;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub commands: Option<Arc<dyn CommandApi>>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>) -> Self {
        Self { dashboard, commands: None }
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandApi>) -> Self {
        self.commands = Some(commands);
        self
    }
}

pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .merge(mirror_routes())
        .merge(notification_routes())
        .route("/api/commands/:resource/:action", post(commands::command_post))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(cors_layer(&config.cors_origins));
    }
    if config.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }
    app
}

fn mirror_routes() -> Router<AppState> {
    Router::new()
        .route("/api/mirror/:resource", get(mirror::mirror_get))
        .route("/api/mirror/:resource/reload", post(mirror::mirror_reload))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(notifications::list).delete(notifications::clear_all),
        )
        .route("/api/notifications/read-all", post(notifications::read_all))
        .route("/api/notifications/:id/read", post(notifications::read_one))
        .route("/api/notifications/:id", delete(notifications::clear_one))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}
