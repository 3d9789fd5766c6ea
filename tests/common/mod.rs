#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use ops_realtime::backend::memory::{MemoryFeed, MemorySnapshots};
use ops_realtime::config::{ApiConfig, SyncConfig};
use ops_realtime::handlers::{router, AppState};
use ops_realtime::realtime::SubscriptionStatus;
use ops_realtime::{Dashboard, ResourceType};

pub const WAIT: Duration = Duration::from_secs(2);

/// A dashboard wired to in-memory backends the test can script
pub struct Harness {
    pub snapshots: Arc<MemorySnapshots>,
    pub feed: Arc<MemoryFeed>,
    pub dashboard: Arc<Dashboard>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        let snapshots = Arc::new(MemorySnapshots::new());
        let feed = Arc::new(MemoryFeed::new());
        let dashboard = Arc::new(Dashboard::new(snapshots.clone(), feed.clone(), &config, 100));
        Self { snapshots, feed, dashboard }
    }

    /// Start everything and wait until all four streams are connected
    pub async fn start(&self) -> Result<()> {
        for (resource, result) in self.dashboard.start().await {
            result.with_context(|| format!("loading {}", resource))?;
        }
        for resource in ResourceType::ALL {
            self.wait_status(resource, |s| s.is_connected()).await?;
        }
        Ok(())
    }

    pub async fn wait_status<F>(&self, resource: ResourceType, pred: F) -> Result<()>
    where
        F: Fn(&SubscriptionStatus) -> bool,
    {
        let dashboard = self.dashboard.clone();
        eventually(move || dashboard.status(resource).as_ref().map_or(false, &pred))
            .await
            .with_context(|| format!("{} status is {:?}", resource, self.dashboard.status(resource)))
    }

    pub fn app(&self) -> Router {
        self.app_with_state(AppState::new(self.dashboard.clone()))
    }

    pub fn app_with_state(&self, state: AppState) -> Router {
        let config = ApiConfig {
            port: 0,
            enable_cors: false,
            cors_origins: Vec::new(),
            enable_request_logging: false,
        };
        router(state, &config)
    }
}

/// Route crate logs through the test harness; RUST_LOG=debug to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it holds or `WAIT` elapses
pub async fn eventually<F: Fn() -> bool>(check: F) -> Result<()> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("condition not met within {:?}", WAIT)
}

/// Drive one request through the router without a server
pub async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json)?)
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body)?).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, value))
}
