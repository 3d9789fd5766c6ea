//! Postgres-backed snapshots and change feed.
//!
//! Changes arrive through `LISTEN realtime_<table>`; the payload is published
//! by the trigger in `sql/realtime.sql`. Rows too large for a NOTIFY payload
//! are sent as their id and read back here before the frame is handed on.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::realtime::error::{FetchError, SubscriptionError};
use crate::realtime::event::RawChange;
use crate::realtime::feed::{ChangeFeed, FeedFrame, FeedStream};
use crate::realtime::snapshot::SnapshotSource;
use crate::types::ResourceType;

// insufficient_privilege, raised when row level security rejects the read
const INSUFFICIENT_PRIVILEGE: &str = "42501";

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(max_connections).connect(database_url).await
}

fn fetch_error(e: sqlx::Error) -> FetchError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE) => {
            FetchError::Unauthorized(db.message().to_string())
        }
        _ => FetchError::Transport(e.to_string()),
    }
}

pub struct PgSnapshotSource {
    pool: PgPool,
}

impl PgSnapshotSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    async fn fetch(&self, resource: ResourceType) -> Result<Vec<Value>, FetchError> {
        let (column, direction) = resource.snapshot_order();
        // row_to_json keeps column mapping out of the query
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"{}\" ORDER BY \"{}\" {} NULLS LAST) t",
            resource.table(),
            column,
            direction.to_sql()
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(fetch_error)?;

        rows.iter()
            .map(|row| row.try_get::<Value, _>("row").map_err(fetch_error))
            .collect()
    }
}

/// Change feed over Postgres `LISTEN/NOTIFY`
pub struct PgChangeFeed {
    pool: PgPool,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, reconnect_delay: Duration::from_secs(1), max_reconnect_attempts: 10 }
    }

    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }
}

async fn listen(pool: &PgPool, resource: ResourceType) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(&resource.channel()).await?;
    Ok(listener)
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn open(&self, resource: ResourceType) -> Result<Box<dyn FeedStream>, SubscriptionError> {
        let listener = listen(&self.pool, resource)
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;
        tracing::debug!("Listening on {}", resource.channel());

        Ok(Box::new(PgFeedStream {
            pool: self.pool.clone(),
            resource,
            listener: Some(listener),
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }))
    }
}

struct PgFeedStream {
    pool: PgPool,
    resource: ResourceType,
    // None while disconnected
    listener: Option<PgListener>,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
}

impl PgFeedStream {
    async fn reconnect(&self) -> Result<PgListener, SubscriptionError> {
        let mut last_error = String::from("no attempts made");
        for attempt in 1..=self.max_reconnect_attempts {
            tokio::time::sleep(self.reconnect_delay).await;
            match listen(&self.pool, self.resource).await {
                Ok(listener) => return Ok(listener),
                Err(e) => {
                    tracing::warn!(
                        "Reconnect attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_reconnect_attempts,
                        self.resource.channel(),
                        e
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(SubscriptionError::Dropped(format!(
            "gave up on {} after {} attempts: {}",
            self.resource.channel(),
            self.max_reconnect_attempts,
            last_error
        )))
    }
}

// Full current row for a truncated frame; None once it has been deleted
async fn read_back(pool: &PgPool, resource: ResourceType, id: &str) -> Result<Option<Value>, sqlx::Error> {
    let sql = format!("SELECT row_to_json(t) AS row FROM \"{}\" t WHERE t.id::text = $1", resource.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.map(|row| row.try_get::<Value, _>("row")).transpose()
}

async fn resolve(pool: &PgPool, resource: ResourceType, raw: RawChange) -> Option<RawChange> {
    let Some(id) = raw.truncated_id() else {
        return Some(raw);
    };
    match read_back(pool, resource, &id).await {
        Ok(Some(row)) => Some(raw.resolve(row)),
        Ok(None) => {
            tracing::debug!("{} '{}' is gone before its oversized change was read back", resource, id);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read back oversized {} row '{}': {}", resource, id, e);
            None
        }
    }
}

#[async_trait]
impl FeedStream for PgFeedStream {
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>, SubscriptionError> {
        loop {
            let Some(listener) = self.listener.as_mut() else {
                self.listener = Some(self.reconnect().await?);
                return Ok(Some(FeedFrame::Reconnected));
            };

            match listener.try_recv().await {
                Ok(Some(notification)) => match serde_json::from_str::<RawChange>(notification.payload()) {
                    Ok(raw) => {
                        if let Some(raw) = resolve(&self.pool, self.resource, raw).await {
                            return Ok(Some(FeedFrame::Change(raw)));
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring unparseable notification on {}: {}", notification.channel(), e),
                },
                Ok(None) => {
                    self.listener = None;
                    return Ok(Some(FeedFrame::Disconnected));
                }
                Err(e) => {
                    tracing::warn!("Listener on {} failed: {}", self.resource.channel(), e);
                    self.listener = None;
                    return Ok(Some(FeedFrame::Disconnected));
                }
            }
        }
    }
}
