use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Resource;
use crate::realtime::error::FetchError;
use crate::types::ResourceType;

/// Read-only bulk query returning every row of a collection in its
/// canonical order (see `ResourceType::snapshot_order`)
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, resource: ResourceType) -> Result<Vec<Value>, FetchError>;
}

/// One-shot typed snapshot fetch with an optional deadline. No retries.
#[derive(Clone)]
pub struct SnapshotLoader {
    source: Arc<dyn SnapshotSource>,
    timeout: Option<Duration>,
}

impl SnapshotLoader {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self { source, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn load<R: Resource>(&self) -> Result<Vec<R>, FetchError> {
        let resource = R::RESOURCE;
        let fetch = self.source.fetch(resource);

        let raw = match self.timeout {
            Some(after) => tokio::time::timeout(after, fetch)
                .await
                .map_err(|_| FetchError::Timeout { resource, after })??,
            None => fetch.await?,
        };

        raw.into_iter()
            .map(|value| {
                serde_json::from_value::<R>(value)
                    .map_err(|e| FetchError::Decode { resource, message: e.to_string() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemorySnapshots;
    use crate::models::Client;
    use serde_json::json;

    #[tokio::test]
    async fn load_decodes_rows_in_source_order() {
        let source = Arc::new(MemorySnapshots::new());
        source.set_rows(
            ResourceType::Clients,
            vec![json!({ "id": "c2", "name": "Birch & Co" }), json!({ "id": "c1", "name": "Acme" })],
        );

        let rows = SnapshotLoader::new(source).load::<Client>().await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn invalid_row_fails_the_load() {
        let source = Arc::new(MemorySnapshots::new());
        source.set_rows(ResourceType::Clients, vec![json!({ "id": "c1" })]);

        let err = SnapshotLoader::new(source).load::<Client>().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { resource: ResourceType::Clients, .. }));
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let source = Arc::new(MemorySnapshots::new());
        let _hold = source.hold(ResourceType::Clients);

        let err = SnapshotLoader::new(source)
            .with_timeout(Duration::from_millis(20))
            .load::<Client>()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }
}
