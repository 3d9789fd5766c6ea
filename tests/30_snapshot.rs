mod common;

use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;

use common::{eventually, Harness, WAIT};
use ops_realtime::config::SyncConfig;
use ops_realtime::realtime::{FetchError, MirrorPhase};
use ops_realtime::ResourceType;

#[tokio::test]
async fn timed_out_snapshot_leaves_mirror_empty_until_retry() -> Result<()> {
    let h = Harness::with_config(SyncConfig { snapshot_timeout_ms: 30, ..SyncConfig::default() });
    h.snapshots.set_rows(ResourceType::Clients, vec![json!({ "id": "c1", "name": "Acme" })]);

    let hold = h.snapshots.hold(ResourceType::Clients);
    let err = h.dashboard.reload(ResourceType::Clients).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout { resource: ResourceType::Clients, .. }), "got {:?}", err);
    assert!(!h.dashboard.is_bootstrapped(ResourceType::Clients));
    assert!(h.dashboard.clients().list().is_empty());

    hold.release();
    assert_eq!(h.dashboard.reload(ResourceType::Clients).await?, 1);
    assert_eq!(h.dashboard.clients().get("c1").context("c1 missing")?.name, "Acme");
    Ok(())
}

#[tokio::test]
async fn start_reports_each_resource_separately() -> Result<()> {
    let h = Harness::new();
    h.snapshots.fail_next(ResourceType::Clients, FetchError::Unauthorized("permission denied for table clients".into()));

    let results = h.dashboard.start().await;
    assert_eq!(results.len(), 4);
    for (resource, result) in &results {
        match resource {
            ResourceType::Clients => assert!(matches!(result, Err(FetchError::Unauthorized(_)))),
            _ => assert!(result.is_ok(), "{} failed: {:?}", resource, result),
        }
    }
    assert!(!h.dashboard.is_bootstrapped(ResourceType::Clients));
    assert!(h.dashboard.is_bootstrapped(ResourceType::Events));
    Ok(())
}

#[tokio::test]
async fn one_invalid_row_fails_the_whole_snapshot() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(
        ResourceType::Pipeline,
        vec![
            json!({ "id": "d1", "stage": "signed", "value": 10 }),
            json!({ "id": "d2", "stage": "lost", "value": 10 }),
        ],
    );

    let err = h.dashboard.reload(ResourceType::Pipeline).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { resource: ResourceType::Pipeline, .. }));
    assert!(h.dashboard.pipeline().is_empty());
    Ok(())
}

#[tokio::test]
async fn reload_keeps_serving_old_rows_until_the_new_snapshot_lands() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(ResourceType::Clients, vec![json!({ "id": "c1", "name": "Acme" })]);
    h.start().await?;

    h.snapshots.set_rows(ResourceType::Clients, vec![json!({ "id": "c2", "name": "Birch & Co" })]);
    let hold = h.snapshots.hold(ResourceType::Clients);
    let reload = tokio::spawn({
        let dashboard = h.dashboard.clone();
        async move { dashboard.reload(ResourceType::Clients).await }
    });

    eventually(|| h.dashboard.clients().phase() == MirrorPhase::Reloading).await?;
    assert!(h.dashboard.clients().get("c1").is_some());

    hold.release();
    assert_eq!(reload.await??, 1);
    assert!(h.dashboard.clients().get("c1").is_none());
    assert!(h.dashboard.clients().get("c2").is_some());
    Ok(())
}

#[tokio::test]
async fn buffered_events_survive_a_failed_load() -> Result<()> {
    let h = Harness::new();
    let clients = h.dashboard.clients();
    clients.subscribe();
    h.wait_status(ResourceType::Clients, |s| s.is_connected()).await?;

    h.snapshots.fail_next(ResourceType::Clients, FetchError::Transport("connection reset".into()));
    assert!(clients.load().await.is_err());

    h.feed.insert(ResourceType::Clients, json!({ "id": "c1", "name": "Acme", "tier": "premium" }));
    eventually(|| clients.summary().pending == 1).await?;
    assert!(h.dashboard.notifications().is_empty());

    assert_eq!(clients.load().await?, 1);
    assert!(clients.get("c1").is_some());
    assert_eq!(h.dashboard.notifications().len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_loads_are_serialized() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(ResourceType::Inventory, vec![json!({
        "id": "i1", "name": "Forks", "category": "cutlery", "quantity": 300, "unit": "pcs"
    })]);

    let (a, b) = tokio::join!(
        h.dashboard.reload(ResourceType::Inventory),
        h.dashboard.reload(ResourceType::Inventory)
    );
    assert_eq!(a?, 1);
    assert_eq!(b?, 1);
    assert_eq!(h.snapshots.fetch_count(ResourceType::Inventory), 2);

    tokio::time::timeout(WAIT, async {
        while h.dashboard.inventory().phase() != MirrorPhase::Live {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}
