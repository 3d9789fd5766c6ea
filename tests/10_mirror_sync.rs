mod common;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::json;

use common::{eventually, Harness, WAIT};
use ops_realtime::models::DealStage;
use ops_realtime::realtime::MirrorPhase;
use ops_realtime::{ResourceType, Severity};

#[tokio::test]
async fn signed_deal_updates_mirror_and_announces_success() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(
        ResourceType::Pipeline,
        vec![json!({ "id": "d1", "title": "Harbor gala", "stage": "negotiation", "value": 1000 })],
    );
    h.start().await?;

    h.feed.update(
        ResourceType::Pipeline,
        json!({ "id": "d1", "title": "Harbor gala", "stage": "signed", "value": 1000 }),
    );

    let pipeline = h.dashboard.pipeline();
    assert!(pipeline.wait_until(WAIT, |m| m.get("d1").map_or(false, |d| d.stage == DealStage::Signed)).await);
    assert_eq!(pipeline.len(), 1);

    let notifications = h.dashboard.notifications().list();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, Severity::Success);
    assert_eq!(notifications[0].title, "Deal Closed!");
    assert!(notifications[0].message.contains("1000"), "message: {}", notifications[0].message);
    Ok(())
}

#[tokio::test]
async fn client_insert_then_delete_leaves_two_unread_notifications() -> Result<()> {
    let h = Harness::new();
    h.start().await?;
    let clients = h.dashboard.clients();

    h.feed.insert(ResourceType::Clients, json!({ "id": "c1", "name": "Acme", "tier": "premium" }));
    clients.wait_for_row("c1", WAIT).await.context("insert not reflected")?;

    h.feed.delete(ResourceType::Clients, "c1");
    assert!(clients.wait_for_removal("c1", WAIT).await);
    assert!(clients.is_empty());

    let store = h.dashboard.notifications();
    let list = store.list();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].severity, Severity::Warning);
    assert_eq!(list[0].message, "Acme has been removed");
    assert_eq!(list[1].severity, Severity::Success);
    assert_eq!(list[1].message, "Acme - premium tier");
    assert_eq!(store.unread_count(), 2);
    Ok(())
}

#[tokio::test]
async fn changes_committed_during_snapshot_are_replayed_in_order() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(
        ResourceType::Pipeline,
        vec![json!({ "id": "d1", "stage": "negotiation", "value": 500 })],
    );
    let pipeline = h.dashboard.pipeline().clone();

    pipeline.subscribe();
    h.wait_status(ResourceType::Pipeline, |s| s.is_connected()).await?;

    let hold = h.snapshots.hold(ResourceType::Pipeline);
    let load = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.load().await }
    });

    h.feed.update(ResourceType::Pipeline, json!({ "id": "d1", "stage": "consulting", "value": 750 }));
    h.feed.insert(ResourceType::Pipeline, json!({ "id": "d2", "stage": "negotiation", "value": 200 }));

    eventually(|| pipeline.summary().pending == 2).await?;
    assert_eq!(pipeline.phase(), MirrorPhase::Unbootstrapped);
    assert!(pipeline.list().is_empty());
    assert!(h.dashboard.notifications().is_empty());

    hold.release();
    assert_eq!(load.await??, 2);

    let rows = pipeline.list();
    let ids: Vec<&str> = rows.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2"]);
    assert_eq!(rows[0].stage, DealStage::Consulting);
    assert_eq!(rows[0].value, Decimal::from(750));

    let titles: Vec<String> = h.dashboard.notifications().list().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["New Deal Added", "Deal Updated"]);
    Ok(())
}

#[tokio::test]
async fn redeliveries_do_not_notify() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(ResourceType::Clients, vec![json!({ "id": "c1", "name": "Acme" })]);
    h.start().await?;

    // a delete for something never seen, then the same insert twice
    h.feed.delete(ResourceType::Clients, "ghost");
    h.feed.insert(ResourceType::Clients, json!({ "id": "c2", "name": "Birch & Co" }));
    h.feed.insert(ResourceType::Clients, json!({ "id": "c2", "name": "Birch & Co" }));
    h.feed.insert(ResourceType::Clients, json!({ "id": "c3", "name": "Cedar Hall" }));
    h.dashboard.clients().wait_for_row("c3", WAIT).await.context("c3 not reflected")?;

    let messages: Vec<String> = h.dashboard.notifications().list().into_iter().map(|n| n.message).collect();
    assert_eq!(messages, vec!["Cedar Hall - standard tier", "Birch & Co - standard tier"]);
    assert_eq!(h.dashboard.clients().len(), 3);
    Ok(())
}

#[tokio::test]
async fn buffered_update_already_in_the_snapshot_still_notifies() -> Result<()> {
    let h = Harness::new();
    let signed = json!({ "id": "d1", "title": "Harbor gala", "stage": "signed", "value": 1000 });
    h.snapshots.set_rows(ResourceType::Pipeline, vec![signed.clone()]);
    let pipeline = h.dashboard.pipeline().clone();

    pipeline.subscribe();
    h.wait_status(ResourceType::Pipeline, |s| s.is_connected()).await?;

    // the snapshot read sees the commit, and the change event arrives mid-load
    let hold = h.snapshots.hold(ResourceType::Pipeline);
    let load = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.load().await }
    });
    h.feed.update(ResourceType::Pipeline, signed);
    eventually(|| pipeline.summary().pending == 1).await?;

    hold.release();
    assert_eq!(load.await??, 1);

    let list = h.dashboard.notifications().list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, "Deal Closed!");
    assert_eq!(list[0].message, "Contract signed for $1000");
    Ok(())
}

#[tokio::test]
async fn events_stay_sorted_by_date() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(
        ResourceType::Events,
        vec![
            json!({ "id": "e2", "title": "Autumn banquet", "date": "2024-10-01T18:00:00Z", "attendees": 80 }),
            json!({ "id": "e1", "title": "Summer picnic", "date": "2024-07-01T12:00:00Z", "attendees": 40 }),
        ],
    );
    h.start().await?;

    h.feed.insert(
        ResourceType::Events,
        json!({ "id": "e0", "title": "Spring brunch", "date": "2024-04-01T10:00:00Z", "attendees": 25 }),
    );
    h.dashboard.events().wait_for_row("e0", WAIT).await.context("e0 not reflected")?;

    let ids: Vec<String> = h.dashboard.events().list().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["e0", "e1", "e2"]);

    let created = &h.dashboard.notifications().list()[0];
    assert_eq!(created.title, "New Event Created");
    assert_eq!(created.message, "Spring brunch - 25 attendees");
    Ok(())
}

#[tokio::test]
async fn low_stock_update_raises_one_warning() -> Result<()> {
    let h = Harness::new();
    h.snapshots.set_rows(
        ResourceType::Inventory,
        vec![json!({ "id": "i1", "name": "Napkins", "category": "linen", "quantity": 40, "unit": "packs" })],
    );
    h.start().await?;
    let inventory = h.dashboard.inventory();

    h.feed.update(
        ResourceType::Inventory,
        json!({ "id": "i1", "name": "Napkins", "category": "linen", "quantity": 11, "unit": "packs" }),
    );
    h.feed.update(
        ResourceType::Inventory,
        json!({ "id": "i1", "name": "Napkins", "category": "linen", "quantity": 9, "unit": "packs" }),
    );
    assert!(inventory.wait_until(WAIT, |m| m.get("i1").map_or(false, |i| i.quantity == Decimal::from(9))).await);

    let list = h.dashboard.notifications().list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].severity, Severity::Warning);
    assert_eq!(list[0].message, "Napkins is running low (9 packs)");
    Ok(())
}
