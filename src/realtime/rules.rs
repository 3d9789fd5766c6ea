//! Per-resource notification rules.
//!
//! Classification is a pure function of the event kind and the row the
//! event landed on. A change the mirror already reflected (`Confirmed`)
//! still notifies. Redeliveries (`Unchanged`) and `Buffered` events never
//! produce a notification; buffered events are classified when they are
//! replayed.

use crate::models::{Client, Deal, DealStage, Event, InventoryItem, Resource};
use crate::notifications::Notification;
use crate::realtime::event::ChangeEvent;
use crate::realtime::mirror::Applied;
use crate::types::ChangeKind;

/// Business rules mapping a change of `Self` to at most one notification
pub trait NotificationRules: Resource {
    fn notification(kind: ChangeKind, row: &Self) -> Option<Notification>;
}

/// Map an applied event to zero or one notification
pub fn classify<R: NotificationRules>(event: &ChangeEvent<R>, applied: &Applied<R>) -> Option<Notification> {
    let row = applied.row()?;
    R::notification(event.kind(), row)
}

impl NotificationRules for Event {
    fn notification(kind: ChangeKind, row: &Self) -> Option<Notification> {
        Some(match kind {
            ChangeKind::Insert => Notification::success(
                "New Event Created",
                format!("{} - {} attendees", row.title, row.attendees),
            ),
            ChangeKind::Update => Notification::info(
                "Event Updated",
                format!("{} status changed to {}", row.title, row.status),
            ),
            ChangeKind::Delete => {
                Notification::warning("Event Deleted", format!("{} has been removed", row.title))
            }
        })
    }
}

impl NotificationRules for Client {
    fn notification(kind: ChangeKind, row: &Self) -> Option<Notification> {
        Some(match kind {
            ChangeKind::Insert => Notification::success(
                "New Client Added",
                format!("{} - {} tier", row.name, row.tier),
            ),
            ChangeKind::Update => {
                Notification::info("Client Updated", format!("{} information updated", row.name))
            }
            ChangeKind::Delete => {
                Notification::warning("Client Removed", format!("{} has been removed", row.name))
            }
        })
    }
}

impl NotificationRules for InventoryItem {
    // Only stock depletion is alert-worthy
    fn notification(kind: ChangeKind, row: &Self) -> Option<Notification> {
        match kind {
            ChangeKind::Update if row.is_low_stock() => Some(Notification::warning(
                "Low Inventory Alert",
                format!("{} is running low ({} {})", row.name, row.quantity, row.unit),
            )),
            _ => None,
        }
    }
}

impl NotificationRules for Deal {
    fn notification(kind: ChangeKind, row: &Self) -> Option<Notification> {
        Some(match kind {
            ChangeKind::Insert => Notification::info(
                "New Deal Added",
                format!("{} worth ${}", row.display_title(), row.value),
            ),
            ChangeKind::Update if row.stage == DealStage::Signed => {
                Notification::success("Deal Closed!", format!("Contract signed for ${}", row.value))
            }
            ChangeKind::Update => Notification::info(
                "Deal Updated",
                format!("{} moved to {}", row.display_title(), row.stage),
            ),
            ChangeKind::Delete => Notification::warning(
                "Deal Removed",
                format!("{} has been removed", row.display_title()),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Severity;
    use serde_json::json;

    fn item(quantity: i64) -> InventoryItem {
        serde_json::from_value(json!({
            "id": "i1", "name": "Champagne flutes", "category": "glassware",
            "quantity": quantity, "unit": "boxes"
        }))
        .unwrap()
    }

    fn replaced<R: Clone>(row: R) -> Applied<R> {
        Applied::Replaced { previous: row.clone(), current: row }
    }

    #[test]
    fn low_stock_update_warns_once() {
        let low = item(9);
        let n = classify(&ChangeEvent::update(low.clone(), 0), &replaced(low)).unwrap();
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.title, "Low Inventory Alert");
        assert_eq!(n.message, "Champagne flutes is running low (9 boxes)");

        let plenty = item(11);
        assert!(classify(&ChangeEvent::update(plenty.clone(), 1), &replaced(plenty)).is_none());
    }

    #[test]
    fn inventory_insert_and_delete_are_silent() {
        let low = item(1);
        assert!(classify(&ChangeEvent::insert(low.clone(), 0), &Applied::Inserted(low.clone())).is_none());
        assert!(classify(&ChangeEvent::<InventoryItem>::delete("i1", 1), &Applied::Removed(low)).is_none());
    }

    #[test]
    fn signed_deal_is_a_success() {
        let deal: Deal =
            serde_json::from_value(json!({ "id": "d1", "stage": "signed", "value": 1000 })).unwrap();
        let n = classify(&ChangeEvent::update(deal.clone(), 0), &replaced(deal)).unwrap();
        assert_eq!(n.severity, Severity::Success);
        assert_eq!(n.title, "Deal Closed!");
        assert!(n.message.contains("1000"), "message: {}", n.message);
    }

    #[test]
    fn other_deal_updates_are_info() {
        let deal: Deal = serde_json::from_value(json!({
            "id": "d1", "title": "Spring gala", "stage": "consulting", "value": 250
        }))
        .unwrap();
        let n = classify(&ChangeEvent::update(deal.clone(), 0), &replaced(deal)).unwrap();
        assert_eq!(n.severity, Severity::Info);
        assert_eq!(n.message, "Spring gala moved to consulting");
    }

    #[test]
    fn delete_uses_the_removed_row() {
        let client: Client =
            serde_json::from_value(json!({ "id": "c1", "name": "Acme", "tier": "premium" })).unwrap();
        let n = classify(&ChangeEvent::<Client>::delete("c1", 0), &Applied::Removed(client)).unwrap();
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.message, "Acme has been removed");
    }

    #[test]
    fn duplicate_and_buffered_deliveries_are_silent() {
        let client: Client =
            serde_json::from_value(json!({ "id": "c1", "name": "Acme" })).unwrap();
        let event = ChangeEvent::insert(client, 0);
        assert!(classify(&event, &Applied::Unchanged).is_none());
        assert!(classify(&event, &Applied::Buffered).is_none());
    }

    #[test]
    fn confirmed_changes_still_notify() {
        let deal: Deal =
            serde_json::from_value(json!({ "id": "d1", "stage": "signed", "value": 1000 })).unwrap();
        let n = classify(&ChangeEvent::update(deal.clone(), 0), &Applied::Confirmed(deal.clone())).unwrap();
        assert_eq!(n.title, "Deal Closed!");

        let removed = classify(&ChangeEvent::<Deal>::delete("d1", 1), &Applied::Confirmed(deal)).unwrap();
        assert_eq!(removed.title, "Deal Removed");
    }

    #[test]
    fn event_messages_follow_the_rules_table() {
        let row: Event = serde_json::from_value(json!({
            "id": "e1", "title": "Harbor wedding", "date": "2024-08-10T16:00:00Z",
            "attendees": 120, "status": "in_progress"
        }))
        .unwrap();

        let created = classify(&ChangeEvent::insert(row.clone(), 0), &Applied::Inserted(row.clone())).unwrap();
        assert_eq!(created.severity, Severity::Success);
        assert_eq!(created.message, "Harbor wedding - 120 attendees");

        let updated = classify(&ChangeEvent::update(row.clone(), 1), &replaced(row)).unwrap();
        assert_eq!(updated.message, "Harbor wedding status changed to in_progress");
    }
}
