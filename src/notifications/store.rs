use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::Notification;

/// Retained history when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 100;

struct Inner {
    // most recent first
    items: VecDeque<Notification>,
    unread: usize,
}

/// Ordered, capped notification list shared by every resource sync.
///
/// All mutation goes through one mutex so prepend order and the unread
/// count stay consistent under concurrent `add`s from different resources.
pub struct NotificationStore {
    inner: Mutex<Inner>,
    capacity: usize,
    added: broadcast::Sender<Notification>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        let (added, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner { items: VecDeque::new(), unread: 0 }),
            capacity: capacity.max(1),
            added,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepend and count as unread, evicting the oldest beyond capacity
    pub fn add(&self, notification: Notification) {
        {
            let mut inner = self.lock();
            if !notification.read {
                inner.unread += 1;
            }
            inner.items.push_front(notification.clone());

            while inner.items.len() > self.capacity {
                evict_oldest(&mut inner);
            }
        }
        // nobody listening is fine
        let _ = self.added.send(notification);
    }

    /// No-op when already read or absent
    pub fn mark_as_read(&self, id: Uuid) -> bool {
        let mut inner = self.lock();
        let Some(item) = inner.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if item.read {
            return false;
        }
        item.read = true;
        inner.unread -= 1;
        true
    }

    pub fn mark_all_as_read(&self) {
        let mut inner = self.lock();
        for item in inner.items.iter_mut() {
            item.read = true;
        }
        inner.unread = 0;
    }

    /// Remove regardless of read state; returns the removed notification
    pub fn clear(&self, id: Uuid) -> Option<Notification> {
        let mut inner = self.lock();
        let pos = inner.items.iter().position(|n| n.id == id)?;
        let removed = inner.items.remove(pos)?;
        if !removed.read {
            inner.unread -= 1;
        }
        Some(removed)
    }

    pub fn clear_all(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.unread = 0;
    }

    /// Copy of the list, most recent first
    pub fn list(&self) -> Vec<Notification> {
        self.lock().items.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().unread
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Receive a copy of every notification added from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.added.subscribe()
    }
}

// Oldest first; among equally old entries a read one goes before an unread one
fn evict_oldest(inner: &mut Inner) {
    let Some(oldest) = inner.items.back().map(|n| n.created_at) else {
        return;
    };

    let victim = inner
        .items
        .iter()
        .enumerate()
        .rev()
        .take_while(|(_, n)| n.created_at == oldest)
        .find(|(_, n)| n.read)
        .map(|(i, _)| i)
        .unwrap_or(inner.items.len() - 1);

    if let Some(evicted) = inner.items.remove(victim) {
        if !evicted.read {
            inner.unread -= 1;
        }
        tracing::debug!("Evicted notification {} ({})", evicted.id, evicted.title);
    }
}
