//! Client-side mirror of one resource collection.
//!
//! A mirror starts unbootstrapped and buffers every event it is handed until
//! a snapshot arrives. `bootstrap` installs the snapshot and then replays the
//! buffer in arrival order before anything else can be applied. Once live,
//! `apply` is a total state transition: inserts and updates are both upserts
//! keyed by id, deletes of unknown ids are no-ops.
//!
//! An event that finds the mirror already in its target state is either a
//! redelivery (same kind as the last change applied to that id, reported as
//! `Unchanged`) or a change the mirror already reflects, typically because
//! the snapshot was read after the commit (reported as `Confirmed`).

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use crate::models::Resource;
use crate::realtime::event::{Change, ChangeEvent};
use crate::types::ChangeKind;

/// Default cap on events buffered while a snapshot is in flight
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Placement of rows within a mirror
pub enum MirrorOrder<R> {
    /// Kept sorted by the comparator; equal keys keep arrival order
    Sorted(fn(&R, &R) -> Ordering),
    /// New rows go to the front
    Prepend,
    /// New rows go to the back
    Append,
}

impl<R> Clone for MirrorOrder<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for MirrorOrder<R> {}

/// Outcome of handing one event to the mirror
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<R> {
    Inserted(R),
    Replaced { previous: R, current: R },
    Removed(R),
    /// Mirror already held this state; the event is still a distinct change.
    /// Carries the row it concerns (the removed row for a delete).
    Confirmed(R),
    /// Redelivery of the last change applied to this id, or delete of an
    /// id the mirror never held
    Unchanged,
    /// Held until the pending snapshot lands
    Buffered,
}

impl<R> Applied<R> {
    /// Row the change landed on: the current row, or the one just removed
    pub fn row(&self) -> Option<&R> {
        match self {
            Applied::Inserted(row) | Applied::Removed(row) | Applied::Confirmed(row) => Some(row),
            Applied::Replaced { current, .. } => Some(current),
            Applied::Unchanged | Applied::Buffered => None,
        }
    }

    /// Whether the visible rows changed
    pub fn is_effective(&self) -> bool {
        matches!(self, Applied::Inserted(_) | Applied::Replaced { .. } | Applied::Removed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    /// No snapshot yet; reads see nothing, events are buffered
    Unbootstrapped,
    /// Snapshot reload in flight; reads see the previous rows, events are buffered
    Reloading,
    Live,
}

pub struct Mirror<R: Resource> {
    rows: HashMap<String, R>,
    order: Vec<String>,
    placement: MirrorOrder<R>,
    phase: MirrorPhase,
    pending: VecDeque<ChangeEvent<R>>,
    max_pending: usize,
    version: u64,
    // kind of the last change applied per id, reset by bootstrap
    last_kind: HashMap<String, ChangeKind>,
}

impl<R: Resource> Default for Mirror<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> Mirror<R> {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
            placement: R::mirror_order(),
            phase: MirrorPhase::Unbootstrapped,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            version: 0,
            last_kind: HashMap::new(),
        }
    }

    pub fn phase(&self) -> MirrorPhase {
        self.phase
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.phase != MirrorPhase::Unbootstrapped
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.rows.get(id)
    }

    /// Rows in mirror order
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.order.iter().filter_map(move |id| self.rows.get(id))
    }

    /// Owned copy of the current ordered view
    pub fn list(&self) -> Vec<R> {
        self.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bumped on every visible state change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Start buffering ahead of a snapshot reload. A live mirror keeps
    /// serving its current rows until `bootstrap` or `abort_load`.
    pub fn begin_load(&mut self) {
        if self.phase == MirrorPhase::Live {
            self.phase = MirrorPhase::Reloading;
        }
    }

    /// Replace the whole content with `rows`, then replay buffered events.
    /// Returns the replayed events with their outcomes, in replay order.
    pub fn bootstrap(&mut self, rows: Vec<R>) -> Vec<(ChangeEvent<R>, Applied<R>)> {
        // replayed deletes the snapshot already reflects are named from here
        let previous = std::mem::take(&mut self.rows);
        self.order.clear();
        self.last_kind.clear();

        for row in rows {
            let id = row.id().to_string();
            if self.rows.insert(id.clone(), row).is_some() {
                tracing::warn!("Duplicate {} id '{}' in snapshot, keeping the later row", R::RESOURCE, id);
                continue;
            }
            self.order.push(id);
        }

        if let MirrorOrder::Sorted(cmp) = self.placement {
            let rows = &self.rows;
            self.order.sort_by(|a, b| match (rows.get(a), rows.get(b)) {
                (Some(a), Some(b)) => cmp(a, b),
                _ => Ordering::Equal,
            });
        }

        self.phase = MirrorPhase::Live;
        self.version += 1;

        let replayed = self.drain_pending(&previous);
        tracing::debug!(
            "Bootstrapped {} mirror with {} rows, replayed {} buffered events",
            R::RESOURCE,
            self.order.len(),
            replayed.len()
        );
        replayed
    }

    /// Give up on an in-flight reload. A mirror that was live goes back to
    /// live on its old rows and replays the buffer; an unbootstrapped one
    /// stays empty and keeps buffering.
    pub fn abort_load(&mut self) -> Vec<(ChangeEvent<R>, Applied<R>)> {
        match self.phase {
            MirrorPhase::Reloading => {
                self.phase = MirrorPhase::Live;
                self.drain_pending(&HashMap::new())
            }
            MirrorPhase::Unbootstrapped | MirrorPhase::Live => Vec::new(),
        }
    }

    /// Apply one event. Never fails.
    pub fn apply(&mut self, event: &ChangeEvent<R>) -> Applied<R> {
        if self.phase != MirrorPhase::Live {
            self.buffer(event.clone());
            return Applied::Buffered;
        }
        self.apply_live(event, &HashMap::new())
    }

    fn buffer(&mut self, event: ChangeEvent<R>) {
        if self.pending.len() >= self.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    "{} buffer full ({} events), dropping oldest buffered event seq={}",
                    R::RESOURCE,
                    self.max_pending,
                    dropped.sequence
                );
            }
        }
        self.pending.push_back(event);
    }

    fn drain_pending(&mut self, previous: &HashMap<String, R>) -> Vec<(ChangeEvent<R>, Applied<R>)> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|event| {
                let applied = self.apply_live(&event, previous);
                (event, applied)
            })
            .collect()
    }

    fn apply_live(&mut self, event: &ChangeEvent<R>, previous: &HashMap<String, R>) -> Applied<R> {
        let kind = event.kind();
        let redelivery = self.last_kind.get(event.row_id()) == Some(&kind);
        let applied = match &event.change {
            Change::Insert(row) | Change::Update(row) => self.upsert(row, redelivery),
            Change::Delete { id } => self.remove(id, redelivery, previous),
        };
        if applied.is_effective() {
            self.version += 1;
        }
        if applied.row().is_some() {
            self.last_kind.insert(event.row_id().to_string(), kind);
        }
        applied
    }

    fn upsert(&mut self, row: &R, redelivery: bool) -> Applied<R> {
        let id = row.id();

        if let Some(existing) = self.rows.get_mut(id) {
            if existing == row {
                return if redelivery { Applied::Unchanged } else { Applied::Confirmed(row.clone()) };
            }
            let previous = std::mem::replace(existing, row.clone());
            if let MirrorOrder::Sorted(cmp) = self.placement {
                if cmp(&previous, row) != Ordering::Equal {
                    self.order.retain(|o| o != id);
                    let pos = self.sorted_position(cmp, row);
                    self.order.insert(pos, id.to_string());
                }
            }
            return Applied::Replaced { previous, current: row.clone() };
        }

        let pos = match self.placement {
            MirrorOrder::Sorted(cmp) => self.sorted_position(cmp, row),
            MirrorOrder::Prepend => 0,
            MirrorOrder::Append => self.order.len(),
        };
        self.order.insert(pos, id.to_string());
        self.rows.insert(id.to_string(), row.clone());
        Applied::Inserted(row.clone())
    }

    fn remove(&mut self, id: &str, redelivery: bool, previous: &HashMap<String, R>) -> Applied<R> {
        match self.rows.remove(id) {
            Some(row) => {
                self.order.retain(|o| o != id);
                Applied::Removed(row)
            }
            None => match previous.get(id) {
                Some(row) if !redelivery => Applied::Confirmed(row.clone()),
                _ => Applied::Unchanged,
            },
        }
    }

    // After every row that sorts at or before `row`
    fn sorted_position(&self, cmp: fn(&R, &R) -> Ordering, row: &R) -> usize {
        let rows = &self.rows;
        self.order.partition_point(|other| match rows.get(other) {
            Some(other) => cmp(other, row) != Ordering::Greater,
            None => true,
        })
    }
}
