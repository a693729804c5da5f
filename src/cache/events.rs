//! Change events and the in-memory queue feeding the consumer.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::commit::{ChangeKind, ChangeNotice};
use crate::domain::entities::{EntityId, EntityType};

use super::lock::RecoverMutex;

const SOURCE: &str = "cache::events";

const METRIC_EVENT_QUEUE_LEN: &str = "kettle_event_queue_len";
const METRIC_EVENT_COALESCED: &str = "kettle_event_coalesced_total";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// A committed change waiting for resolution.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub kind: ChangeKind,
    pub timestamp: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(notice: ChangeNotice, epoch: Epoch) -> Self {
        let ChangeNotice {
            entity_type,
            entity_id,
            kind,
        } = notice;

        Self {
            id: Uuid::new_v4(),
            epoch,
            entity_type,
            entity_id,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// FIFO of change events with a soft capacity.
///
/// Once `limit` events are pending, a new event for an entity that is already
/// queued is folded into the pending one. Resolution re-reads committed state,
/// so the folded event loses nothing. Events are never dropped: the queue
/// grows past `limit` rather than lose a change.
pub struct EventQueue {
    queue: Mutex<VecDeque<ChangeEvent>>,
    epoch_counter: AtomicU64,
    limit: NonZeroUsize,
}

impl EventQueue {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit,
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish a notice; returns the id of the queued event.
    pub fn publish(&self, notice: ChangeNotice) -> Uuid {
        let event = ChangeEvent::new(notice, self.next_epoch());
        self.push(event)
    }

    /// Enqueue an already-built event, e.g. one redelivered after a failure.
    pub fn push(&self, event: ChangeEvent) -> Uuid {
        let id = event.id;

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            change = %event.kind,
            "Change event enqueued"
        );

        let mut queue = self.queue.lock_recover(SOURCE, "push");
        if queue.len() >= self.limit.get() {
            if let Some(pending) = queue.iter_mut().find(|pending| {
                pending.entity_type == event.entity_type && pending.entity_id == event.entity_id
            }) {
                debug!(
                    event_id = %event.id,
                    pending_event_id = %pending.id,
                    limit = self.limit.get(),
                    "Change event queue full; coalesced into pending event"
                );
                pending.kind = event.kind;
                pending.timestamp = event.timestamp;
                counter!(METRIC_EVENT_COALESCED).increment(1);
                return pending.id;
            }
            warn!(
                pending = queue.len(),
                limit = self.limit.get(),
                "Change event queue over capacity"
            );
        }
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);

        id
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<ChangeEvent> {
        let mut queue = self.queue.lock_recover(SOURCE, "drain");
        let count = limit.min(queue.len());
        let events: Vec<_> = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        events
    }

    pub fn len(&self) -> usize {
        self.queue.lock_recover(SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.queue.lock_recover(SOURCE, "clear").clear();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(0.0);
    }
}
