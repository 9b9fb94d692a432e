// Pending-delivery queue shared by all sessions.
//
// Sessions never write to each other's sockets. A session that wants to reach
// another user appends a `Delivery` addressed to that user; the recipient's own
// session later calls `drain` and writes whatever it got. The queue is one
// `VecDeque` behind one lock, so:
// - per-recipient order is enqueue order (entries for one user are removed in
//   the order they sit in the deque),
// - `drain` is atomic: no entry can be returned by two drains, and an entry
//   enqueued before a drain starts is either returned by it or left for the
//   next one.
//
// Broadcasts are fanned out by the caller into one delivery per recipient
// before they get here, so the queue only ever sees concrete recipients.
//
// Growth is bounded per recipient. A stalled client that never drains can hold
// at most `max_pending_per_recipient` entries; further entries for it are
// rejected with `QueueFull` and logged. Queued entries are never evicted, which
// keeps the FIFO guarantee simple.

use std::collections::{HashMap, VecDeque};

use chatterbox_protocol::Username;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

/// Default per-recipient bound.
pub const DEFAULT_MAX_PENDING: usize = 512;

/// How a delivery is presented to its recipient (see `render.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryKind {
    DirectMessage,
    Broadcast,
    Poke,
    UptimeReply,
    JokeReply,
    PictureReply,
    ListingReply,
}

/// Who produced a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    User(Username),
    /// Server-generated content: replies, connect/disconnect announcements.
    System,
}

/// One pending message for one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: Username,
    pub sender: Origin,
    pub body: String,
    pub kind: DeliveryKind,
}

impl Delivery {
    pub fn from_user(
        recipient: Username,
        sender: Username,
        body: impl Into<String>,
        kind: DeliveryKind,
    ) -> Self {
        Self {
            recipient,
            sender: Origin::User(sender),
            body: body.into(),
            kind,
        }
    }

    pub fn from_system(recipient: Username, body: impl Into<String>, kind: DeliveryKind) -> Self {
        Self {
            recipient,
            sender: Origin::System,
            body: body.into(),
            kind,
        }
    }
}

/// The recipient already has the maximum number of pending deliveries.
#[derive(Debug, Error)]
#[error("queue full for {recipient} ({limit} pending)")]
pub struct QueueFull {
    pub recipient: Username,
    pub limit: usize,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Delivery>,
    pending: HashMap<Username, usize>,
}

impl QueueState {
    fn push(&mut self, delivery: Delivery, limit: usize) -> Result<(), QueueFull> {
        let count = self.pending.entry(delivery.recipient.clone()).or_default();
        if *count >= limit {
            return Err(QueueFull {
                recipient: delivery.recipient,
                limit,
            });
        }
        *count += 1;
        self.entries.push_back(delivery);
        Ok(())
    }
}

/// Ordered, bounded, thread-safe collection of pending deliveries.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    max_pending_per_recipient: usize,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl MessageQueue {
    /// A bound of 0 is raised to 1; every recipient can hold at least one
    /// pending delivery.
    pub fn new(max_pending_per_recipient: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_pending_per_recipient: max_pending_per_recipient.max(1),
        }
    }

    /// Append one delivery to the tail.
    pub fn enqueue(&self, delivery: Delivery) -> Result<(), QueueFull> {
        let result = self
            .state
            .lock()
            .push(delivery, self.max_pending_per_recipient);
        if let Err(full) = &result {
            warn!(recipient = %full.recipient, limit = full.limit, "delivery dropped: queue full");
        }
        result
    }

    /// Append a fan-out batch under one lock acquisition. Returns how many
    /// deliveries were rejected because their recipient was full.
    pub fn enqueue_all(&self, deliveries: impl IntoIterator<Item = Delivery>) -> usize {
        let mut rejected = Vec::new();
        {
            let mut state = self.state.lock();
            for delivery in deliveries {
                if let Err(full) = state.push(delivery, self.max_pending_per_recipient) {
                    rejected.push(full);
                }
            }
        }
        for full in &rejected {
            warn!(recipient = %full.recipient, limit = full.limit, "delivery dropped: queue full");
        }
        rejected.len()
    }

    /// Remove and return every delivery addressed to `recipient`, oldest
    /// first. Entries for other recipients keep their relative order.
    pub fn drain(&self, recipient: &Username) -> Vec<Delivery> {
        let mut state = self.state.lock();
        if state.pending.remove(recipient).unwrap_or(0) == 0 {
            return Vec::new();
        }

        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(state.entries.len());
        for delivery in state.entries.drain(..) {
            if &delivery.recipient == recipient {
                taken.push(delivery);
            } else {
                kept.push_back(delivery);
            }
        }
        state.entries = kept;
        taken
    }

    /// Number of deliveries waiting for `recipient`.
    pub fn pending_for(&self, recipient: &str) -> usize {
        self.state
            .lock()
            .pending
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
