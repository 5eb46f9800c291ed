//! # Subscribers: non-blocking fan-out for one target
//!
//! [`Subscribers`] holds every direct channel registered for a target plus the
//! optional membership in the merged global stream.
//!
//! ## What it guarantees
//! - `notify()` never waits (uses `try_send`).
//! - Per-subscriber FIFO (queue order).
//! - Every notice is tagged with the target identity.
//!
//! ## What it does **not** guarantee
//! - No retries on overflow: a full queue drops the **newest** notice for that
//!   subscriber; what is already queued is kept.
//!
//! ## Diagram
//! ```text
//!    notify()
//!        │                   (clone per subscriber)
//!        ├────────────────► [direct #1] ─► Subscription::recv()
//!        ├────────────────► [direct #2] ─► Subscription::recv()
//!        └────────────────► [global   ] ─► merged receiver (all targets)
//! ```

use tokio::sync::mpsc;

use crate::redact::TargetId;
use crate::subscribers::{RestartNotice, Subscription};

/// Per-subscriber channel with its registry id.
struct DirectChannel {
    id: u64,
    sender: mpsc::Sender<RestartNotice>,
}

/// Direct and global subscribers of one target.
pub(crate) struct Subscribers {
    target: TargetId,
    capacity: usize,
    direct: Vec<DirectChannel>,
    global: Option<mpsc::Sender<RestartNotice>>,
}

impl Subscribers {
    /// Creates an empty set; direct queues get `capacity` slots (min 1).
    pub(crate) fn new(target: TargetId, capacity: usize) -> Self {
        Self {
            target,
            capacity: capacity.max(1),
            direct: Vec::new(),
            global: None,
        }
    }

    /// Registers a new direct channel and returns its read side.
    pub(crate) fn add(&mut self, id: u64) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.direct.push(DirectChannel { id, sender: tx });
        Subscription::new(id, self.target.clone(), rx)
    }

    /// Unregisters a direct channel. Returns `false` if the id is unknown.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.direct.len();
        self.direct.retain(|c| c.id != id);
        self.direct.len() != before
    }

    /// True if no direct subscriber is left (global membership does not count).
    pub(crate) fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    /// Number of direct subscribers.
    pub(crate) fn len(&self) -> usize {
        self.direct.len()
    }

    /// Joins the merged global stream, replacing any previous membership.
    pub(crate) fn global_add(&mut self, sender: mpsc::Sender<RestartNotice>) {
        self.global = Some(sender);
    }

    /// Leaves the merged global stream. Returns `false` if it was not a member.
    pub(crate) fn global_remove(&mut self) -> bool {
        self.global.take().is_some()
    }

    /// Delivers one restart notice to every subscriber without waiting.
    ///
    /// Returns the number of queues that accepted it.
    pub(crate) fn notify(&self) -> usize {
        let notice = RestartNotice::now(self.target.clone());
        let mut delivered = 0;

        for channel in &self.direct {
            if self.offer(&channel.sender, &notice, "direct", Some(channel.id)) {
                delivered += 1;
            }
        }
        if let Some(global) = &self.global {
            if self.offer(global, &notice, "global", None) {
                delivered += 1;
            }
        }
        delivered
    }

    fn offer(
        &self,
        sender: &mpsc::Sender<RestartNotice>,
        notice: &RestartNotice,
        stream: &'static str,
        id: Option<u64>,
    ) -> bool {
        match sender.try_send(notice.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    instance = %self.target,
                    stream,
                    subscriber = ?id,
                    "dropped restart notice: queue full"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    instance = %self.target,
                    stream,
                    subscriber = ?id,
                    "dropped restart notice: receiver closed"
                );
                false
            }
        }
    }
}
