//! # Direct subscription handle.
//!
//! Returned by `add`; receives the [`RestartNotice`]s of one target. The handle
//! is handed back to `remove` to unsubscribe.

use tokio::sync::mpsc;

use crate::redact::TargetId;
use crate::subscribers::RestartNotice;

/// Read side of one per-target notification channel.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    target: TargetId,
    rx: mpsc::Receiver<RestartNotice>,
}

impl Subscription {
    pub(crate) fn new(id: u64, target: TargetId, rx: mpsc::Receiver<RestartNotice>) -> Self {
        Self { id, target, rx }
    }

    /// Registry-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target this handle watches.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Waits for the next notice.
    ///
    /// Returns `None` once the handle was unregistered and drained.
    pub async fn recv(&mut self) -> Option<RestartNotice> {
        self.rx.recv().await
    }

    /// Returns a queued notice without waiting.
    pub fn try_recv(&mut self) -> Option<RestartNotice> {
        self.rx.try_recv().ok()
    }
}
