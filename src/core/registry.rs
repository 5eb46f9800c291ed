//! # Target registry - subscriber sets and per-target records.
//!
//! The registry maps a [`TargetId`] to its record (`R`, the monitored-instance
//! state for the restart monitor) and its [`Subscribers`].
//!
//! ## Architecture
//! ```text
//! Monitor::add(t)     ─► insert(t, record) / subscribe(t)  (write lock)
//! Monitor::remove(t)  ─► remove(t, handle) ─► evicted record (write lock)
//! poll loop           ─► check_all() ─► Watch::restarted() ─► notify(t)
//!                                                        (read lock)
//! ```
//!
//! ## Rules
//! - An entry exists **iff** it has at least one direct subscriber.
//! - Global membership is layered onto existing entries only.
//! - One [`RwLock`] guards the whole map; it is never exposed by reference.
//! - Delivery uses `try_send`, so notifying under the read lock never blocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::error::{ConnError, MonitorError};
use crate::redact::TargetId;
use crate::subscribers::{RestartNotice, Subscribers, Subscription};

/// A record whose restarts can be detected by polling.
#[async_trait]
pub trait Watch: Send + Sync {
    /// Reads a fresh fingerprint and reports whether the target restarted
    /// since the previous reading.
    async fn restarted(&self) -> Result<bool, ConnError>;
}

/// Outcome of one pass over all targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Targets checked.
    pub checked: usize,
    /// Targets found restarted (and notified).
    pub restarted: usize,
    /// Targets whose check failed and were skipped.
    pub failed: usize,
}

struct Entry<R> {
    record: R,
    subs: Subscribers,
}

/// Lock-guarded map of targets to records and subscriber sets.
pub struct Registry<R> {
    entries: RwLock<HashMap<TargetId, Entry<R>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<R> Registry<R> {
    /// Creates an empty registry; direct subscription queues get `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// True if the target has an entry.
    pub async fn contains(&self, target: &TargetId) -> bool {
        self.entries.read().await.contains_key(target)
    }

    /// Number of registered targets.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if no target is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Adds a direct subscription to an existing entry.
    ///
    /// Returns `None` if the target is not registered.
    pub async fn subscribe(&self, target: &TargetId) -> Option<Subscription> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(target)?;
        Some(entry.subs.add(self.next_id()))
    }

    /// Adds a direct subscription, creating the entry with `record` if absent.
    ///
    /// If the entry already existed the unused `record` is handed back so the
    /// caller can release whatever it holds.
    pub async fn insert(&self, target: &TargetId, record: R) -> (Subscription, Option<R>) {
        let id = self.next_id();
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(target) {
            return (entry.subs.add(id), Some(record));
        }

        let mut subs = Subscribers::new(target.clone(), self.capacity);
        let sub = subs.add(id);
        entries.insert(target.clone(), Entry { record, subs });
        tracing::debug!(instance = %target, "target registered");
        (sub, None)
    }

    /// Routes restart notices of `target` to `sender` as well.
    ///
    /// Fails with [`MonitorError::UnknownTarget`] if the target has no entry.
    pub async fn global_add(
        &self,
        sender: mpsc::Sender<RestartNotice>,
        target: &TargetId,
    ) -> Result<(), MonitorError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(target) {
            Some(entry) => {
                entry.subs.global_add(sender);
                Ok(())
            }
            None => Err(MonitorError::UnknownTarget {
                target: target.clone(),
            }),
        }
    }

    /// Routes restart notices of every registered target to `sender`.
    pub(crate) async fn global_add_all(&self, sender: &mpsc::Sender<RestartNotice>) -> usize {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.subs.global_add(sender.clone());
        }
        entries.len()
    }

    /// Stops routing restart notices of `target` to the global stream.
    pub async fn global_remove(&self, target: &TargetId) -> bool {
        let mut entries = self.entries.write().await;
        entries
            .get_mut(target)
            .is_some_and(|entry| entry.subs.global_remove())
    }

    /// Unregisters a direct subscription.
    ///
    /// When it was the last one the entry is evicted and its record returned.
    pub async fn remove(&self, target: &TargetId, sub: Subscription) -> Option<R> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(target)?;

        if !entry.subs.remove(sub.id()) {
            tracing::debug!(instance = %target, id = sub.id(), "unknown subscription");
        }
        if !entry.subs.is_empty() {
            tracing::debug!(
                instance = %target,
                remaining = entry.subs.len(),
                "subscription removed"
            );
            return None;
        }

        tracing::debug!(instance = %target, "target evicted");
        entries.remove(target).map(|entry| entry.record)
    }

    /// Delivers a restart notice for `target` to all of its subscribers.
    ///
    /// Unknown targets and targets without reachable subscribers are a no-op.
    pub async fn notify(&self, target: &TargetId) -> usize {
        let entries = self.entries.read().await;
        entries.get(target).map_or(0, |entry| entry.subs.notify())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl<R: Default> Registry<R> {
    /// Adds a direct subscription, creating an entry with a default record if absent.
    pub async fn add(&self, target: &TargetId) -> Subscription {
        let (sub, _) = self.insert(target, R::default()).await;
        sub
    }
}

impl<R: Watch> Registry<R> {
    /// Checks every registered target once and notifies restarted ones.
    ///
    /// A failing target is logged and skipped; the sweep always continues.
    pub async fn check_all(&self) -> Sweep {
        let entries = self.entries.read().await;
        let mut sweep = Sweep::default();

        for (target, entry) in entries.iter() {
            sweep.checked += 1;
            match entry.record.restarted().await {
                Ok(false) => {}
                Ok(true) => {
                    sweep.restarted += 1;
                    let delivered = entry.subs.notify();
                    tracing::info!(instance = %target, delivered, "restart detected");
                }
                Err(e) => {
                    sweep.failed += 1;
                    tracing::warn!(
                        instance = %target,
                        error = %e,
                        label = e.as_label(),
                        "restart check failed"
                    );
                }
            }
        }
        sweep
    }
}
