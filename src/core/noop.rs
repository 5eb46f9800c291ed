//! # No-op restart monitor.
//!
//! [`NoopMonitor`] accepts every registration without opening connections and
//! never polls. Handles stay open (their queues never close), so consumers
//! block exactly as they would on a quiet target. [`NoopMonitor::trigger`]
//! injects a restart by hand.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::RestartMonitor;
use crate::core::registry::Registry;
use crate::error::MonitorError;
use crate::redact::TargetId;
use crate::subscribers::{RestartNotice, Subscription};

/// Restart monitor that never detects anything on its own.
pub struct NoopMonitor {
    registry: Registry<()>,
    global: mpsc::Sender<RestartNotice>,
    global_rx: std::sync::Mutex<Option<mpsc::Receiver<RestartNotice>>>,
}

impl NoopMonitor {
    /// Creates a monitor whose queues hold `capacity` notices each.
    pub fn new(capacity: usize) -> Self {
        let (global, rx) = mpsc::channel(capacity.max(1));
        Self {
            registry: Registry::new(capacity),
            global,
            global_rx: std::sync::Mutex::new(Some(rx)),
        }
    }

    /// Delivers a restart notice for `target` as if it had restarted.
    pub async fn trigger(&self, target: &TargetId) -> usize {
        self.registry.notify(target).await
    }
}

impl Default for NoopMonitor {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl RestartMonitor for NoopMonitor {
    async fn start(&self, _interval: Duration) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn status(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    async fn add(&self, target: &TargetId) -> Result<Subscription, MonitorError> {
        let sub = self.registry.add(target).await;
        if self.global.is_closed() {
            return Ok(sub);
        }
        self.registry.global_add(self.global.clone(), target).await?;
        Ok(sub)
    }

    async fn remove(&self, target: &TargetId, sub: Subscription) -> bool {
        self.registry.remove(target, sub).await.is_some()
    }

    async fn global_subscribe(&self) -> Result<mpsc::Receiver<RestartNotice>, MonitorError> {
        self.global_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(MonitorError::GlobalTaken)
    }
}
