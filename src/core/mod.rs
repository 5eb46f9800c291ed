//! Restart detection core: registry, monitor and status.
//!
//! - [`registry`]: target map with per-target subscriber sets and the sweep;
//! - [`monitor`]: the restart-detection [`Monitor`] and its poll loop;
//! - [`noop`]: [`NoopMonitor`], a monitor that never polls;
//! - [`status`]: the shared [`Status`] board.
//!
//! Consumers that only need lifecycle and subscription management should
//! depend on the [`RestartMonitor`] trait rather than a concrete monitor.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MonitorError;
use crate::redact::TargetId;
use crate::subscribers::{RestartNotice, Subscription};

pub mod monitor;
pub mod noop;
pub mod registry;
pub mod status;

pub use monitor::{MONITOR, Monitor};
pub use noop::NoopMonitor;
pub use registry::{Registry, Sweep, Watch};
pub use status::{Status, TERMINAL};

/// Lifecycle and subscription management of a restart monitor.
#[async_trait]
pub trait RestartMonitor: Send + Sync {
    /// Starts polling every `interval`.
    async fn start(&self, interval: Duration) -> Result<(), MonitorError>;

    /// Stops polling and waits for the loop to exit.
    async fn stop(&self) -> Result<(), MonitorError>;

    /// Snapshot of component states.
    fn status(&self) -> BTreeMap<String, String>;

    /// Subscribes to restarts of `target`.
    async fn add(&self, target: &TargetId) -> Result<Subscription, MonitorError>;

    /// Unsubscribes; returns `true` if the target was evicted.
    async fn remove(&self, target: &TargetId, sub: Subscription) -> bool;

    /// Returns the merged, target-tagged restart stream.
    async fn global_subscribe(&self) -> Result<mpsc::Receiver<RestartNotice>, MonitorError>;
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
