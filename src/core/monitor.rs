//! # Restart-detection monitor.
//!
//! Watches a dynamic set of database targets and tells subscribers when one of
//! them restarts.
//!
//! ## Architecture
//! ```text
//!                 add(t) / remove(t, sub)          global_subscribe()
//!                        │                                │
//!                        ▼                                ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ Registry<Instance>   t ─► Instance { conn, last uptime }     │
//!   │                      t ─► Subscribers { direct.., global }   │
//!   └──────────────────────────────────────────────────────────────┘
//!                        ▲                                │
//!           check_all()  │ every interval                 │ notify(t)
//!                        │                                ▼
//!               poll loop (tokio task)        Subscription / global rx
//! ```
//!
//! ## Lifecycle
//! ```text
//! Stopped ──start()──► Running ──stop()──► Stopping ──► Stopped
//!                         │
//!                         └── panic in loop ──► Crashed
//! ```
//!
//! ## Rules
//! - The first check of a target records a baseline uptime and never fires.
//! - A lower uptime than the stored one is a restart; the stored value is
//!   always replaced by the latest reading.
//! - A failed or slow read skips the target for that tick only; the
//!   connection is reopened on a later tick and the target stays registered.
//! - `stop()` returns after the loop exited; the loop writes the terminal
//!   status itself.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::conn::{Connection, ConnectionFactory};
use crate::core::registry::{Registry, Sweep, Watch};
use crate::core::status::{Status, TERMINAL};
use crate::core::{RestartMonitor, panic_message};
use crate::error::{ConnError, MonitorError};
use crate::redact::TargetId;
use crate::subscribers::{RestartNotice, Subscription};

/// Status board name of the monitor.
pub const MONITOR: &str = "restart-monitor";

struct InstanceState {
    conn: Box<dyn Connection>,
    open: bool,
    last_uptime: Option<u64>,
}

/// Monitored-instance record: the connection used to read the fingerprint and
/// the last reading.
pub(crate) struct Instance {
    target: TargetId,
    state: Mutex<InstanceState>,
    io_timeout: Duration,
}

impl Instance {
    /// Wraps an already opened connection.
    fn new(target: TargetId, conn: Box<dyn Connection>, io_timeout: Duration) -> Self {
        Self {
            target,
            state: Mutex::new(InstanceState {
                conn,
                open: true,
                last_uptime: None,
            }),
            io_timeout,
        }
    }

    async fn close(self) {
        let mut state = self.state.into_inner();
        if state.open {
            state.conn.close().await;
        }
        tracing::debug!(instance = %self.target, "connection closed");
    }
}

async fn read_uptime(state: &mut InstanceState) -> Result<u64, ConnError> {
    if !state.open {
        state.conn.open().await?;
        state.open = true;
    }
    state.conn.uptime().await
}

/// Records `now` and reports whether it went backwards.
fn observe(last: &mut Option<u64>, now: u64) -> bool {
    let restarted = matches!(*last, Some(prev) if now < prev);
    *last = Some(now);
    restarted
}

#[async_trait]
impl Watch for Instance {
    async fn restarted(&self) -> Result<bool, ConnError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let read = match time::timeout(self.io_timeout, read_uptime(state)).await {
            Ok(read) => read,
            Err(_elapsed) => Err(ConnError::Timeout {
                timeout: self.io_timeout,
            }),
        };

        match read {
            Ok(uptime) => Ok(observe(&mut state.last_uptime, uptime)),
            Err(e) => {
                if state.open {
                    state.conn.close().await;
                    state.open = false;
                }
                Err(e)
            }
        }
    }
}

struct Runner {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Restart-detection monitor over a dynamic set of targets.
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use dbsentry::{ConnectionFactory, Monitor, MonitorConfig, TargetId};
/// # async fn demo(factory: Arc<dyn ConnectionFactory>) -> Result<(), dbsentry::MonitorError> {
/// let monitor = Monitor::new(factory, MonitorConfig::default());
/// let target = TargetId::new("agent:secret@tcp(db1:3306)/");
///
/// let mut sub = monitor.add(&target).await?;
/// monitor.start(monitor.config().interval()).await?;
///
/// if let Some(notice) = sub.recv().await {
///     println!("{} restarted", notice.target);
/// }
/// monitor.remove(&target, sub).await;
/// monitor.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Monitor {
    factory: Arc<dyn ConnectionFactory>,
    cfg: MonitorConfig,
    registry: Arc<Registry<Instance>>,
    status: Status,
    global: std::sync::Mutex<Option<mpsc::Sender<RestartNotice>>>,
    runner: Mutex<Option<Runner>>,
}

impl Monitor {
    /// Creates a stopped monitor with its own status board.
    pub fn new(factory: Arc<dyn ConnectionFactory>, cfg: MonitorConfig) -> Self {
        Self::with_status(factory, cfg, Status::new())
    }

    /// Creates a stopped monitor reporting into a shared status board.
    pub fn with_status(
        factory: Arc<dyn ConnectionFactory>,
        cfg: MonitorConfig,
        status: Status,
    ) -> Self {
        status.update(MONITOR, "Stopped");
        Self {
            factory,
            registry: Arc::new(Registry::new(cfg.notice_capacity)),
            cfg,
            status,
            global: std::sync::Mutex::new(None),
            runner: Mutex::new(None),
        }
    }

    /// Configuration the monitor was built with.
    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    /// Spawns the poll loop, checking immediately and then every `interval`.
    ///
    /// A zero `interval` falls back to the configured one.
    pub async fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.join.is_finished()) {
            return Err(MonitorError::AlreadyRunning);
        }

        let period = if interval.is_zero() {
            self.cfg.interval()
        } else {
            interval
        };
        let token = CancellationToken::new();
        self.status.update(MONITOR, "Running");
        let join = tokio::spawn(poll(
            Arc::clone(&self.registry),
            self.status.clone(),
            period,
            token.clone(),
        ));
        *runner = Some(Runner { token, join });

        tracing::info!(interval = ?period, "restart monitor started");
        Ok(())
    }

    /// Stops the poll loop and waits for it to exit. Stopping a stopped
    /// monitor is a no-op.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let Some(Runner { token, join }) = self.runner.lock().await.take() else {
            return Ok(());
        };

        self.status.update_unless(MONITOR, "Stopping", &TERMINAL);
        token.cancel();
        if let Err(e) = join.await {
            tracing::error!(error = %e, "restart monitor task failed to join");
        }
        Ok(())
    }

    /// Snapshot of the status board.
    pub fn status(&self) -> BTreeMap<String, String> {
        self.status.all()
    }

    /// Subscribes to restarts of `target`.
    ///
    /// The first subscription of a target opens its connection; if that fails
    /// nothing is registered and [`MonitorError::Connect`] is returned.
    pub async fn add(&self, target: &TargetId) -> Result<Subscription, MonitorError> {
        if let Some(sub) = self.registry.subscribe(target).await {
            tracing::debug!(instance = %target, id = sub.id(), "subscriber added");
            return Ok(sub);
        }

        let conn = self.connect(target).await?;
        let record = Instance::new(target.clone(), conn, self.cfg.io_timeout());
        let (sub, unused) = self.registry.insert(target, record).await;
        match unused {
            Some(record) => record.close().await,
            None => tracing::info!(instance = %target, "target added"),
        }

        if let Some(global) = self.global_sender() {
            if let Err(e) = self.registry.global_add(global, target).await {
                tracing::debug!(
                    instance = %target,
                    error = %e,
                    "target left before joining global stream"
                );
            }
        }
        Ok(sub)
    }

    /// Unsubscribes `sub`. Removing the last subscriber of a target closes its
    /// connection and stops polling it; returns `true` in that case.
    pub async fn remove(&self, target: &TargetId, sub: Subscription) -> bool {
        match self.registry.remove(target, sub).await {
            Some(instance) => {
                instance.close().await;
                tracing::info!(instance = %target, "target removed");
                true
            }
            None => false,
        }
    }

    /// Returns the merged restart stream of every current and future target.
    ///
    /// Notices are tagged with the restarted target. Only one live receiver
    /// exists at a time; dropping it allows a new subscription.
    pub async fn global_subscribe(&self) -> Result<mpsc::Receiver<RestartNotice>, MonitorError> {
        let (tx, rx) = mpsc::channel(self.cfg.global_capacity.max(1));
        {
            let mut slot = self.global.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|s| !s.is_closed()) {
                return Err(MonitorError::GlobalTaken);
            }
            *slot = Some(tx.clone());
        }

        let targets = self.registry.global_add_all(&tx).await;
        tracing::info!(targets, "global restart stream subscribed");
        Ok(rx)
    }

    /// Stops routing restarts of `target` to the global stream.
    pub async fn global_remove(&self, target: &TargetId) -> bool {
        self.registry.global_remove(target).await
    }

    /// Checks every target once, notifying subscribers of restarted ones.
    pub async fn check(&self) -> Sweep {
        self.registry.check_all().await
    }

    async fn connect(&self, target: &TargetId) -> Result<Box<dyn Connection>, MonitorError> {
        let mut conn = self.factory.make(target);
        let timeout = self.cfg.io_timeout();
        let opened = match time::timeout(timeout, conn.open()).await {
            Ok(res) => res,
            Err(_elapsed) => Err(ConnError::Timeout { timeout }),
        };

        match opened {
            Ok(()) => Ok(conn),
            Err(source) => {
                conn.close().await;
                tracing::warn!(
                    instance = %target,
                    error = %source,
                    label = source.as_label(),
                    "cannot open connection"
                );
                Err(MonitorError::Connect {
                    target: target.clone(),
                    source,
                })
            }
        }
    }

    fn global_sender(&self) -> Option<mpsc::Sender<RestartNotice>> {
        let slot = self.global.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().filter(|s| !s.is_closed()).cloned()
    }
}

async fn poll(
    registry: Arc<Registry<Instance>>,
    status: Status,
    period: Duration,
    token: CancellationToken,
) {
    let run = AssertUnwindSafe(poll_loop(&registry, &status, period, &token))
        .catch_unwind()
        .await;

    match run {
        Ok(()) => {
            status.update(MONITOR, "Stopped");
            tracing::info!("restart monitor stopped");
        }
        Err(panic) => {
            tracing::error!(panic = %panic_message(&*panic), "restart monitor crashed");
            status.update(MONITOR, "Crashed");
        }
    }
}

async fn poll_loop(
    registry: &Registry<Instance>,
    status: &Status,
    period: Duration,
    token: &CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                status.update(MONITOR, "Checking");
                let sweep = registry.check_all().await;
                tracing::debug!(
                    checked = sweep.checked,
                    restarted = sweep.restarted,
                    failed = sweep.failed,
                    "restart check done"
                );
                status.update(MONITOR, "Idle");
            }
        }
    }
}

#[async_trait]
impl RestartMonitor for Monitor {
    async fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        Monitor::start(self, interval).await
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        Monitor::stop(self).await
    }

    fn status(&self) -> BTreeMap<String, String> {
        Monitor::status(self)
    }

    async fn add(&self, target: &TargetId) -> Result<Subscription, MonitorError> {
        Monitor::add(self, target).await
    }

    async fn remove(&self, target: &TargetId, sub: Subscription) -> bool {
        Monitor::remove(self, target, sub).await
    }

    async fn global_subscribe(&self) -> Result<mpsc::Receiver<RestartNotice>, MonitorError> {
        Monitor::global_subscribe(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_baseline_then_decrease() {
        let mut last = None;
        assert!(!observe(&mut last, 100));
        assert!(!observe(&mut last, 120));
        assert!(observe(&mut last, 15));
        assert_eq!(last, Some(15));
        assert!(!observe(&mut last, 16));
    }

    #[test]
    fn test_equal_reading_is_not_a_restart() {
        let mut last = Some(42);
        assert!(!observe(&mut last, 42));
    }
}
