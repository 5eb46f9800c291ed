//! # Connection-supervised collector.
//!
//! A [`Collector`] turns ticks into [`Collection`]s for one target while a
//! connector keeps (re)establishing the connection in the background.
//!
//! ## Architecture
//! ```text
//!            ┌─────────────────── collector loop ───────────────────┐
//!   ticks ──►│ select! (biased)                                     │
//!            │   stop    ─► close conn, join connector              │
//!            │   Session ─► hold conn, "Ready"                      │
//!            │   tick    ─► skipped while disconnected              │
//!            │              extract all ─► probe if any failed      │──► sink
//!            │              probe failed ─► respawn connector       │
//!            └──────────────────────────────────────────────────────┘
//!                  ▲ Session                    │ old conn + backoff
//!                  └───────── connector ◄───────┘
//! ```
//!
//! Delivery to the sink waits at most `send_timeout`.
//!
//! ## Rules
//! - Ticks are honoured only after the first connection is up.
//! - One extractor failing does not stop the others.
//! - A collection that cannot be delivered within `send_timeout` is dropped.
//! - A connector that dies (panics) ends the collector as `Crashed`.
//! - `stop()` returns after the loop exited; the loop writes `Stopped` (or
//!   `Crashed`) itself. Connections still in flight are closed.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::collector::connector::{self, ConnectorCtx, Session};
use crate::collector::{
    Collection, Extractor, IndexStats, InnoDbMetrics, StatusVars, TableStats,
};
use crate::config::CollectorConfig;
use crate::conn::{Connection, ConnectionFactory};
use crate::core::{Status, TERMINAL, panic_message};
use crate::error::CollectorError;
use crate::policies::Backoff;

struct Running {
    config: CollectorConfig,
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Metric collector for one target.
pub struct Collector {
    name: String,
    factory: Arc<dyn ConnectionFactory>,
    extractors: Vec<Arc<dyn Extractor>>,
    status: Status,
    running: Mutex<Option<Running>>,
}

impl Collector {
    /// Creates a stopped collector with its own status board.
    ///
    /// The built-in extractors enabled by the config are added on
    /// [`start`](Self::start); `extractors` run after them.
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        extractors: Vec<Arc<dyn Extractor>>,
    ) -> Self {
        Self::with_status(name, factory, extractors, Status::new())
    }

    /// Same as [`new`](Self::new), reporting into a shared status board.
    pub fn with_status(
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        extractors: Vec<Arc<dyn Extractor>>,
        status: Status,
    ) -> Self {
        let name = name.into();
        status.update(&name, "Stopped");
        Self {
            name,
            factory,
            extractors,
            status,
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts collecting: connects in the background and turns every tick
    /// received after that into a collection sent to `sink`.
    pub fn start(
        &self,
        config: CollectorConfig,
        ticks: mpsc::Receiver<SystemTime>,
        sink: mpsc::Sender<Collection>,
    ) -> Result<(), CollectorError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.join.is_finished()) {
            return Err(CollectorError::AlreadyRunning {
                name: self.name.clone(),
            });
        }

        let status_vars = StatusVars::new(config.status.clone());
        let mut extractors: Vec<Arc<dyn Extractor>> =
            Vec::with_capacity(self.extractors.len() + 4);
        if !status_vars.is_empty() {
            extractors.push(Arc::new(status_vars));
        }
        if !config.innodb.is_empty() {
            extractors.push(Arc::new(InnoDbMetrics));
        }
        if config.user_stats {
            extractors.push(Arc::new(TableStats::new(&config.user_stats_ignore_db)));
            extractors.push(Arc::new(IndexStats::new(&config.user_stats_ignore_db)));
        }
        extractors.extend(self.extractors.iter().cloned());

        let token = CancellationToken::new();
        let worker = Worker {
            ctx: ConnectorCtx {
                name: self.name.clone(),
                target: config.target.clone(),
                factory: Arc::clone(&self.factory),
                setup: config.setup_statements().into(),
                status: self.status.clone(),
            },
            prefix: config.prefix(),
            extractors,
            send_timeout: config.send_timeout(),
            token: token.clone(),
        };
        let backoff = Backoff::new(config.backoff_policy());
        let join = tokio::spawn(supervise(worker, backoff, ticks, sink));

        tracing::info!(collector = %self.name, instance = %config.target, "collector started");
        *running = Some(Running {
            config,
            token,
            join,
        });
        Ok(())
    }

    /// Stops collecting and waits for the loop to exit. Stopping a stopped
    /// collector is a no-op.
    pub async fn stop(&self) -> Result<(), CollectorError> {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Running { token, join, .. }) = taken else {
            return Ok(());
        };

        self.status.update_unless(&self.name, "Stopping", &TERMINAL);
        token.cancel();
        if let Err(e) = join.await {
            tracing::error!(
                collector = %self.name,
                error = %e,
                "collector task failed to join"
            );
        }
        Ok(())
    }

    /// Snapshot of the status board.
    pub fn status(&self) -> BTreeMap<String, String> {
        self.status.all()
    }

    /// Config of the current run, `None` when stopped.
    pub fn config(&self) -> Option<CollectorConfig> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.config.clone())
    }
}

struct Worker {
    ctx: ConnectorCtx,
    prefix: String,
    extractors: Vec<Arc<dyn Extractor>>,
    send_timeout: Duration,
    token: CancellationToken,
}

async fn supervise(
    worker: Worker,
    backoff: Backoff,
    ticks: mpsc::Receiver<SystemTime>,
    sink: mpsc::Sender<Collection>,
) {
    let name = worker.ctx.name.clone();
    let status = worker.ctx.status.clone();
    let token = worker.token.clone();

    let run = AssertUnwindSafe(worker.run(backoff, ticks, sink))
        .catch_unwind()
        .await;

    match run {
        Ok(Ok(())) => {
            status.update(&name, "Stopped");
            tracing::info!(collector = %name, "collector stopped");
            return;
        }
        Ok(Err(e)) => tracing::error!(
            collector = %name,
            error = %e,
            label = e.as_label(),
            "collector crashed"
        ),
        Err(panic) => tracing::error!(
            collector = %name,
            panic = %panic_message(&*panic),
            "collector crashed"
        ),
    }
    token.cancel();
    status.update(&name, "Crashed");
}

type ConnectorHandle = JoinHandle<Result<(), String>>;

/// Resolves when the connector task ends; never resolves without one.
async fn connector_exit(handle: &mut Option<ConnectorHandle>) -> Result<(), String> {
    match handle {
        Some(join) => match join.await {
            Ok(outcome) => outcome,
            Err(e) => Err(e.to_string()),
        },
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(
        self,
        backoff: Backoff,
        mut ticks: mpsc::Receiver<SystemTime>,
        sink: mpsc::Sender<Collection>,
    ) -> Result<(), CollectorError> {
        let (up_tx, mut up_rx) = mpsc::channel::<Session>(1);
        let connectors = self.token.child_token();
        let mut session: Option<Session> = None;
        let mut connector = Some(self.spawn_connector(None, backoff, &up_tx, &connectors));

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break Ok(()),
                Some(up) = up_rx.recv() => {
                    session = Some(up);
                    self.ctx.status.update(&self.ctx.name, "Ready");
                    tracing::debug!(collector = %self.ctx.name, "link up");
                }
                exit = connector_exit(&mut connector), if session.is_none() => {
                    connector = None;
                    // A queued hand-over is picked up on the next turn.
                    if up_rx.is_empty() {
                        break Err(CollectorError::ConnectorExited {
                            name: self.ctx.name.clone(),
                            reason: exit.err().unwrap_or_else(|| "no connection".to_string()),
                        });
                    }
                }
                tick = ticks.recv() => {
                    let Some(now) = tick else {
                        tracing::debug!(collector = %self.ctx.name, "tick source closed");
                        break Ok(());
                    };
                    let Some(current) = session.as_mut() else {
                        tracing::debug!(collector = %self.ctx.name, "tick skipped: not connected");
                        continue;
                    };

                    self.ctx.status.update(&self.ctx.name, "Running");
                    let (collection, failed) = self.collect(current.conn.as_mut(), now).await;

                    if failed {
                        if let Err(e) = current.conn.probe().await {
                            tracing::warn!(
                                collector = %self.ctx.name,
                                instance = %self.ctx.target,
                                error = %e,
                                "link down"
                            );
                            if let Some(Session { conn, backoff }) = session.take() {
                                connector = Some(
                                    self.spawn_connector(Some(conn), backoff, &up_tx, &connectors),
                                );
                            }
                        }
                    }

                    self.deliver(&sink, collection).await;
                    if session.is_some() {
                        self.ctx.status.update(&self.ctx.name, "Ready");
                    }
                }
            }
        };

        if let Some(mut held) = session.take() {
            held.conn.close().await;
        }
        connectors.cancel();
        if let Some(join) = connector {
            match join.await {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => tracing::error!(
                    collector = %self.ctx.name,
                    panic = %panic,
                    "connector crashed"
                ),
                Err(e) => tracing::error!(
                    collector = %self.ctx.name,
                    error = %e,
                    "connector task failed to join"
                ),
            }
        }
        while let Ok(mut pending) = up_rx.try_recv() {
            pending.conn.close().await;
        }
        outcome
    }

    fn spawn_connector(
        &self,
        previous: Option<Box<dyn Connection>>,
        backoff: Backoff,
        up: &mpsc::Sender<Session>,
        token: &CancellationToken,
    ) -> ConnectorHandle {
        let run = connector::run(
            self.ctx.clone(),
            previous,
            backoff,
            up.clone(),
            token.clone(),
        );
        tokio::spawn(async move {
            AssertUnwindSafe(run)
                .catch_unwind()
                .await
                .map_err(|panic| panic_message(&*panic))
        })
    }

    /// Runs every extractor; the flag reports whether any of them failed.
    async fn collect(&self, conn: &mut dyn Connection, now: SystemTime) -> (Collection, bool) {
        let mut collection = Collection::at(now);
        let mut failed = false;

        for extractor in &self.extractors {
            match extractor.extract(&mut *conn, &self.prefix).await {
                Ok(mut metrics) => collection.metrics.append(&mut metrics),
                Err(e) => {
                    failed = true;
                    tracing::warn!(
                        collector = %self.ctx.name,
                        extractor = extractor.name(),
                        error = %e,
                        label = e.as_label(),
                        "extract failed"
                    );
                }
            }
        }
        (collection, failed)
    }

    async fn deliver(&self, sink: &mpsc::Sender<Collection>, collection: Collection) {
        if collection.is_empty() {
            tracing::debug!(collector = %self.ctx.name, "no metrics");
            return;
        }

        match time::timeout(self.send_timeout, sink.send(collection)).await {
            Ok(Ok(())) => {}
            Ok(Err(_closed)) => {
                tracing::debug!(collector = %self.ctx.name, "collection dropped: sink closed");
            }
            Err(_elapsed) => {
                tracing::debug!(
                    collector = %self.ctx.name,
                    timeout = ?self.send_timeout,
                    "collection lost: sink did not accept it in time"
                );
            }
        }
    }
}
