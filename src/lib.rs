//! # dbsentry
//!
//! **dbsentry** is the resilient core of a host-resident database monitoring
//! agent. It watches database servers, notices when one restarts, and keeps
//! collecting metrics through flaky connectivity.
//!
//! The crate does not ship a database driver. It consumes a
//! [`ConnectionFactory`] and produces restart notices and metric
//! [`Collection`]s for the rest of the agent.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   orchestrator ── add(t) / remove(t) ──┐        ┌── Collector::start(cfg, ticks, sink)
//!                                        ▼        ▼
//! ┌──────────────────────────────────────────┐  ┌──────────────────────────────────────┐
//! │ Monitor                                  │  │ Collector (one per target)           │
//! │  - Registry<Instance> (RwLock<HashMap>)  │  │  - collector loop (select!)          │
//! │  - poll loop every interval              │  │  - connector loop with Backoff       │
//! │  - uptime went down ─► notify(t)         │  │  - extractors (StatusVars, ...)      │
//! └───────┬─────────────────────────┬────────┘  └──────────────────┬───────────────────┘
//!         ▼                         ▼                              ▼
//!   Subscription (per t)     global stream (all t,           mpsc::Sender<Collection>
//!                             tagged with t)                  (drop after send_timeout)
//! ```
//!
//! ### Reconnect lifecycle
//! ```text
//! connector:
//!   close previous
//!   loop {
//!     ├─► wait = backoff.wait()       0s, 1s, 3s, 7s .. 63s, then 90..180s
//!     ├─► status "Connect wait <n>s", sleep (cancellable)
//!     ├─► make + open + probe         (cancellable)
//!     │     └─ Err ─► log, close, continue
//!     └─► backoff.success(), setup statements, hand over, exit
//!   }
//! ```
//!
//! ## Features
//! | Area           | Description                                               | Key types                                  |
//! |----------------|-----------------------------------------------------------|--------------------------------------------|
//! | **Restarts**   | Poll targets, detect restarts, fan out notices.           | [`Monitor`], [`RestartMonitor`], [`NoopMonitor`] |
//! | **Registry**   | Per-target subscriber sets plus a tagged global stream.   | [`Registry`], [`Subscription`], [`RestartNotice`] |
//! | **Collection** | Tick-driven metric collection under connection supervision. | [`Collector`], [`Extractor`], [`StatusVars`], [`InnoDbMetrics`], [`TableStats`], [`IndexStats`], [`Ticker`] |
//! | **Policies**   | Reconnect waits with jitter and success-triggered reset.  | [`Backoff`], [`BackoffPolicy`], [`Jitter`] |
//! | **Redaction**  | Identities never render their password.                   | [`TargetId`], [`redact_dsn`]               |
//! | **Config**     | TOML agent config, JSON collector payloads.               | [`AgentConfig`], [`MonitorConfig`], [`CollectorConfig`] |
//! | **Errors**     | Typed errors with stable log labels.                      | [`MonitorError`], [`CollectorError`], [`ConnError`], [`ConfigError`] |
//!
//! ## Logging
//! Everything is reported through [`tracing`]; the crate never installs a
//! subscriber. Target identities are always logged redacted.

mod collector;
mod config;
mod conn;
mod core;
mod error;
mod policies;
mod redact;
mod subscribers;

pub use collector::{
    Collection, Collector, Extractor, INNODB_QUERY, IndexStats, InnoDbMetrics, Metric, MetricKind,
    STATUS_QUERY, StatusVars, TableStats, Ticker,
};
pub use config::{AgentConfig, CollectorConfig, MonitorConfig};
pub use conn::{Connection, ConnectionFactory, Row, UPTIME_QUERY};
pub use core::{
    MONITOR, Monitor, NoopMonitor, Registry, RestartMonitor, Status, Sweep, Watch,
};
pub use error::{CollectorError, ConfigError, ConnError, MonitorError};
pub use policies::{Backoff, BackoffPolicy, Jitter};
pub use redact::{TargetId, redact_dsn};
pub use subscribers::{RestartNotice, Subscription};
