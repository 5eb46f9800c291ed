//! Error types used by the monitor, the collectors and their collaborators.
//!
//! - [`ConnError`]: failures reported by a [`Connection`](crate::Connection).
//! - [`MonitorError`]: registration and lifecycle errors of the restart monitor.
//! - [`CollectorError`]: lifecycle errors of a metric collector.
//! - [`ConfigError`]: configuration loading/parsing failures.
//!
//! Every enum exposes `as_label` returning a short stable snake_case label
//! for logs. Target identities inside errors always print redacted.

use std::time::Duration;
use thiserror::Error;

use crate::redact::TargetId;

/// # Errors produced by a connection to a target.
///
/// All variants are transient from the agent's point of view: callers retry
/// them via [`Backoff`](crate::Backoff) or skip the target for one cycle.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConnError {
    /// The connection could not be opened.
    #[error("open failed: {reason}")]
    Open {
        /// Driver supplied message.
        reason: String,
    },

    /// The connection was opened but the liveness probe failed.
    #[error("probe failed: {reason}")]
    Probe {
        /// Driver supplied message.
        reason: String,
    },

    /// A statement or query failed.
    #[error("query failed: {reason}")]
    Query {
        /// Driver supplied message.
        reason: String,
    },

    /// The operation did not finish in time.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The exceeded deadline.
        timeout: Duration,
    },

    /// The handle is not open.
    #[error("connection not open")]
    NotOpen,
}

impl ConnError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use dbsentry::ConnError;
    ///
    /// let err = ConnError::Probe { reason: "gone away".into() };
    /// assert_eq!(err.as_label(), "conn_probe");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnError::Open { .. } => "conn_open",
            ConnError::Probe { .. } => "conn_probe",
            ConnError::Query { .. } => "conn_query",
            ConnError::Timeout { .. } => "conn_timeout",
            ConnError::NotOpen => "conn_not_open",
        }
    }
}

/// # Errors returned by the restart monitor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The target has no direct subscriber, so nothing can be layered onto it.
    #[error("unknown target: {target}")]
    UnknownTarget {
        /// Identity of the missing target.
        target: TargetId,
    },

    /// First-time registration could not open a connection to the target.
    #[error("cannot connect to {target}: {source}")]
    Connect {
        /// Identity of the target.
        target: TargetId,
        /// Underlying connection error.
        #[source]
        source: ConnError,
    },

    /// The poll loop is already running.
    #[error("restart monitor is already running")]
    AlreadyRunning,

    /// The merged restart stream was already handed out and is still alive.
    #[error("global restart stream already subscribed")]
    GlobalTaken,
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::UnknownTarget { .. } => "monitor_unknown_target",
            MonitorError::Connect { .. } => "monitor_connect",
            MonitorError::AlreadyRunning => "monitor_already_running",
            MonitorError::GlobalTaken => "monitor_global_taken",
        }
    }
}

/// # Errors returned by a metric collector.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// `start` was called while the collector is active.
    #[error("{name} is already running")]
    AlreadyRunning {
        /// Collector name.
        name: String,
    },

    /// The connector task ended without handing over a connection.
    #[error("{name} connector exited: {reason}")]
    ConnectorExited {
        /// Collector name.
        name: String,
        /// Panic message or join failure.
        reason: String,
    },
}

impl CollectorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CollectorError::AlreadyRunning { .. } => "collector_already_running",
            CollectorError::ConnectorExited { .. } => "collector_connector_exited",
        }
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("invalid json config: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Toml(_) => "config_toml",
            ConfigError::Json(_) => "config_json",
        }
    }
}
