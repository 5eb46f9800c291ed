//! # Agent configuration.
//!
//! - [`MonitorConfig`] tunes the restart monitor.
//! - [`CollectorConfig`] describes one metric collector; it is also the JSON
//!   start payload a collector receives.
//! - [`AgentConfig`] bundles both and is loaded from a TOML file.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! # Example
//! ```
//! use dbsentry::AgentConfig;
//!
//! let cfg = AgentConfig::from_toml_str(r#"
//!     [monitor]
//!     interval_secs = 5
//!
//!     [[collectors]]
//!     target = "agent:secret@tcp(db1:3306)/"
//!     instance_name = "db1"
//!     setup = ["SET GLOBAL userstat=ON"]
//!
//!     [collectors.status]
//!     threads_connected = "gauge"
//!     queries = "counter"
//! "#).unwrap();
//!
//! assert_eq!(cfg.monitor.interval_secs, 5);
//! assert_eq!(cfg.collectors[0].prefix(), "mysql/db1");
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::MetricKind;
use crate::error::ConfigError;
use crate::policies::BackoffPolicy;
use crate::redact::TargetId;

fn default_interval_secs() -> u64 {
    1
}

fn default_io_timeout_ms() -> u64 {
    2000
}

fn default_notice_capacity() -> usize {
    1
}

fn default_global_capacity() -> usize {
    100
}

fn default_service() -> String {
    "mysql".to_string()
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_reset_after_secs() -> u64 {
    5
}

/// Restart monitor settings.
///
/// ## Field semantics
/// - `interval_secs`: poll period (`0` is treated as 1s)
/// - `io_timeout_ms`: deadline for opening a connection and reading uptime
/// - `notice_capacity`: queue size of each direct subscription (min 1)
/// - `global_capacity`: queue size of the merged global stream (min 1)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,
    #[serde(default = "default_global_capacity")]
    pub global_capacity: usize,
}

impl MonitorConfig {
    /// Poll period, at least one second.
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Per-target I/O deadline.
    #[inline]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            io_timeout_ms: default_io_timeout_ms(),
            notice_capacity: default_notice_capacity(),
            global_capacity: default_global_capacity(),
        }
    }
}

/// One metric collector.
///
/// Accepts both snake_case keys and the legacy `DSN`/`InstanceName`/`Status`
/// keys of the collector start payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Target to connect to (usually a DSN with credentials).
    #[serde(alias = "DSN", alias = "dsn")]
    pub target: TargetId,
    /// Optional instance name appended to the metric prefix.
    #[serde(default, alias = "InstanceName")]
    pub instance_name: String,
    /// Service name, the first segment of every metric name.
    #[serde(default = "default_service")]
    pub service: String,
    /// Statements run once after each successful connect; failures are logged.
    #[serde(default, alias = "Setup")]
    pub setup: Vec<String>,
    /// Status variables to collect (lowercase name → kind).
    #[serde(default, alias = "Status")]
    pub status: BTreeMap<String, MetricKind>,
    /// InnoDB metric counters to enable (`innodb_monitor_enable` value);
    /// empty disables InnoDB metrics.
    #[serde(default, alias = "InnoDB")]
    pub innodb: String,
    /// Collect per-table and per-index user statistics.
    #[serde(default, alias = "UserStats")]
    pub user_stats: bool,
    /// `LIKE` pattern of schemas left out of user statistics.
    #[serde(default, alias = "UserStatsIgnoreDb")]
    pub user_stats_ignore_db: String,
    /// How long delivery of one collection may block before it is dropped.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Minimum spacing of successes that resets the reconnect backoff.
    #[serde(default = "default_reset_after_secs")]
    pub reset_after_secs: u64,
}

impl CollectorConfig {
    /// Creates a config with defaults for everything but the target.
    pub fn new(target: impl Into<TargetId>) -> Self {
        Self {
            target: target.into(),
            instance_name: String::new(),
            service: default_service(),
            setup: Vec::new(),
            status: BTreeMap::new(),
            innodb: String::new(),
            user_stats: false,
            user_stats_ignore_db: String::new(),
            send_timeout_ms: default_send_timeout_ms(),
            reset_after_secs: default_reset_after_secs(),
        }
    }

    /// Parses a JSON start payload.
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut cfg: Self = serde_json::from_slice(raw)?;
        cfg.status = cfg
            .status
            .into_iter()
            .map(|(name, kind)| (name.to_lowercase(), kind))
            .collect();
        Ok(cfg)
    }

    /// Metric name prefix: `service` or `service/instance_name`.
    pub fn prefix(&self) -> String {
        if self.instance_name.is_empty() {
            self.service.clone()
        } else {
            format!("{}/{}", self.service, self.instance_name)
        }
    }

    /// Statements run after each connect: the enabling statements of the
    /// optional metric groups, then `setup`.
    pub fn setup_statements(&self) -> Vec<String> {
        let mut stmts = Vec::with_capacity(self.setup.len() + 2);
        if !self.innodb.is_empty() {
            stmts.push(format!(
                "SET GLOBAL innodb_monitor_enable = \"{}\"",
                self.innodb
            ));
        }
        if self.user_stats {
            stmts.push("SET GLOBAL userstat=ON".to_string());
        }
        stmts.extend(self.setup.iter().cloned());
        stmts
    }

    #[inline]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Reconnect backoff with this collector's reset window.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::default().with_reset_after(Duration::from_secs(self.reset_after_secs))
    }
}

/// Whole agent configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
}

impl AgentConfig {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self = toml::from_str(raw)?;
        for collector in &mut cfg.collectors {
            collector.status = std::mem::take(&mut collector.status)
                .into_iter()
                .map(|(name, kind)| (name.to_lowercase(), kind))
                .collect();
        }
        Ok(cfg)
    }
}
