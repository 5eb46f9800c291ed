//! Metric samples and the per-tick envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// How a sample is aggregated downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic total; downstream computes rates.
    Counter,
    /// Point-in-time value.
    Gauge,
}

/// One named sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
        }
    }
}

/// Samples gathered on one tick, in extraction order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unix timestamp (seconds, UTC) of the tick.
    pub ts: i64,
    pub metrics: Vec<Metric>,
}

impl Collection {
    /// Creates an empty envelope stamped with `at`.
    pub fn at(at: SystemTime) -> Self {
        let ts = match at.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self {
            ts,
            metrics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timestamp_is_unix_seconds() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        assert_eq!(Collection::at(at).ts, 1_700_000_000);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let m = Metric::new("mysql/queries", MetricKind::Counter, 3.0);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"name":"mysql/queries","kind":"counter","value":3.0}"#);
    }
}
