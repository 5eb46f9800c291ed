//! # Status board.
//!
//! Shared `name → state` map written by the monitor and collector loops and
//! read by whoever reports agent health. Names are component names
//! (`restart-monitor`, `mysql/db1`, `mysql/db1-connector`); states are short
//! human strings (`Running`, `Connect wait 3s`, `Ready`, ...).
//!
//! Writes and reads are short and never held across `.await`, so a std lock
//! is used. A poisoned lock is recovered; the map holds no invariant a panic
//! could break.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// States a loop writes when it exits; nothing overwrites them but a restart.
pub const TERMINAL: [&str; 2] = ["Stopped", "Crashed"];

/// Cloneable handle to a shared status map.
#[derive(Clone, Debug, Default)]
pub struct Status {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl Status {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state of `name`, replacing the previous value.
    pub fn update(&self, name: &str, state: impl Into<String>) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(name.to_string(), state.into());
    }

    /// Sets the state of `name` unless its current state is one of `keep`.
    /// Returns whether the write happened.
    pub fn update_unless(&self, name: &str, state: impl Into<String>, keep: &[&str]) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.get(name).is_some_and(|cur| keep.contains(&cur.as_str())) {
            return false;
        }
        map.insert(name.to_string(), state.into());
        true
    }

    /// Current state of `name`, if it was ever set.
    pub fn get(&self, name: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).cloned()
    }

    /// Snapshot of every entry.
    pub fn all(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_overwrites_and_clones_share_state() {
        let status = Status::new();
        let other = status.clone();

        status.update("restart-monitor", "Running");
        other.update("restart-monitor", "Stopping");
        other.update("mysql/db1", "Ready");

        assert_eq!(status.get("restart-monitor").as_deref(), Some("Stopping"));
        assert_eq!(status.get("missing"), None);
        assert_eq!(status.all().len(), 2);
    }

    #[test]
    fn test_update_unless_keeps_terminal_state() {
        let status = Status::new();
        status.update("mysql/db1", "Crashed");
        assert!(!status.update_unless("mysql/db1", "Stopping", &TERMINAL));
        assert_eq!(status.get("mysql/db1").as_deref(), Some("Crashed"));

        status.update("mysql/db1", "Ready");
        assert!(status.update_unless("mysql/db1", "Stopping", &TERMINAL));
        assert_eq!(status.get("mysql/db1").as_deref(), Some("Stopping"));
        assert!(status.update_unless("fresh", "Stopping", &TERMINAL));
    }
}
