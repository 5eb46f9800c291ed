//! # Restart notices.
//!
//! A [`RestartNotice`] is what subscribers receive when the monitor sees a
//! target restart. It always carries the target identity, so consumers of the
//! merged global stream can tell targets apart.

use std::time::SystemTime;

use crate::redact::TargetId;

/// One detected restart of one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestartNotice {
    /// Identity of the restarted target.
    pub target: TargetId,
    /// Wall-clock time of detection.
    pub detected_at: SystemTime,
}

impl RestartNotice {
    /// Creates a notice stamped with the current time.
    pub fn now(target: TargetId) -> Self {
        Self {
            target,
            detected_at: SystemTime::now(),
        }
    }
}
