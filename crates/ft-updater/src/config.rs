//! Polling and handoff configuration.

use std::time::Duration;

use ft_common::{STORAGE_KEY, VERSION_PATH};
use serde::{Deserialize, Serialize};

/// Configuration for the version poll and reload handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between descriptor fetches in milliseconds.
    pub interval_ms: u64,

    /// How long to wait for the new worker to take control after
    /// `SKIP_WAITING` before reloading anyway.
    pub handoff_timeout_ms: u64,

    /// Delay before reloading when only a controller (no waiting worker)
    /// was told to skip waiting.
    pub controller_grace_ms: u64,

    /// Stored versions stamped longer ago than this are discarded.
    pub staleness_days: i64,

    /// Key the stored version lives under.
    pub storage_key: String,

    /// Path of the version descriptor.
    pub version_path: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,        // 1 minute
            handoff_timeout_ms: 1_500,  // 1.5 seconds
            controller_grace_ms: 500,
            staleness_days: 90,
            storage_key: STORAGE_KEY.to_string(),
            version_path: VERSION_PATH.to_string(),
        }
    }
}

impl PollConfig {
    /// Poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Handoff timeout after `SKIP_WAITING` to a waiting worker.
    #[must_use]
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    /// Delay after `SKIP_WAITING` to an already-active controller.
    #[must_use]
    pub fn controller_grace(&self) -> Duration {
        Duration::from_millis(self.controller_grace_ms)
    }

    /// Maximum age of a stored version.
    #[must_use]
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::days(self.staleness_days)
    }
}
