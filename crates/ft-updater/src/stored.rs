//! The version this client believes it is running.
//!
//! Reads validate what they find and discard anything unusable; writes are
//! best effort. Neither ever fails the caller.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use ft_common::{Clock, SystemClock, VersionDescriptor};

use crate::config::PollConfig;
use crate::store::KeyValueStore;

/// Why a stored value was thrown away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not a JSON descriptor.
    InvalidJson(String),
    /// The `version` field is empty.
    MissingVersion,
    /// Stamped longer ago than the staleness threshold.
    Stale {
        /// Age in whole days.
        age_days: i64,
    },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(reason) => write!(f, "invalid JSON ({reason})"),
            Self::MissingVersion => f.write_str("missing version"),
            Self::Stale { age_days } => write!(f, "stale ({age_days} days old)"),
        }
    }
}

/// Outcome of reading the stored version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredVersion {
    /// Nothing stored, or storage could not be read.
    Absent,
    /// A usable descriptor.
    Valid(VersionDescriptor),
    /// Something was stored but has been discarded.
    Discarded(DiscardReason),
}

impl StoredVersion {
    /// The descriptor, if usable.
    #[must_use]
    pub fn into_descriptor(self) -> Option<VersionDescriptor> {
        match self {
            Self::Valid(descriptor) => Some(descriptor),
            Self::Absent | Self::Discarded(_) => None,
        }
    }
}

/// Typed access to the stored version.
pub struct VersionStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionStore")
            .field("key", &self.key)
            .field("max_age_days", &self.max_age.num_days())
            .finish_non_exhaustive()
    }
}

impl VersionStore {
    /// Wrap `store` using the key and staleness threshold from `config`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: &PollConfig) -> Self {
        Self {
            store,
            key: config.storage_key.clone(),
            max_age: config.staleness(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock for the staleness check.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read and validate. Unusable values are removed from storage.
    pub fn load(&self) -> StoredVersion {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoredVersion::Absent,
            Err(err) => {
                tracing::warn!("Could not read stored version: {}", err);
                return StoredVersion::Absent;
            }
        };

        match self.validate(&raw) {
            Ok(descriptor) => StoredVersion::Valid(descriptor),
            Err(reason) => {
                tracing::warn!("Discarding stored version: {}", reason);
                if let Err(err) = self.store.remove(&self.key) {
                    tracing::warn!("Could not remove stored version: {}", err);
                }
                StoredVersion::Discarded(reason)
            }
        }
    }

    /// Read and validate, returning only a usable descriptor.
    #[must_use]
    pub fn read(&self) -> Option<VersionDescriptor> {
        self.load().into_descriptor()
    }

    fn validate(&self, raw: &str) -> Result<VersionDescriptor, DiscardReason> {
        let descriptor: VersionDescriptor =
            serde_json::from_str(raw).map_err(|e| DiscardReason::InvalidJson(e.to_string()))?;

        if descriptor.version.trim().is_empty() {
            return Err(DiscardReason::MissingVersion);
        }

        let now = self.clock.now();
        if descriptor.is_older_than(self.max_age, now) {
            let age_days = descriptor
                .parsed_timestamp()
                .map_or(0, |stamped| now.signed_duration_since(stamped).num_days());
            return Err(DiscardReason::Stale { age_days });
        }

        Ok(descriptor)
    }

    /// Persist `descriptor`. Returns whether the write succeeded.
    pub fn write(&self, descriptor: &VersionDescriptor) -> bool {
        let raw = match serde_json::to_string(descriptor) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Could not encode stored version: {}", err);
                return false;
            }
        };
        match self.store.set(&self.key, &raw) {
            Ok(()) => {
                tracing::debug!("Stored version {}", descriptor.version);
                true
            }
            Err(err) => {
                tracing::warn!("Could not persist stored version: {}", err);
                false
            }
        }
    }
}
