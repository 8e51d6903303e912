//! Version descriptor and dotted-numeric version ordering.
//!
//! Deployed builds are identified by a small JSON document
//! (`{"version": "1.2.3", "build": "...", "timestamp": "..."}`). Only the
//! `version` field takes part in ordering; it is compared as a tuple of
//! unsigned integers where missing or non-numeric components count as zero.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A version string viewed as a dotted tuple of numbers.
///
/// Trailing zero components are dropped when parsing, so `"2"`, `"2.0"` and
/// `"2.0.0"` are equal, and the derived lexicographic ordering matches a
/// zero-padded component-wise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DottedVersion {
    components: Vec<u64>,
}

impl DottedVersion {
    /// Parse a version string. Never fails: unparseable components become 0,
    /// all-digit components too large for `u64` saturate at `u64::MAX`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut components: Vec<u64> = s.trim().split('.').map(parse_component).collect();

        while components.last() == Some(&0) {
            components.pop();
        }

        Self { components }
    }

    /// Component at `index`, zero when absent.
    #[must_use]
    pub fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }

    /// Significant components (trailing zeros removed).
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

fn parse_component(part: &str) -> u64 {
    let part = part.trim();
    match part.parse::<u64>() {
        Ok(value) => value,
        Err(_) if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => u64::MAX,
        Err(_) => 0,
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Both sides have their trailing zeros stripped, so when one is a
        // prefix of the other the longer one has a non-zero tail.
        self.components.cmp(&other.components)
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Compare two version strings under the dotted-numeric ordering.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    DottedVersion::parse(a).cmp(&DottedVersion::parse(b))
}

/// One deployed build, as served in `version.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Dotted version string, e.g. `"1.2.3"`.
    pub version: String,

    /// Optional free-form build identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    /// Optional ISO8601 build timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl VersionDescriptor {
    /// Create a descriptor with only a version.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build: None,
            timestamp: None,
        }
    }

    /// Set the build identifier.
    #[must_use]
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Set the timestamp from a UTC instant, formatted as RFC 3339 with
    /// millisecond precision.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        self
    }

    /// The version viewed as a dotted tuple.
    #[must_use]
    pub fn dotted(&self) -> DottedVersion {
        DottedVersion::parse(&self.version)
    }

    /// Whether this descriptor's version is strictly greater than `other`'s.
    #[must_use]
    pub fn is_newer_than(&self, other: &VersionDescriptor) -> bool {
        self.dotted() > other.dotted()
    }

    /// Timestamp parsed as RFC 3339, if present and well formed.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Whether the descriptor was stamped more than `max_age` before `now`.
    ///
    /// Descriptors without a parseable timestamp are never considered stale.
    #[must_use]
    pub fn is_older_than(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.parsed_timestamp()
            .is_some_and(|stamped| now.signed_duration_since(stamped) > max_age)
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version {}", self.version)?;
        if let Some(build) = self.build.as_deref().filter(|b| !b.is_empty()) {
            write!(f, " (build {build})")?;
        }
        if let Some(stamped) = self.parsed_timestamp() {
            write!(f, ", built {}", stamped.format("%Y-%m-%d %H:%M UTC"))?;
        }
        Ok(())
    }
}
