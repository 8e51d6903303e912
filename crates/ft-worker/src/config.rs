//! Worker configuration.
//!
//! Everything the worker bakes in at build time: origin, cache naming, the
//! shell manifest and the build timestamp injected by the post-build step.
//! `WorkerConfig::default()` reproduces the deployed layout; a TOML file can
//! override any field.

use std::path::Path;

use chrono::{DateTime, Utc};
use ft_common::{BUILD_TIMESTAMP_PLACEHOLDER, VERSION_PATH};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::CacheNames;
use crate::error::{Result, WorkerError};

/// Default cache name prefix.
pub const DEFAULT_CACHE_PREFIX: &str = "ft";

/// Default cache generation suffix. Bump to invalidate every cache.
pub const DEFAULT_CACHE_VERSION: &str = "v1";

/// Path of the cached shell document served for navigations.
pub const SHELL_DOCUMENT: &str = "/index.html";

/// Root-relative paths precached at install time.
pub const DEFAULT_SHELL_MANIFEST: [&str; 6] = [
    "/",
    SHELL_DOCUMENT,
    "/public/manifest.json",
    "/public/icons/icon-192.png",
    "/public/icons/icon-512.png",
    VERSION_PATH,
];

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered for, e.g. `https://budget.example`.
    pub origin: String,

    /// Cache name prefix.
    pub cache_prefix: String,

    /// Cache generation suffix.
    pub cache_version: String,

    /// Path of the version descriptor.
    pub version_path: String,

    /// Path of the shell document used for navigations.
    pub shell_document: String,

    /// Paths precached into the static generation on install.
    pub shell_manifest: Vec<String>,

    /// Build timestamp; still the placeholder when the post-build step did
    /// not run.
    pub build_timestamp: String,

    /// Skip all caching when the origin is a local development host.
    pub bypass_local_hosts: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            version_path: VERSION_PATH.to_string(),
            shell_document: SHELL_DOCUMENT.to_string(),
            shell_manifest: DEFAULT_SHELL_MANIFEST.iter().map(ToString::to_string).collect(),
            build_timestamp: BUILD_TIMESTAMP_PLACEHOLDER.to_string(),
            bypass_local_hosts: true,
        }
    }
}

impl WorkerConfig {
    /// Default settings for the given origin.
    #[must_use]
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Parse settings from TOML. Missing fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// The origin as a URL.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .map_err(|e| WorkerError::Config(format!("origin {:?}: {e}", self.origin)))?;
        if url.host_str().is_none() {
            return Err(WorkerError::Config(format!(
                "origin {:?} has no host",
                self.origin
            )));
        }
        Ok(url)
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        if self.cache_prefix.is_empty() || self.cache_version.is_empty() {
            return Err(WorkerError::Config(
                "cache prefix and version must not be empty".to_string(),
            ));
        }
        for path in std::iter::once(&self.version_path)
            .chain(std::iter::once(&self.shell_document))
            .chain(&self.shell_manifest)
        {
            if !path.starts_with('/') {
                return Err(WorkerError::Config(format!(
                    "path {path:?} must be root-relative"
                )));
            }
        }
        Ok(())
    }

    /// Cache names for this configuration.
    #[must_use]
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.cache_prefix, &self.cache_version)
    }

    /// The build timestamp, resolved.
    #[must_use]
    pub fn build_stamp(&self) -> BuildStamp {
        BuildStamp::resolve(&self.build_timestamp)
    }

    /// Whether caching is bypassed for this origin.
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.bypass_local_hosts
            && self
                .origin_url()
                .ok()
                .and_then(|url| url.host_str().map(is_local_host))
                .unwrap_or(false)
    }
}

/// The build timestamp as known at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStamp {
    /// The post-build step substituted a real value.
    Stamped(String),
    /// The placeholder is still present (or the value is empty).
    Unstamped,
}

impl BuildStamp {
    /// Resolve a raw configured value.
    #[must_use]
    pub fn resolve(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.contains(BUILD_TIMESTAMP_PLACEHOLDER) {
            Self::Unstamped
        } else {
            Self::Stamped(raw.to_string())
        }
    }

    /// Token for the `t` query parameter.
    ///
    /// A stamped RFC 3339 value becomes its epoch milliseconds, any other
    /// stamped value is used as-is, and an unstamped build uses `now`.
    #[must_use]
    pub fn cache_bust_token(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Stamped(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.timestamp_millis().to_string())
                .unwrap_or_else(|_| raw.clone()),
            Self::Unstamped => now.timestamp_millis().to_string(),
        }
    }
}

/// Whether a host name is a local development host.
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost" || host == "127.0.0.1" || host == "::1" || host.ends_with(".localhost")
}
