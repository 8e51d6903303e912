//! Where version descriptors come from.

use std::sync::Arc;

use async_trait::async_trait;
use ft_common::{CACHE_BUST_PARAM, Clock, SystemClock, VersionDescriptor};
use reqwest::Url;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA, USER_AGENT};

use crate::error::{Result, UpdateError};

/// User agent for descriptor polls.
const USER_AGENT_VALUE: &str = concat!("ft-updater/", env!("CARGO_PKG_VERSION"));

/// Something that can fetch the deployed version descriptor.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    /// Fetch the current descriptor, bypassing every HTTP cache.
    async fn fetch_descriptor(&self) -> Result<VersionDescriptor>;
}

/// Resolve the descriptor URL for `base_url` and add a fresh cache-busting
/// token.
pub fn descriptor_url(base_url: &str, version_path: &str, token: i64) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .and_then(|base| base.join(version_path))
        .map_err(|e| UpdateError::InvalidUrl(format!("{base_url}{version_path}: {e}")))?;
    url.query_pairs_mut()
        .append_pair(CACHE_BUST_PARAM, &token.to_string());
    Ok(url)
}

/// Decode and sanity-check a descriptor body.
pub fn parse_descriptor(status: u16, body: &[u8]) -> Result<VersionDescriptor> {
    if !(200..300).contains(&status) {
        return Err(UpdateError::Http { status });
    }
    let descriptor: VersionDescriptor = serde_json::from_slice(body)?;
    if descriptor.version.trim().is_empty() {
        return Err(UpdateError::MissingVersion);
    }
    Ok(descriptor)
}

/// Fetches the descriptor straight from the origin over HTTP.
#[derive(Clone)]
pub struct HttpDescriptorSource {
    client: reqwest::Client,
    base_url: String,
    version_path: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpDescriptorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDescriptorSource")
            .field("base_url", &self.base_url)
            .field("version_path", &self.version_path)
            .finish_non_exhaustive()
    }
}

impl HttpDescriptorSource {
    /// Create a source for `base_url` (e.g. `https://budget.example`).
    pub fn new(base_url: impl Into<String>, version_path: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| UpdateError::Network(format!("failed to create HTTP client: {e}")))?;

        let source = Self {
            client,
            base_url: base_url.into(),
            version_path: version_path.into(),
            clock: Arc::new(SystemClock),
        };
        // Fail early on an unusable address.
        descriptor_url(&source.base_url, &source.version_path, 0)?;
        Ok(source)
    }

    /// Use a different clock for cache-busting tokens.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl DescriptorSource for HttpDescriptorSource {
    async fn fetch_descriptor(&self) -> Result<VersionDescriptor> {
        let url = descriptor_url(&self.base_url, &self.version_path, self.clock.now_millis())?;
        tracing::debug!("Fetching version descriptor from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        parse_descriptor(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_url() {
        let url = descriptor_url("https://budget.example", "/public/version.json", 1234).unwrap();
        assert_eq!(url.as_str(), "https://budget.example/public/version.json?t=1234");

        let url = descriptor_url("https://budget.example/app/", "/public/version.json", 1).unwrap();
        assert_eq!(url.path(), "/public/version.json");

        assert!(matches!(
            descriptor_url("not a url", "/public/version.json", 1),
            Err(UpdateError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_distinct_tokens_give_distinct_urls() {
        let a = descriptor_url("https://budget.example", "/public/version.json", 1).unwrap();
        let b = descriptor_url("https://budget.example", "/public/version.json", 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_descriptor() {
        let ok = parse_descriptor(200, br#"{"version":"1.4.0","build":"77"}"#).unwrap();
        assert_eq!(ok, VersionDescriptor::new("1.4.0").with_build("77"));

        assert!(matches!(
            parse_descriptor(404, b"not found"),
            Err(UpdateError::Http { status: 404 })
        ));
        assert!(matches!(
            parse_descriptor(200, b"<html>"),
            Err(UpdateError::JsonParse(_))
        ));
        assert!(matches!(
            parse_descriptor(200, br#"{"version":""}"#),
            Err(UpdateError::MissingVersion)
        ));
    }

    #[test]
    fn test_source_rejects_bad_base_url() {
        assert!(HttpDescriptorSource::new("::", "/public/version.json").is_err());
        assert!(HttpDescriptorSource::new("https://budget.example", "/public/version.json").is_ok());
    }
}
