//! Messages exchanged between the page and the worker.
//!
//! Both directions use a JSON object with a `type` discriminator, e.g.
//! `{"type":"SKIP_WAITING"}` and `{"type":"RELOAD_REQUIRED","version":null}`.

use serde::{Deserialize, Serialize};

use crate::version::VersionDescriptor;

/// Page-to-worker message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Release a waiting worker so it activates immediately.
    SkipWaiting,
}

/// Worker-to-page message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// A new worker generation took control; pages should reload.
    ReloadRequired {
        /// Freshest descriptor the worker could fetch, if any.
        #[serde(default)]
        version: Option<VersionDescriptor>,
    },
}

impl ClientMessage {
    /// Decode a message posted by a page. Unknown kinds are errors.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Encode for posting.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl WorkerMessage {
    /// Decode a message broadcast by the worker.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Encode for broadcasting.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Descriptor carried by a `RELOAD_REQUIRED` message.
    #[must_use]
    pub fn version(&self) -> Option<&VersionDescriptor> {
        match self {
            Self::ReloadRequired { version } => version.as_ref(),
        }
    }
}
