//! Shared types for the Financial Tracker offline shell.
//!
//! The worker context and the page context never share memory. They agree on
//! three things, all defined here:
//!
//! - the version descriptor document served at [`VERSION_PATH`]
//! - the dotted-numeric ordering used to decide whether a build is newer
//! - the two message kinds exchanged over the cross-context channel
//!
//! # Example
//!
//! ```
//! use ft_common::{DottedVersion, VersionDescriptor};
//!
//! let stored = VersionDescriptor::new("1.2.0");
//! let remote = VersionDescriptor::new("1.10.0");
//! assert!(remote.is_newer_than(&stored));
//! assert_eq!(DottedVersion::parse("2"), DottedVersion::parse("2.0.0"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bust;
pub mod clock;
pub mod message;
pub mod version;

pub use bust::{CACHE_BUST_PARAM, with_cache_bust};
pub use clock::{Clock, ManualClock, SystemClock};
pub use message::{ClientMessage, WorkerMessage};
pub use version::{DottedVersion, VersionDescriptor, compare_versions};

/// Root-relative path the version descriptor is served from.
pub const VERSION_PATH: &str = "/public/version.json";

/// Literal token the post-build step replaces with the build timestamp.
pub const BUILD_TIMESTAMP_PLACEHOLDER: &str = "__BUILD_TIMESTAMP__";

/// Local storage key holding the version the page believes it runs.
pub const STORAGE_KEY: &str = "app_version";
