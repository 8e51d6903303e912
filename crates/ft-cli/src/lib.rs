//! Library components for the `ftpwa` tool.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod report;
pub mod stamp;
