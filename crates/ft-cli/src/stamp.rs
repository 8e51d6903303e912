//! Post-build step: stamp the build timestamp into worker artifacts.
//!
//! The worker script ships with the literal [`BUILD_TIMESTAMP_PLACEHOLDER`].
//! After the bundler runs, every occurrence is replaced with the descriptor's
//! `timestamp` (or the current time when the descriptor has none), so each
//! deploy cache-busts its descriptor requests with a distinct token.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use ft_common::{BUILD_TIMESTAMP_PLACEHOLDER, VersionDescriptor};

/// Substitutions made in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedFile {
    /// The artifact.
    pub path: PathBuf,
    /// Number of placeholders replaced.
    pub replacements: usize,
}

/// Result of a stamp run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampReport {
    /// The value written in place of the placeholder.
    pub timestamp: String,
    /// Per-file results, in the order given.
    pub files: Vec<StampedFile>,
}

impl StampReport {
    /// Total replacements across all files.
    #[must_use]
    pub fn total(&self) -> usize {
        self.files.iter().map(|f| f.replacements).sum()
    }
}

/// The timestamp to stamp: the descriptor's own, else `now` as ISO 8601.
pub fn build_timestamp(version_file: &Path, now: DateTime<Utc>) -> Result<String> {
    let raw = fs::read_to_string(version_file)
        .with_context(|| format!("read version descriptor {}", version_file.display()))?;
    let descriptor: VersionDescriptor = serde_json::from_str(&raw)
        .with_context(|| format!("parse version descriptor {}", version_file.display()))?;

    Ok(descriptor
        .timestamp
        .filter(|ts| !ts.trim().is_empty())
        .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

/// Replace every placeholder in `path`. Files without a placeholder are left
/// untouched.
pub fn stamp_file(path: &Path, timestamp: &str) -> Result<usize> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let replacements = content.matches(BUILD_TIMESTAMP_PLACEHOLDER).count();
    if replacements == 0 {
        tracing::warn!("No {} found in {}", BUILD_TIMESTAMP_PLACEHOLDER, path.display());
        return Ok(0);
    }

    let stamped = content.replace(BUILD_TIMESTAMP_PLACEHOLDER, timestamp);
    write_atomic(path, stamped.as_bytes())?;
    tracing::info!(
        "Stamped {} ({} replacements)",
        path.display(),
        replacements
    );
    Ok(replacements)
}

/// Stamp every target with the timestamp taken from `version_file`.
pub fn run_stamp(version_file: &Path, targets: &[PathBuf], now: DateTime<Utc>) -> Result<StampReport> {
    let timestamp = build_timestamp(version_file, now)?;
    let files = targets
        .iter()
        .map(|path| {
            Ok(StampedFile {
                path: path.clone(),
                replacements: stamp_file(path, &timestamp)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(StampReport { timestamp, files })
}

/// Write via temp file + rename so a crash never leaves a half-written
/// artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)
        .with_context(|| format!("create {}", temp_path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 4, 3, 2, 1).unwrap()
    }

    #[test]
    fn test_timestamp_from_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");
        fs::write(&path, r#"{"version":"1.0.0","timestamp":"2025-01-02T03:04:05.000Z"}"#).unwrap();
        assert_eq!(build_timestamp(&path, now()).unwrap(), "2025-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_timestamp_falls_back_to_now() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");
        fs::write(&path, r#"{"version":"1.0.0"}"#).unwrap();
        assert_eq!(build_timestamp(&path, now()).unwrap(), "2025-05-04T03:02:01.000Z");

        fs::write(&path, r#"{"version":"1.0.0","timestamp":""}"#).unwrap();
        assert_eq!(build_timestamp(&path, now()).unwrap(), "2025-05-04T03:02:01.000Z");
    }

    #[test]
    fn test_stamp_file_replaces_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sw.js");
        fs::write(&path, "const A='__BUILD_TIMESTAMP__';const B='__BUILD_TIMESTAMP__';").unwrap();

        assert_eq!(stamp_file(&path, "T").unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "const A='T';const B='T';");
        assert!(!dir.path().join("sw.js.tmp").exists());

        // Already stamped: nothing to do.
        assert_eq!(stamp_file(&path, "T").unwrap(), 0);
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = tempdir().unwrap();
        assert!(build_timestamp(&dir.path().join("nope.json"), now()).is_err());
        assert!(stamp_file(&dir.path().join("nope.js"), "T").is_err());
    }
}
