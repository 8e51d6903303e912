//! Integration tests for the post-build stamp step.

use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use ft_cli::stamp::run_stamp;

const WORKER: &str = "const BUILD_TIMESTAMP = '__BUILD_TIMESTAMP__';\n\
                      const CACHE_BUST = BUILD_TIMESTAMP === '__BUILD_TIMESTAMP__' ? Date.now() : BUILD_TIMESTAMP;\n";

fn build_dir(descriptor: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let version = dir.path().join("version.json");
    let worker = dir.path().join("sw.js");
    fs::write(&version, descriptor).unwrap();
    fs::write(&worker, WORKER).unwrap();
    (dir, version, worker)
}

#[test]
fn test_stamp_uses_descriptor_timestamp() {
    let (_dir, version, worker) =
        build_dir(r#"{"version":"1.4.0","build":"77","timestamp":"2025-06-01T10:00:00.000Z"}"#);

    let report = run_stamp(&version, std::slice::from_ref(&worker), Utc::now()).unwrap();

    assert_eq!(report.timestamp, "2025-06-01T10:00:00.000Z");
    assert_eq!(report.total(), 2);
    let stamped = fs::read_to_string(&worker).unwrap();
    assert!(!stamped.contains("__BUILD_TIMESTAMP__"));
    assert_eq!(stamped.matches("2025-06-01T10:00:00.000Z").count(), 2);
}

#[test]
fn test_stamp_without_timestamp_uses_now() {
    let (_dir, version, worker) = build_dir(r#"{"version":"1.4.0"}"#);
    let now = Utc.with_ymd_and_hms(2025, 7, 8, 9, 10, 11).unwrap();

    let report = run_stamp(&version, &[worker.clone()], now).unwrap();

    assert_eq!(report.timestamp, "2025-07-08T09:10:11.000Z");
    assert!(fs::read_to_string(&worker).unwrap().contains("2025-07-08T09:10:11.000Z"));
}

#[test]
fn test_stamp_multiple_targets() {
    let (dir, version, worker) = build_dir(r#"{"version":"2.0.0","timestamp":"T1"}"#);
    let plain = dir.path().join("vendor.js");
    fs::write(&plain, "console.log('no placeholder');").unwrap();

    let report = run_stamp(&version, &[worker.clone(), plain.clone()], Utc::now()).unwrap();

    let counts: Vec<usize> = report.files.iter().map(|f| f.replacements).collect();
    assert_eq!(counts, vec![2, 0]);
    assert_eq!(
        fs::read_to_string(&plain).unwrap(),
        "console.log('no placeholder');"
    );
}

#[test]
fn test_stamp_missing_target_fails() {
    let (dir, version, _worker) = build_dir(r#"{"version":"1.0.0"}"#);
    let missing = dir.path().join("dist").join("sw.js");

    let err = run_stamp(&version, &[missing], Utc::now()).unwrap_err();
    assert!(format!("{err:#}").contains("sw.js"));
}

#[test]
fn test_stamp_unreadable_descriptor_fails() {
    let (_dir, version, worker) = build_dir("not json");

    assert!(run_stamp(&version, &[worker.clone()], Utc::now()).is_err());
    // Nothing is written when the descriptor cannot be read.
    assert_eq!(fs::read_to_string(&worker).unwrap(), WORKER);
}
