//! Plain-text summaries printed by the `ftpwa` commands.

use std::fmt::Write;

use chrono::SecondsFormat;
use ft_updater::UpdateStatus;

use crate::stamp::StampReport;

/// Summary of a stamp run.
#[must_use]
pub fn render_stamp(report: &StampReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Build timestamp: {}", report.timestamp);
    for file in &report.files {
        let _ = writeln!(
            out,
            "  {}: {} replacement{}",
            file.path.display(),
            file.replacements,
            if file.replacements == 1 { "" } else { "s" }
        );
    }
    let _ = write!(out, "Total: {}", report.total());
    out
}

/// Summary of a version check against `origin`.
#[must_use]
pub fn render_status(origin: &str, status: &UpdateStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Origin:  {origin}");
    match &status.current {
        Some(current) => {
            let _ = writeln!(out, "Current: {current}");
        }
        None => {
            let _ = writeln!(out, "Current: unknown");
        }
    }
    match &status.remote {
        Some(remote) => {
            let _ = writeln!(out, "Remote:  {remote}");
        }
        None => {
            let _ = writeln!(out, "Remote:  unreachable");
        }
    }
    if let Some(checked) = status.last_checked {
        let _ = writeln!(
            out,
            "Checked: {}",
            checked.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    let verdict = if status.update_available {
        "A new version is available"
    } else {
        "Up to date"
    };
    out.push_str(verdict);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::StampedFile;
    use chrono::{TimeZone, Utc};
    use ft_common::VersionDescriptor;
    use std::path::PathBuf;

    #[test]
    fn test_render_update_available() {
        let status = UpdateStatus {
            current: Some(VersionDescriptor::new("1.0.0")),
            remote: Some(
                VersionDescriptor::new("1.1.0")
                    .with_build("42")
                    .with_timestamp(Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()),
            ),
            update_available: true,
            last_checked: Some(Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap()),
        };
        insta::assert_snapshot!(render_status("https://budget.example", &status), @r"
        Origin:  https://budget.example
        Current: Version 1.0.0
        Remote:  Version 1.1.0 (build 42), built 2025-03-01 09:30 UTC
        Checked: 2025-03-02T08:00:00Z
        A new version is available
        ");
    }

    #[test]
    fn test_render_unreachable() {
        let status = UpdateStatus::default();
        insta::assert_snapshot!(render_status("https://budget.example", &status), @r"
        Origin:  https://budget.example
        Current: unknown
        Remote:  unreachable
        Up to date
        ");
    }

    #[test]
    fn test_render_stamp() {
        let report = StampReport {
            timestamp: "2025-01-02T03:04:05.000Z".to_string(),
            files: vec![
                StampedFile {
                    path: PathBuf::from("dist/sw.js"),
                    replacements: 2,
                },
                StampedFile {
                    path: PathBuf::from("dist/sw-legacy.js"),
                    replacements: 1,
                },
            ],
        };
        insta::assert_snapshot!(render_stamp(&report), @r"
        Build timestamp: 2025-01-02T03:04:05.000Z
          dist/sw.js: 2 replacements
          dist/sw-legacy.js: 1 replacement
        Total: 3
        ");
    }
}
