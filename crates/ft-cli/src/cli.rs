//! CLI argument definitions for `ftpwa`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "ftpwa",
    version,
    about = "Financial Tracker PWA build and update tooling",
    long_about = "Build and diagnostics tooling for the Financial Tracker PWA.\n\n\
                  Stamps the build timestamp into the worker script after bundling,\n\
                  and checks a deployment for a newer version the way an open page does."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Prefix log lines with timestamps (always on with --log-file).
    #[arg(long = "log-timestamps", global = true)]
    pub log_timestamps: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replace the build timestamp placeholder in built worker scripts.
    Stamp(StampArgs),

    /// Check a deployment for a newer version.
    Check(CheckArgs),
}

#[derive(Parser)]
pub struct StampArgs {
    /// Version descriptor providing the timestamp.
    #[arg(
        long = "version-file",
        value_name = "PATH",
        default_value = "public/version.json"
    )]
    pub version_file: PathBuf,

    /// Built worker script to stamp (repeatable).
    #[arg(
        long = "target",
        value_name = "PATH",
        default_values = ["dist/sw.js"]
    )]
    pub targets: Vec<PathBuf>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Origin the app is served from, e.g. https://budget.example.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: String,

    /// File standing in for the page's local storage.
    #[arg(long = "store", value_name = "PATH", default_value = ".ftpwa/storage.json")]
    pub store: PathBuf,

    /// Keep polling until interrupted.
    #[arg(long = "watch")]
    pub watch: bool,

    /// Poll interval in milliseconds (with --watch).
    #[arg(long = "interval-ms", value_name = "MS", default_value_t = 60_000)]
    pub interval_ms: u64,

    /// Record the remote version as current when an update is found.
    #[arg(long = "accept")]
    pub accept: bool,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
