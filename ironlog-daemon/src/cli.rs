//! CLI argument definitions for ironlog-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Ironlog syslog ingestion daemon.
///
/// Receives syslog over UDP and TCP, decodes each message into a JSON
/// document and writes the documents in bulk to the configured sink.
#[derive(Parser, Debug)]
#[command(name = "ironlog-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ironlog.toml configuration file.
    #[arg(short, long, default_value = "/etc/ironlog/ironlog.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the syslog port spec (e.g. "514" or "9500-9600").
    #[arg(long)]
    pub port: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
