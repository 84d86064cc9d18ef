//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use cfddns_core::config::{DEFAULT_CACHE_PATH, DEFAULT_CONFIG_PATH};

/// Keep Cloudflare A/AAAA records pointed at this host's public address
///
/// Runs once and exits; schedule it with cron or a systemd timer.
#[derive(Parser, Debug)]
#[command(name = "cfddns")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "CFDDNS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Decide and log, but never change records or the cache
    #[arg(long, env = "CFDDNS_DRY_RUN")]
    pub dry_run: bool,

    /// Cache file
    #[arg(long, env = "CFDDNS_CACHE_PATH", default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Keep the cache in memory for this run only
    #[arg(long, conflicts_with = "trust_cache")]
    pub no_cache: bool,

    /// Skip the provider read when a fresh cache entry matches
    #[arg(long)]
    pub trust_cache: bool,

    /// Log level or filter directives (RUST_LOG wins when set)
    #[arg(long, env = "CFDDNS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}
