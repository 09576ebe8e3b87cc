//! Command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Courier news daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "courier-node")]
#[command(about = "Store-and-forward news daemon")]
#[command(version)]
pub struct Cli {
    /// Instance name embedded in generated article ids.
    #[arg(long, default_value = "news.local")]
    pub instance_name: String,

    /// Listen address for inbound feed connections.
    #[arg(long, default_value = "0.0.0.0:1199")]
    pub listen: SocketAddr,

    /// Path to the feeds configuration file.
    #[arg(long, default_value = "feeds.toml")]
    pub feeds: PathBuf,

    /// Keep up to N missed articles per peer and replay them on reconnect.
    /// Without this flag, articles announced to a disconnected peer are
    /// dropped.
    #[arg(long)]
    pub queue_missed: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
