//! Courier news daemon binary.
//!
//! This is the main entry point for the courier node, which composes the
//! feed propagation layer into a running daemon with CLI, logging, and
//! signal handling.

mod cli;
mod config;
mod node;
mod session;
mod shutdown;

use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::NodeConfig;
use crate::node::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Courier Node v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let config = NodeConfig::from_cli(&cli);

    // Create and run node
    Node::new(config).run().await
}
