//! Node orchestrator.
//!
//! Wires the feed directory to the built-in session factory and runs until
//! a shutdown signal arrives.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use courier_feed::FeedDirectory;

use crate::config::NodeConfig;
use crate::session::AnnounceFactory;
use crate::shutdown::wait_for_shutdown_signal;

/// The main node structure.
pub struct Node {
    /// Node configuration.
    config: NodeConfig,
}

impl Node {
    /// Create a new node with the given configuration.
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Run the node.
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting courier node...");
        tracing::info!("  Instance name: {}", self.config.instance_name);
        tracing::info!("  Listen address: {}", self.config.bind_addr);
        tracing::info!("  Feeds file: {}", self.config.feeds_file.display());

        let feeds = self.config.load_feeds()?;

        let (ingest_tx, mut ingest_rx) = mpsc::unbounded_channel();
        let factory = Arc::new(AnnounceFactory::new(
            self.config.instance_name.clone(),
            ingest_tx,
        ));

        let mut directory = FeedDirectory::new(
            self.config.instance_name.clone(),
            self.config.feed_config(),
            factory,
            Handle::current(),
        );

        let bound = directory.start_accepting(self.config.bind_addr).await?;
        let peers = directory.build_peers(&feeds);
        tracing::info!(addr = %bound, peers, "Node started");

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(article) = ingest_rx.recv() => {
                    // An article arrived on an inbound feed: fan it out.
                    directory.notify(&article);
                }
            }
        }

        tracing::info!("Shutting down node...");
        directory.shutdown().await;
        tracing::info!("Node shutdown complete");
        Ok(())
    }
}
