//! Node configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use courier_feed::{DeliveryPolicy, FeedConfig, FeedsConfig};

use crate::cli::Cli;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Instance name embedded in generated article ids.
    pub instance_name: String,

    /// Listen address for inbound feed connections.
    pub bind_addr: SocketAddr,

    /// Path to the feeds file.
    pub feeds_file: PathBuf,

    /// Per-peer replay queue capacity; `None` drops missed articles.
    pub queue_missed: Option<usize>,

    /// Log level.
    pub log_level: String,
}

impl NodeConfig {
    /// Create a node configuration from CLI arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            instance_name: cli.instance_name.clone(),
            bind_addr: cli.listen,
            feeds_file: cli.feeds.clone(),
            queue_missed: cli.queue_missed,
            log_level: cli.log_level.clone(),
        }
    }

    /// Build the feed layer configuration from node config.
    pub fn feed_config(&self) -> FeedConfig {
        let mut config = FeedConfig::default();
        if let Some(capacity) = self.queue_missed {
            config = config.with_delivery(DeliveryPolicy::Queue { capacity });
        }
        config
    }

    /// Load and parse the feeds file.
    pub fn load_feeds(&self) -> anyhow::Result<FeedsConfig> {
        let raw = std::fs::read_to_string(&self.feeds_file).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read feeds file '{}': {}",
                self.feeds_file.display(),
                e
            )
        })?;
        FeedsConfig::from_toml_str(&raw).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse feeds file '{}': {}",
                self.feeds_file.display(),
                e
            )
        })
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            instance_name: "news.local".to_string(),
            bind_addr: "0.0.0.0:1199".parse().unwrap(),
            feeds_file: PathBuf::from("feeds.toml"),
            queue_missed: None,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.bind_addr.port(), 1199);
        assert!(config.queue_missed.is_none());
        assert_eq!(
            config.feed_config().delivery,
            DeliveryPolicy::Drop
        );
    }

    #[test]
    fn test_from_cli_maps_queue_policy() {
        let cli = Cli::parse_from(["courier-node", "--queue-missed", "32"]);
        let config = NodeConfig::from_cli(&cli);
        assert_eq!(
            config.feed_config().delivery,
            DeliveryPolicy::Queue { capacity: 32 }
        );
    }

    #[test]
    fn test_load_feeds_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [feeds."feed-10.0.0.1:119"]
            proxy-type = "socks5"
            proxy-host = "127.0.0.1"
            proxy-port = 9050
            "#
        )
        .unwrap();

        let config = NodeConfig {
            feeds_file: file.path().to_path_buf(),
            ..Default::default()
        };
        let feeds = config.load_feeds().unwrap();
        assert_eq!(feeds.feeds.len(), 1);
    }

    #[test]
    fn test_load_feeds_missing_file() {
        let config = NodeConfig {
            feeds_file: PathBuf::from("/nonexistent/feeds.toml"),
            ..Default::default()
        };
        let err = config.load_feeds().unwrap_err();
        assert!(err.to_string().contains("Failed to read feeds file"));
    }

    #[test]
    fn test_load_feeds_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "feeds = [[[").unwrap();

        let config = NodeConfig {
            feeds_file: file.path().to_path_buf(),
            ..Default::default()
        };
        let err = config.load_feeds().unwrap_err();
        assert!(err.to_string().contains("Failed to parse feeds file"));
    }
}
