//! Outbound feed propagation for the courier news daemon.
//!
//! This crate owns the peer-facing half of a store-and-forward news
//! daemon:
//!
//! - One persistent, self-reconnecting outbound connection per configured
//!   peer, optionally tunneled through a SOCKS5 proxy
//! - Fan-out of newly arrived article ids to every peer
//! - Accepting inbound feed connections and handing them to the session
//!   layer
//!
//! The protocol engine that speaks over an established connection is a
//! collaborator behind [`SessionFactory`]; this crate manages connection
//! lifecycle, not the wire grammar.
//!
//! # Architecture
//!
//! The layer uses a task-per-peer design. Components communicate only over
//! channels; nothing here shares mutable state across tasks.
//!
//! ```text
//! FeedDirectory
//! ├── Listener Task (accept inbound, spawn inbound sessions)
//! ├── PeerFeed Task 1 (connect/reconnect loop, outbound session)
//! ├── PeerFeed Task 2
//! └── ...
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use courier_feed::{FeedConfig, FeedDirectory, FeedsConfig};
//! use std::sync::Arc;
//!
//! let mut directory = FeedDirectory::new(
//!     "news.example.tld",
//!     FeedConfig::default(),
//!     factory,
//!     tokio::runtime::Handle::current(),
//! );
//! directory.start_accepting("0.0.0.0:1199".parse().unwrap()).await?;
//! directory.build_peers(&FeedsConfig::from_toml_str(&feeds_toml)?);
//!
//! let id = directory.generate_id();
//! directory.notify(&id);
//! ```

pub mod article;
pub mod config;
pub mod directory;
pub mod error;
pub mod feed;
pub mod proxy;
pub mod session;

// Re-export main types
pub use article::ArticleId;
pub use config::{
    DeliveryPolicy, FeedConfig, FeedEntry, FeedSettings, FeedsConfig, PeerAddress, ProxyKind,
};
pub use directory::FeedDirectory;
pub use error::{FeedError, FeedResult};
pub use feed::{PeerFeed, PeerFeedHandle};
pub use proxy::ProxyConnector;
pub use session::{ConnectionDirection, SessionCommand, SessionFactory, SessionHandle};
