//! Feed configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FeedError, FeedResult};

/// Default timeout for establishing outbound connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum reconnect interval.
pub const DEFAULT_RECONNECT_MIN: Duration = Duration::from_secs(1);

/// Default maximum reconnect interval.
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Default connection lifetime after which the reconnect interval resets.
pub const DEFAULT_RECONNECT_RESET_AFTER: Duration = Duration::from_secs(30);

/// Default per-task wait during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Key prefix marking a peer-scoped configuration entry.
pub const FEED_KEY_PREFIX: &str = "feed-";

/// Address of one outbound peer: hostname and port.
///
/// Hostnames are kept as strings rather than resolved addresses because the
/// SOCKS5 path forwards them to the proxy unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    /// Create an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string.
    pub fn parse(s: &str) -> FeedResult<Self> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| FeedError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(FeedError::InvalidAddress(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| FeedError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }

    /// The peer hostname.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The peer port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How a peer is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyKind {
    /// Direct TCP connection.
    Direct,
    /// Tunneled through a SOCKS5 proxy.
    Socks5 { proxy: PeerAddress },
    /// A proxy kind from configuration that this daemon does not speak.
    /// The peer exists but can never connect until the config is fixed.
    Unsupported(String),
}

/// Resolved per-peer settings, parsed once from configuration.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Proxy configuration for this peer.
    pub proxy: ProxyKind,
}

impl FeedSettings {
    /// Settings for a plain direct connection.
    pub fn direct() -> Self {
        Self {
            proxy: ProxyKind::Direct,
        }
    }

    /// Resolve settings from a raw configuration entry.
    ///
    /// Unknown proxy kinds are kept as `Unsupported` so the peer stays
    /// registered (and visibly failing) rather than silently vanishing.
    /// A `socks5` entry without proxy host/port is a configuration error.
    pub fn from_entry(entry: &FeedEntry) -> FeedResult<Self> {
        let proxy = match entry.proxy_type.as_deref().map(str::to_ascii_lowercase) {
            None => ProxyKind::Direct,
            Some(kind) if kind == "none" => ProxyKind::Direct,
            Some(kind) if kind == "socks5" => {
                let host = entry.proxy_host.clone().ok_or_else(|| {
                    FeedError::Config("proxy-host is required for proxy-type socks5".to_string())
                })?;
                let port = entry.proxy_port.ok_or_else(|| {
                    FeedError::Config("proxy-port is required for proxy-type socks5".to_string())
                })?;
                ProxyKind::Socks5 {
                    proxy: PeerAddress::new(host.trim(), port),
                }
            }
            Some(kind) => ProxyKind::Unsupported(kind),
        };
        Ok(Self { proxy })
    }
}

/// One raw peer entry from the feeds file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntry {
    /// Proxy kind: absent or `none` for direct, `socks5` for a SOCKS5 tunnel.
    #[serde(rename = "proxy-type")]
    pub proxy_type: Option<String>,

    /// Proxy hostname (required for socks5).
    #[serde(rename = "proxy-host")]
    pub proxy_host: Option<String>,

    /// Proxy port (required for socks5).
    #[serde(rename = "proxy-port")]
    pub proxy_port: Option<u16>,
}

/// The feeds file: peer entries keyed `feed-<host>:<port>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedsConfig {
    /// Raw entries by key. Keys without the `feed-` prefix are ignored when
    /// building peers.
    #[serde(default)]
    pub feeds: BTreeMap<String, FeedEntry>,
}

impl FeedsConfig {
    /// Parse a TOML feeds file.
    pub fn from_toml_str(s: &str) -> FeedResult<Self> {
        toml::from_str(s).map_err(|e| FeedError::Config(e.to_string()))
    }
}

/// What happens to articles announced while a peer has no live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Drop silently. Missed articles are assumed to be recovered by feed
    /// catch-up elsewhere.
    Drop,
    /// Keep a bounded FIFO per peer, evicting oldest, replayed on reconnect.
    Queue { capacity: usize },
}

/// Configuration shared by the feed directory and all of its peer feeds.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Timeout for establishing outbound connections.
    pub connect_timeout: Duration,

    /// Minimum (initial) reconnect interval.
    pub reconnect_min: Duration,

    /// Cap on the reconnect interval.
    pub reconnect_max: Duration,

    /// A connection that lives at least this long resets the interval.
    pub reconnect_reset_after: Duration,

    /// How long to wait for each supervised task during shutdown.
    pub shutdown_timeout: Duration,

    /// Handling of articles announced to a disconnected peer.
    pub delivery: DeliveryPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_min: DEFAULT_RECONNECT_MIN,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            reconnect_reset_after: DEFAULT_RECONNECT_RESET_AFTER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            delivery: DeliveryPolicy::Drop,
        }
    }
}

impl FeedConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect interval bounds.
    pub fn with_reconnect(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min = min;
        self.reconnect_max = max;
        self
    }

    /// Set the connection lifetime that resets the reconnect interval.
    pub fn with_reconnect_reset_after(mut self, lifetime: Duration) -> Self {
        self.reconnect_reset_after = lifetime;
        self
    }

    /// Set the per-task shutdown wait.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the delivery policy for disconnected peers.
    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }
}
