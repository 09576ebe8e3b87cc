//! Per-peer outbound feed management.
//!
//! Each configured peer gets one [`PeerFeed`] running as its own task for
//! the daemon's lifetime. The feed cycles disconnected → connecting →
//! connected, reconnecting with jittered exponential backoff, and forwards
//! article announcements to the live session while one exists.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Instant};

use crate::article::ArticleId;
use crate::config::{DeliveryPolicy, FeedConfig, FeedSettings, PeerAddress, ProxyKind};
use crate::error::{FeedError, FeedResult};
use crate::proxy::ProxyConnector;
use crate::session::{ConnectionDirection, SessionFactory, SessionHandle};

/// Handle held by the directory for announcing articles to one feed.
#[derive(Debug, Clone)]
pub struct PeerFeedHandle {
    address: PeerAddress,
    notify_tx: mpsc::UnboundedSender<ArticleId>,
}

impl PeerFeedHandle {
    /// Announce an article to this peer. Never blocks; if the feed task is
    /// gone the announcement is discarded.
    pub fn notify(&self, article: ArticleId) {
        let _ = self.notify_tx.send(article);
    }

    /// The peer this handle feeds.
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }
}

/// Outbound connection manager for one configured peer.
pub struct PeerFeed {
    address: PeerAddress,
    settings: FeedSettings,
    config: Arc<FeedConfig>,
    factory: Arc<dyn SessionFactory>,
    runtime: Handle,
    notify_rx: mpsc::UnboundedReceiver<ArticleId>,
    shutdown_rx: broadcast::Receiver<()>,
    /// Articles shelved while disconnected, only under the queueing policy.
    pending: VecDeque<ArticleId>,
}

impl PeerFeed {
    /// Create a feed and the handle used to announce articles to it.
    pub fn new(
        address: PeerAddress,
        settings: FeedSettings,
        config: Arc<FeedConfig>,
        factory: Arc<dyn SessionFactory>,
        runtime: Handle,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, PeerFeedHandle) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let handle = PeerFeedHandle {
            address: address.clone(),
            notify_tx,
        };
        let feed = Self {
            address,
            settings,
            config,
            factory,
            runtime,
            notify_rx,
            shutdown_rx,
            pending: VecDeque::new(),
        };
        (feed, handle)
    }

    /// Run the connect/reconnect loop until shutdown.
    pub async fn run(mut self) {
        let mut interval = self.config.reconnect_min;

        loop {
            let result = tokio::select! {
                _ = self.shutdown_rx.recv() => return,
                result = dial(&self.address, &self.settings, &self.config) => result,
            };
            // Anything announced while the dial was in flight was announced
            // to a disconnected peer.
            self.drain_missed();

            let stream = match result {
                Ok(stream) => stream,
                Err(e) => {
                    match e {
                        FeedError::UnsupportedProxy { .. } => {
                            tracing::error!(peer = %self.address, error = %e, "Peer unreachable until configuration is fixed")
                        }
                        _ => {
                            tracing::debug!(peer = %self.address, error = %e, "Connect failed")
                        }
                    }
                    if !self.sleep_backoff(interval).await {
                        return;
                    }
                    interval = next_interval(interval, &self.config);
                    continue;
                }
            };

            tracing::info!(peer = %self.address, "Peer connected");
            let connected_at = Instant::now();
            let mut session =
                self.factory
                    .spawn(&self.runtime, stream, ConnectionDirection::Outbound);

            for article in self.pending.drain(..) {
                session.send_article(article);
            }

            let shutdown = self.drive_session(&mut session).await;
            if shutdown {
                session.disconnect();
                let _ = timeout(self.config.shutdown_timeout, session.wait()).await;
                return;
            }

            tracing::info!(peer = %self.address, "Peer disconnected");
            interval = if connected_at.elapsed() >= self.config.reconnect_reset_after {
                self.config.reconnect_min
            } else {
                next_interval(interval, &self.config)
            };
        }
    }

    /// Forward announcements to the live session until it ends.
    ///
    /// Returns true when shutdown was requested, false when the session
    /// terminated on its own.
    async fn drive_session(&mut self, session: &mut SessionHandle) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return true,
                _ = session.wait() => return false,
                maybe = self.notify_rx.recv() => match maybe {
                    Some(article) => {
                        tracing::debug!(peer = %self.address, article = %article, "Forwarding article");
                        session.send_article(article);
                    }
                    // Directory gone; treat like shutdown.
                    None => return true,
                },
            }
        }
    }

    /// Sleep the reconnect interval (with jitter), still absorbing
    /// announcements. Returns false when shutdown was requested.
    async fn sleep_backoff(&mut self, interval: Duration) -> bool {
        let wait = tokio::time::sleep(with_jitter(interval));
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return false,
                _ = &mut wait => return true,
                maybe = self.notify_rx.recv() => match maybe {
                    Some(article) => self.shelve(article),
                    None => return false,
                },
            }
        }
    }

    /// Apply the delivery policy to an article announced while disconnected.
    fn shelve(&mut self, article: ArticleId) {
        match self.config.delivery {
            DeliveryPolicy::Drop => {
                tracing::trace!(peer = %self.address, article = %article, "No active connection, dropping article");
            }
            DeliveryPolicy::Queue { capacity } => {
                if self.pending.len() >= capacity {
                    self.pending.pop_front();
                }
                self.pending.push_back(article);
            }
        }
    }

    /// Shelve everything already sitting in the notification channel.
    fn drain_missed(&mut self) {
        while let Ok(article) = self.notify_rx.try_recv() {
            self.shelve(article);
        }
    }
}

/// Open a stream to the peer according to its settings.
async fn dial(
    address: &PeerAddress,
    settings: &FeedSettings,
    config: &FeedConfig,
) -> FeedResult<TcpStream> {
    tracing::debug!(peer = %address, "Attempting connection");
    match &settings.proxy {
        ProxyKind::Direct => {
            let stream = timeout(
                config.connect_timeout,
                TcpStream::connect((address.host(), address.port())),
            )
            .await
            .map_err(|_| FeedError::ConnectTimeout {
                addr: address.clone(),
            })??;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!(peer = %address, error = %e, "Failed to set TCP_NODELAY");
            }
            Ok(stream)
        }
        ProxyKind::Socks5 { proxy } => {
            ProxyConnector::new(proxy.clone(), config.connect_timeout)
                .connect(address)
                .await
        }
        ProxyKind::Unsupported(kind) => Err(FeedError::UnsupportedProxy { kind: kind.clone() }),
    }
}

/// Next reconnect interval: double, capped at the configured maximum.
fn next_interval(current: Duration, config: &FeedConfig) -> Duration {
    (current * 2).min(config.reconnect_max)
}

/// Multiplicative jitter of ±25% so a fleet of feeds does not retry in
/// lockstep.
fn with_jitter(interval: Duration) -> Duration {
    interval.mul_f64(rand::thread_rng().gen_range(0.75..1.25))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanicFactory;

    impl SessionFactory for PanicFactory {
        fn spawn(&self, _: &Handle, _: TcpStream, _: ConnectionDirection) -> SessionHandle {
            panic!("no sessions expected in this test");
        }
    }

    fn make_feed(delivery: DeliveryPolicy) -> (PeerFeed, PeerFeedHandle) {
        let config = Arc::new(FeedConfig::new().with_delivery(delivery));
        let (shutdown_tx, _) = broadcast::channel(1);
        PeerFeed::new(
            PeerAddress::new("news.example.org", 119),
            FeedSettings::direct(),
            config,
            Arc::new(PanicFactory),
            Handle::current(),
            shutdown_tx.subscribe(),
        )
    }

    #[test]
    fn test_next_interval_doubles_and_caps() {
        let config = FeedConfig::new()
            .with_reconnect(Duration::from_secs(1), Duration::from_secs(10));
        let mut interval = config.reconnect_min;
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_secs(2));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_secs(4));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_secs(8));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_secs(10));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_secs(4);
        for _ in 0..100 {
            let jittered = with_jitter(base);
            assert!(jittered >= base.mul_f64(0.75));
            assert!(jittered <= base.mul_f64(1.25));
        }
    }

    #[tokio::test]
    async fn test_shelve_drops_by_default() {
        let (mut feed, _handle) = make_feed(DeliveryPolicy::Drop);
        feed.shelve(ArticleId::generate("test"));
        feed.shelve(ArticleId::generate("test"));
        assert!(feed.pending.is_empty());
    }

    #[tokio::test]
    async fn test_shelve_queue_evicts_oldest() {
        let (mut feed, _handle) = make_feed(DeliveryPolicy::Queue { capacity: 2 });
        let first = ArticleId::generate("test");
        let second = ArticleId::generate("test");
        let third = ArticleId::generate("test");
        feed.shelve(first.clone());
        feed.shelve(second.clone());
        feed.shelve(third.clone());
        assert_eq!(feed.pending.len(), 2);
        assert_eq!(feed.pending[0], second);
        assert_eq!(feed.pending[1], third);
    }

    #[tokio::test]
    async fn test_drain_missed_pulls_from_channel() {
        let (mut feed, handle) = make_feed(DeliveryPolicy::Queue { capacity: 8 });
        let article = ArticleId::generate("test");
        handle.notify(article.clone());
        feed.drain_missed();
        assert_eq!(feed.pending.front(), Some(&article));
    }
}
