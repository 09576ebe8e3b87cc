//! The daemon-level feed registry.
//!
//! [`FeedDirectory`] owns every configured peer feed, accepts inbound
//! connections, and fans newly arrived articles out to all peers. Peers are
//! inserted only during startup, so fan-out iterates without locks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::article::ArticleId;
use crate::config::{FeedConfig, FeedSettings, FeedsConfig, PeerAddress, FEED_KEY_PREFIX};
use crate::error::FeedResult;
use crate::feed::{PeerFeed, PeerFeedHandle};
use crate::session::{ConnectionDirection, SessionFactory, SessionHandle};

/// Supervision state for the accept loop.
struct ListenerControl {
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Registry of all configured peer feeds and the inbound acceptor.
pub struct FeedDirectory {
    instance_name: String,
    config: Arc<FeedConfig>,
    factory: Arc<dyn SessionFactory>,
    runtime: Handle,
    /// Feed handles keyed `host:port`; duplicates in config collapse here.
    feeds: HashMap<String, PeerFeedHandle>,
    feed_tasks: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    listener: Option<ListenerControl>,
}

impl FeedDirectory {
    /// Create a directory.
    ///
    /// The runtime handle is explicit: every task the directory or its
    /// feeds spawn goes through it, never an ambient executor.
    pub fn new(
        instance_name: impl Into<String>,
        config: FeedConfig,
        factory: Arc<dyn SessionFactory>,
        runtime: Handle,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            instance_name: instance_name.into(),
            config: Arc::new(config),
            factory,
            runtime,
            feeds: HashMap::new(),
            feed_tasks: Vec::new(),
            shutdown_tx,
            listener: None,
        }
    }

    /// Generate a fresh article id under this daemon's instance name.
    pub fn generate_id(&self) -> ArticleId {
        ArticleId::generate(&self.instance_name)
    }

    /// Bind the inbound listener and start accepting feed connections.
    ///
    /// Returns the bound address, which matters when binding port 0. Each
    /// accepted stream is handed to the session factory in inbound mode;
    /// the accept loop never waits on a session.
    pub async fn start_accepting(&mut self, bind_addr: SocketAddr) -> FeedResult<SocketAddr> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Listening for inbound feeds");

        let factory = self.factory.clone();
        let runtime = self.runtime.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = self.runtime.spawn(async move {
            let mut sessions: Vec<SessionHandle> = Vec::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => match result {
                        Ok((stream, addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
                            }
                            tracing::info!(addr = %addr, "Accepted inbound feed");
                            sessions.retain(|s| !s.is_finished());
                            sessions.push(factory.spawn(&runtime, stream, ConnectionDirection::Inbound));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept error");
                        }
                    }
                }
            }
            tracing::info!(count = sessions.len(), "Inbound listener shutting down");
            for session in &sessions {
                session.disconnect();
            }
            for mut session in sessions {
                let _ = timeout(config.shutdown_timeout, session.wait()).await;
            }
        });

        self.listener = Some(ListenerControl { task, local_addr });
        Ok(local_addr)
    }

    /// Address the inbound listener is bound to, if accepting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }

    /// Build one peer feed per `feed-` scoped configuration entry and start
    /// its run loop. Returns the number of live feeds.
    pub fn build_peers(&mut self, feeds_config: &FeedsConfig) -> usize {
        for (key, entry) in &feeds_config.feeds {
            let Some(raw_addr) = key.strip_prefix(FEED_KEY_PREFIX) else {
                continue;
            };
            let address = match PeerAddress::parse(raw_addr) {
                Ok(address) => address,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Skipping feed with bad address");
                    continue;
                }
            };
            let feed_key = address.to_string();
            if self.feeds.contains_key(&feed_key) {
                tracing::debug!(peer = %address, "Duplicate feed entry collapsed");
                continue;
            }
            let settings = match FeedSettings::from_entry(entry) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::error!(peer = %address, error = %e, "Skipping misconfigured feed");
                    continue;
                }
            };

            let (feed, handle) = PeerFeed::new(
                address.clone(),
                settings,
                self.config.clone(),
                self.factory.clone(),
                self.runtime.clone(),
                self.shutdown_tx.subscribe(),
            );
            tracing::info!(peer = %address, "Starting outbound feed");
            self.feed_tasks.push(self.runtime.spawn(feed.run()));
            self.feeds.insert(feed_key, handle);
        }
        self.feeds.len()
    }

    /// Fan a newly arrived article out to every peer feed.
    ///
    /// Each announcement is an unbounded channel send: this never blocks,
    /// and a slow or dead peer cannot delay its siblings.
    pub fn notify(&self, article: &ArticleId) {
        tracing::debug!(article = %article, peers = self.feeds.len(), "Article added");
        for handle in self.feeds.values() {
            handle.notify(article.clone());
        }
    }

    /// Number of registered peer feeds.
    pub fn peer_count(&self) -> usize {
        self.feeds.len()
    }

    /// Addresses of all registered peers.
    pub fn peer_addresses(&self) -> Vec<PeerAddress> {
        self.feeds.values().map(|h| h.address().clone()).collect()
    }

    /// Stop accepting, close the listening socket, and wind down every
    /// supervised task, each bounded by the shutdown timeout.
    pub async fn shutdown(mut self) {
        tracing::info!(feeds = self.feed_tasks.len(), "Feed directory shutting down");
        let _ = self.shutdown_tx.send(());

        if let Some(listener) = self.listener.take() {
            let _ = listener.task.await;
        }
        for task in self.feed_tasks.drain(..) {
            let _ = timeout(self.config.shutdown_timeout, task).await;
        }
        tracing::info!("Feed directory stopped");
    }
}
