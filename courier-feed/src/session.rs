//! The session collaborator seam.
//!
//! The protocol engine that actually drives bytes over an established
//! connection lives behind [`SessionFactory`]. The feed layer only needs
//! two capabilities from a running session: fire-and-forget article
//! transmission and the ability to observe that the session task ended.

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::article::ArticleId;

/// Direction of the connection a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDirection {
    /// We dialed the peer.
    Outbound,
    /// The peer dialed us.
    Inbound,
}

impl std::fmt::Display for ConnectionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionDirection::Outbound => write!(f, "outbound"),
            ConnectionDirection::Inbound => write!(f, "inbound"),
        }
    }
}

/// Commands accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Transmit the named article to the peer.
    SendArticle(ArticleId),
    /// Wind the session down gracefully.
    Disconnect,
}

/// Handle to a spawned session task.
///
/// Commands go over an unbounded channel so senders never block; the
/// retained [`JoinHandle`] is how the owner supervises the task.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Wrap a command sender and the session task handle.
    pub fn new(commands: mpsc::UnboundedSender<SessionCommand>, task: JoinHandle<()>) -> Self {
        Self { commands, task }
    }

    /// Request transmission of an article. Returns false if the session is
    /// no longer accepting commands.
    pub fn send_article(&self, article: ArticleId) -> bool {
        self.commands
            .send(SessionCommand::SendArticle(article))
            .is_ok()
    }

    /// Ask the session to wind down.
    pub fn disconnect(&self) {
        let _ = self.commands.send(SessionCommand::Disconnect);
    }

    /// Whether the session task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to end.
    pub async fn wait(&mut self) {
        let _ = (&mut self.task).await;
    }
}

/// Builds session tasks over established streams.
///
/// The two construction variants of a session, inbound and outbound, are
/// selected by [`ConnectionDirection`]. Spawning goes through the explicit
/// runtime handle so the library never assumes an ambient executor.
pub trait SessionFactory: Send + Sync {
    /// Spawn a session task over an established stream.
    fn spawn(
        &self,
        runtime: &Handle,
        stream: TcpStream,
        direction: ConnectionDirection,
    ) -> SessionHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_observes_task_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            // Run until told to disconnect.
            while let Some(cmd) = rx.recv().await {
                if matches!(cmd, SessionCommand::Disconnect) {
                    break;
                }
            }
        });
        let mut handle = SessionHandle::new(tx, task);

        assert!(!handle.is_finished());
        assert!(handle.send_article(ArticleId::generate("test")));
        handle.disconnect();
        handle.wait().await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_send_after_task_end_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let task = tokio::spawn(async {});
        let mut handle = SessionHandle::new(tx, task);
        handle.wait().await;
        assert!(!handle.send_article(ArticleId::generate("test")));
    }
}
