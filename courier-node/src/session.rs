//! Minimal built-in feed session.
//!
//! Outbound sessions announce each new article to the peer with
//! `CHECK <article-id>`; inbound sessions send a ready greeting and ingest
//! the peer's announcements. Transfer negotiation and the rest of the
//! grammar belong to the protocol engine layered on top of this daemon,
//! not here — what this session guarantees is the collaborator contract
//! the feed layer needs: it transmits on request and its task ends when
//! the connection does.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use courier_feed::{
    ArticleId, ConnectionDirection, SessionCommand, SessionFactory, SessionHandle,
};

/// Spawns announce-only feed sessions.
///
/// Article ids ingested from inbound peers are forwarded on the ingest
/// channel; the node fans them out to the other peers.
pub struct AnnounceFactory {
    instance_name: String,
    ingest_tx: mpsc::UnboundedSender<ArticleId>,
}

impl AnnounceFactory {
    /// Create a factory announcing under the given instance name.
    pub fn new(instance_name: impl Into<String>, ingest_tx: mpsc::UnboundedSender<ArticleId>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ingest_tx,
        }
    }
}

impl SessionFactory for AnnounceFactory {
    fn spawn(
        &self,
        runtime: &Handle,
        stream: TcpStream,
        direction: ConnectionDirection,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let instance = self.instance_name.clone();
        let ingest = self.ingest_tx.clone();
        let peer = stream.peer_addr().ok();

        let task = runtime.spawn(async move {
            if let Err(e) = run_session(stream, direction, &instance, command_rx, ingest).await {
                tracing::debug!(?peer, %direction, error = %e, "Session ended with error");
            } else {
                tracing::debug!(?peer, %direction, "Session ended");
            }
        });
        SessionHandle::new(command_tx, task)
    }
}

/// Drive one feed session to completion.
async fn run_session<S>(
    stream: S,
    direction: ConnectionDirection,
    instance: &str,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ingest: mpsc::UnboundedSender<ArticleId>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    if direction == ConnectionDirection::Inbound {
        writer
            .write_all(format!("200 {} feed ready\r\n", instance).as_bytes())
            .await?;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&line, direction, &mut writer, &ingest).await? {
                        break;
                    }
                }
                // EOF: the peer went away.
                None => break,
            },
            command = commands.recv() => match command {
                Some(SessionCommand::SendArticle(article)) => {
                    writer
                        .write_all(format!("CHECK {}\r\n", article).as_bytes())
                        .await?;
                }
                Some(SessionCommand::Disconnect) | None => {
                    let _ = writer.write_all(b"QUIT\r\n").await;
                    break;
                }
            },
        }
    }
    Ok(())
}

/// Handle one line from the peer. Returns false when the session should
/// close.
async fn handle_line<S>(
    line: &str,
    direction: ConnectionDirection,
    writer: &mut WriteHalf<S>,
    ingest: &mpsc::UnboundedSender<ArticleId>,
) -> io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    match direction {
        // Outbound: peer lines are responses to our announcements.
        ConnectionDirection::Outbound => {
            tracing::trace!(line, "Peer response");
            Ok(true)
        }
        ConnectionDirection::Inbound => {
            if let Some(rest) = line.strip_prefix("CHECK ") {
                match ArticleId::parse(rest.trim()) {
                    Some(article) => {
                        let _ = ingest.send(article);
                    }
                    None => {
                        tracing::debug!(line, "Ignoring malformed announcement");
                    }
                }
                Ok(true)
            } else if line.trim().eq_ignore_ascii_case("QUIT") {
                writer.write_all(b"205 closing connection\r\n").await?;
                Ok(false)
            } else {
                tracing::trace!(line, "Ignoring line");
                Ok(true)
            }
        }
    }
}
