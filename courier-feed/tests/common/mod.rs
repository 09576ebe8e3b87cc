//! Shared helpers for feed layer acceptance tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::sleep;

use courier_feed::{
    ArticleId, ConnectionDirection, SessionCommand, SessionFactory, SessionHandle,
};

/// Record of one session spawned by the mock factory.
pub struct SessionRecord {
    pub direction: ConnectionDirection,
    pub peer: Option<SocketAddr>,
    pub received: Arc<Mutex<Vec<ArticleId>>>,
}

/// Session factory that records every spawn and every article it is asked
/// to send. Sessions terminate when their stream reaches EOF, which is what
/// lets tests exercise the reconnect machinery.
#[derive(Default)]
pub struct MockFactory {
    pub sessions: Arc<Mutex<Vec<SessionRecord>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn direction(&self, index: usize) -> ConnectionDirection {
        self.sessions.lock().unwrap()[index].direction
    }

    pub fn received(&self, index: usize) -> Vec<ArticleId> {
        self.sessions.lock().unwrap()[index]
            .received
            .lock()
            .unwrap()
            .clone()
    }
}

impl SessionFactory for MockFactory {
    fn spawn(
        &self,
        runtime: &Handle,
        mut stream: TcpStream,
        direction: ConnectionDirection,
    ) -> SessionHandle {
        let received = Arc::new(Mutex::new(Vec::new()));
        self.sessions.lock().unwrap().push(SessionRecord {
            direction,
            peer: stream.peer_addr().ok(),
            received: received.clone(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(SessionCommand::SendArticle(article)) => {
                            received.lock().unwrap().push(article);
                        }
                        Some(SessionCommand::Disconnect) | None => break,
                    },
                    read = stream.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    },
                }
            }
        });
        SessionHandle::new(tx, task)
    }
}

/// Wait for a condition with timeout, polling periodically.
pub async fn wait_for<F>(timeout_ms: u64, poll_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(poll_ms)).await;
    }
    condition()
}

/// Accept connections and keep the accepted streams alive so peers stay
/// connected for the duration of a test.
pub fn hold_connections(listener: TcpListener) -> Arc<Mutex<Vec<TcpStream>>> {
    let held = Arc::new(Mutex::new(Vec::new()));
    let sink = held.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => sink.lock().unwrap().push(stream),
                Err(_) => break,
            }
        }
    });
    held
}

/// Bind a listener and immediately drop it, yielding a port that refuses
/// connections.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Spawn a fake SOCKS5 proxy. Records every CONNECT target it sees; when
/// `accept_connect` is false every CONNECT is rejected with reply 0x01.
pub async fn spawn_fake_proxy(
    accept_connect: bool,
) -> (SocketAddr, Arc<Mutex<Vec<(String, u16)>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let targets = Arc::new(Mutex::new(Vec::new()));
    let seen = targets.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut greeting = [0u8; 3];
                if stream.read_exact(&mut greeting).await.is_err() {
                    return;
                }
                assert_eq!(greeting, [0x05, 0x01, 0x00]);
                if stream.write_all(&[0x05, 0x00]).await.is_err() {
                    return;
                }

                let mut head = [0u8; 5];
                if stream.read_exact(&mut head).await.is_err() {
                    return;
                }
                assert_eq!(&head[..4], &[0x05, 0x01, 0x00, 0x03]);
                let len = head[4] as usize;
                let mut rest = vec![0u8; len + 2];
                if stream.read_exact(&mut rest).await.is_err() {
                    return;
                }
                let host = String::from_utf8_lossy(&rest[..len]).into_owned();
                let port = u16::from_be_bytes([rest[len], rest[len + 1]]);
                seen.lock().unwrap().push((host, port));

                let rep = if accept_connect { 0x00 } else { 0x01 };
                let mut reply = vec![0x05, rep, 0x00, 0x03, 0x04];
                reply.extend_from_slice(b"test");
                reply.extend_from_slice(&80u16.to_be_bytes());
                if stream.write_all(&reply).await.is_err() {
                    return;
                }

                if accept_connect {
                    // Hold the tunnel open until the client goes away.
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
            });
        }
    });

    (addr, targets)
}
