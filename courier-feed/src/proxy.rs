//! SOCKS5 CONNECT client.
//!
//! Tunnels an outbound feed connection through a SOCKS5 proxy. Only the
//! CONNECT command with no authentication is spoken, and targets are always
//! sent as domain names; the proxy resolves them, which keeps peer
//! hostnames off the local resolver.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::PeerAddress;
use crate::error::{FeedError, FeedResult};

// SOCKS5 protocol constants.
pub const VERSION5: u8 = 0x05;
pub const AUTH_NONE: u8 = 0x00;
pub const CMD_CONNECT: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const REP_SUCCESS: u8 = 0x00;

/// Connects to a target through a SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct ProxyConnector {
    proxy: PeerAddress,
    connect_timeout: Duration,
}

impl ProxyConnector {
    /// Create a connector for the given proxy.
    pub fn new(proxy: PeerAddress, connect_timeout: Duration) -> Self {
        Self {
            proxy,
            connect_timeout,
        }
    }

    /// Open a stream to `target` tunneled through the proxy.
    ///
    /// Handshake failures are returned as errors; the caller decides the
    /// retry policy. No retries happen inside this call.
    pub async fn connect(&self, target: &PeerAddress) -> FeedResult<TcpStream> {
        let mut stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.proxy.host(), self.proxy.port())),
        )
        .await
        .map_err(|_| FeedError::ConnectTimeout {
            addr: self.proxy.clone(),
        })??;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(proxy = %self.proxy, error = %e, "Failed to set TCP_NODELAY");
        }

        socks5_connect(&mut stream, target).await?;
        tracing::debug!(proxy = %self.proxy, target = %target, "Proxy tunnel established");
        Ok(stream)
    }
}

/// Perform the SOCKS5 CONNECT handshake on an open stream.
///
/// On return the stream is positioned exactly past the proxy's reply, on
/// the failure path too, so a caller reusing the transport sees no stale
/// handshake bytes.
pub async fn socks5_connect<S>(stream: &mut S, target: &PeerAddress) -> FeedResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let host = target.host().as_bytes();
    if host.is_empty() || host.len() > 255 {
        return Err(FeedError::InvalidAddress(target.to_string()));
    }

    // Greeting: offer exactly one method, no authentication.
    stream.write_all(&[VERSION5, 0x01, AUTH_NONE]).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply != [VERSION5, AUTH_NONE] {
        return Err(FeedError::HandshakeFailed {
            stage: "method",
            reply,
        });
    }

    // CONNECT request, target as a domain name.
    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[VERSION5, CMD_CONNECT, 0x00, ATYP_DOMAIN, host.len() as u8]);
    request.extend_from_slice(host);
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    let success = reply == [VERSION5, REP_SUCCESS];

    // Drain the rest of the reply regardless of outcome: two reserved
    // bytes, a length byte, then the bound address and port.
    let mut reserved = [0u8; 2];
    stream.read_exact(&mut reserved).await?;
    let mut len = [0u8; 1];
    stream.read_exact(&mut len).await?;
    let mut bound = vec![0u8; len[0] as usize + 2];
    stream.read_exact(&mut bound).await?;

    if success {
        Ok(())
    } else {
        Err(FeedError::HandshakeFailed {
            stage: "connect",
            reply,
        })
    }
}
