//! Feed layer error types.

use std::io;
use thiserror::Error;

use crate::config::PeerAddress;

/// Errors produced by the feed propagation layer.
#[derive(Debug, Error)]
pub enum FeedError {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Outbound dial timed out.
    #[error("Connection timeout to {addr}")]
    ConnectTimeout { addr: PeerAddress },

    /// The SOCKS5 proxy rejected the handshake.
    #[error("SOCKS5 {stage} rejected: {reply:02x?}")]
    HandshakeFailed { stage: &'static str, reply: [u8; 2] },

    /// A proxy kind this daemon does not speak.
    #[error("Unsupported proxy type: {kind}")]
    UnsupportedProxy { kind: String },

    /// Invalid peer address.
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    /// Malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
