//! Crate-wide error type.
//!
//! Protocol and I/O failures are never allowed to escape the reactor loop;
//! they are converted here into typed values that either close the
//! connection silently or are routed to a handler's `on_exception`/
//! `on_unknown_exception` callback.

use std::io;

/// Errors surfaced while parsing the wire protocol, performing I/O, or
/// running a WebSocket handshake.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed HTTP request line, header block, or WebSocket frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A WebSocket upgrade request was missing or mismatched a required
    /// header (`Upgrade`, `Connection`, `Sec-WebSocket-Key`/`-Version`).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A frame payload, or the read buffer required to hold it, exceeded
    /// the configured cap.
    #[error("payload of {len} bytes exceeds the {cap}-byte cap")]
    PayloadTooLarge { len: u64, cap: usize },

    /// The underlying socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The connection (or its write path) is already closed.
    #[error("connection closed")]
    Closed,
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::HandshakeRejected(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
