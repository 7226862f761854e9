//! Building and serializing HTTP/1.1 responses onto the wire.

use bytes::{Bytes, BytesMut};

/// A status, reason phrase, `Content-Type`, and body — the response shape
/// named in the wire contract.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    headers: Vec<(String, String)>,
    body: Bytes,
    /// Set when a custom header already carries `Connection`, so `encode`
    /// doesn't also write its own keep-alive/close line.
    own_connection_header: bool,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &'static str, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self { status, reason, content_type, headers: Vec::new(), body: body.into(), own_connection_header: false }
    }

    pub fn text(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self::new(status, reason, "text/plain; charset=utf-8", body.into().into_bytes())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("connection") {
            self.own_connection_header = true;
        }
        self.headers.push((name, value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Serializes the status line, headers, `Content-Length`, and body into
    /// `buf`. `keep_alive` controls the `Connection` header written, unless
    /// the response already carries its own via `with_header`.
    pub fn encode(&self, buf: &mut BytesMut, keep_alive: bool) {
        buf.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).as_bytes());
        buf.extend_from_slice(format!("Content-Type: {}\r\n", self.content_type).as_bytes());
        buf.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        if !self.own_connection_header {
            let connection = if keep_alive { "keep-alive" } else { "close" };
            buf.extend_from_slice(format!("Connection: {connection}\r\n").as_bytes());
        }
        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
    }
}

/// Builds the `101 Switching Protocols` response that completes a
/// WebSocket handshake.
pub fn switching_protocols(accept_key: &str) -> HttpResponse {
    HttpResponse::new(101, "Switching Protocols", "", Bytes::new())
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", accept_key)
}
