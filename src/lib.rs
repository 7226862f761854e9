//! Non-blocking HTTP/1.1 and WebSocket server core with per-session fiber
//! dispatch.
//!
//! `read_state` holds the byte-level parser, `write` the backpressure-aware
//! write path, `dispatch` the reactor-vs-fiber policy, `ws` the WebSocket
//! connection facade, and `server` the accept loop tying them together. See
//! `app` for the configuration builder and handler map.

pub mod app;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod http;
pub mod read_state;
pub mod server;
pub mod test_support;
pub mod write;
pub mod ws;

pub use app::{DispatcherKind, ServerBuilder, SessionFactory};
pub use error::{Error, Result};
pub use server::Server;
