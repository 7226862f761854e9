//! The `WebSocketHandler` contract: callbacks the core invokes as frames
//! arrive, per the session's dispatcher policy.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Error;
use crate::http::request::HttpRequest;

use super::connection::WebSocketConnection;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// User callbacks for one WebSocket session. `Session` is the connection-wide
/// state a [`SessionFactory`](crate::app::config::SessionFactory) created at
/// accept time; `State` is the value `on_open` derives from it and every
/// later callback receives back.
///
/// Every method but `on_open`/`on_message`/`on_binary_message` has a no-op
/// default, so a minimal echo handler only implements what it cares about.
pub trait WebSocketHandler<Session>: Send + Sync {
    type State: Send + 'static;

    fn on_open<'a>(&'a self, conn: &'a WebSocketConnection, request: &'a HttpRequest, session: &'a Session) -> BoxFuture<'a, Self::State>;

    fn on_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut Self::State, text: String) -> BoxFuture<'a, ()>;

    fn on_binary_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut Self::State, data: Bytes) -> BoxFuture<'a, ()>;

    /// Fires in addition to the core's automatic PONG reply.
    fn on_ping<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut Self::State, _payload: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_pong<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut Self::State, _payload: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_close<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut Self::State) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_error<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut Self::State, _message: String) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// A classified failure on this session (protocol error, write failure).
    fn on_exception<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut Self::State, _cause: &'a Error) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// A failure with no session to attach it to (e.g. a write failure
    /// observed after the session state was already dropped).
    fn on_unknown_exception<'a>(&'a self, _cause: &'a Error) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}
