//! The server configuration builder: wires a bind address, buffer and
//! fairness limits, the handler map, and a dispatcher policy into a
//! `Server`.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::app::router::Router;
use crate::dispatch::FiberFlags;
use crate::http::handler::{Decorator, SharedHttpHandler};
use crate::server::Server;
use crate::ws::handler::WebSocketHandler;

/// Creates the per-connection session state `S` when a new connection is
/// accepted.
pub trait SessionFactory<S>: Send + Sync {
    fn create(&self) -> S;
}

impl<S, F> SessionFactory<S> for F
where
    F: Fn() -> S + Send + Sync,
{
    fn create(&self) -> S {
        self()
    }
}

/// Which execution context handler callbacks run on for this server.
#[derive(Debug, Clone, Copy)]
pub enum DispatcherKind {
    /// Handlers run inline on the connection's own task.
    OnReadThread,
    /// Handlers run on a dedicated per-session fiber task.
    FiberSession { use_for_http: bool, use_for_websocket: bool },
}

impl DispatcherKind {
    pub(crate) fn fiber_flags(self) -> Option<FiberFlags> {
        match self {
            DispatcherKind::OnReadThread => None,
            DispatcherKind::FiberSession { use_for_http, use_for_websocket } => {
                Some(FiberFlags { use_for_http, use_for_websocket })
            }
        }
    }
}

/// The recognized server configuration.
pub struct ServerBuilder<S> {
    pub(crate) bind_addr: Option<SocketAddr>,
    pub(crate) read_buffer_size: usize,
    pub(crate) max_read_loops: usize,
    pub(crate) websocket_charset: String,
    pub(crate) dispatcher_kind: DispatcherKind,
    pub(crate) router: Router<S>,
    pub(crate) session_factory: Arc<dyn SessionFactory<S>>,
}

impl<S> ServerBuilder<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(session_factory: impl SessionFactory<S> + 'static) -> Self {
        Self {
            bind_addr: None,
            read_buffer_size: 1024,
            max_read_loops: 50,
            websocket_charset: "utf-8".to_owned(),
            dispatcher_kind: DispatcherKind::OnReadThread,
            router: Router::new(),
            session_factory: Arc::new(session_factory),
        }
    }

    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    pub fn max_read_loops(mut self, loops: usize) -> Self {
        self.max_read_loops = loops;
        self
    }

    pub fn websocket_charset(mut self, charset: impl Into<String>) -> Self {
        self.websocket_charset = charset.into();
        self
    }

    pub fn default_handler(mut self, handler: SharedHttpHandler<S>) -> Self {
        self.router.set_default_handler(handler);
        self
    }

    pub fn decorator(mut self, decorator: Arc<dyn Decorator<S>>) -> Self {
        self.router.set_decorator(decorator);
        self
    }

    pub fn dispatcher(mut self, kind: DispatcherKind) -> Self {
        self.dispatcher_kind = kind;
        self
    }

    pub fn add_http(mut self, path: impl Into<String>, handler: SharedHttpHandler<S>) -> Self {
        self.router.add_http(path, handler);
        self
    }

    pub fn add_websocket(mut self, path: impl Into<String>, handler: impl WebSocketHandler<S> + 'static) -> Self {
        self.router.add_websocket(path, handler);
        self
    }

    pub fn build(self) -> Server<S> {
        Server::new(self)
    }
}
