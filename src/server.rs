//! Reactor glue: the accept loop that spawns one task per connection. This
//! loop is the only code that ever calls `TcpListener::accept` for a given
//! server, and the per-connection task it spawns is, in turn, the only
//! code that ever touches that connection's buffer, state, and writer.

mod conn;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::app::config::{DispatcherKind, ServerBuilder, SessionFactory};
use crate::app::router::Router;

/// A built, ready-to-run server: bind address, buffer/fairness limits, the
/// handler map, and a dispatcher policy.
pub struct Server<S> {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) read_buffer_size: usize,
    pub(crate) max_read_loops: usize,
    #[allow(dead_code)] // carried for parity with the configuration surface; decoding is UTF-8-only today
    pub(crate) websocket_charset: String,
    pub(crate) dispatcher_kind: DispatcherKind,
    pub(crate) router: Arc<Router<S>>,
    pub(crate) session_factory: Arc<dyn SessionFactory<S>>,
}

impl<S> Server<S>
where
    S: Send + Sync + 'static,
{
    pub(crate) fn new(builder: ServerBuilder<S>) -> Self {
        Self {
            bind_addr: builder.bind_addr.unwrap_or_else(|| "127.0.0.1:0".parse().unwrap()),
            read_buffer_size: builder.read_buffer_size,
            max_read_loops: builder.max_read_loops,
            websocket_charset: builder.websocket_charset,
            dispatcher_kind: builder.dispatcher_kind,
            router: Arc::new(builder.router),
            session_factory: builder.session_factory,
        }
    }

    /// Binds the listening socket without starting the accept loop, so
    /// callers (tests, in particular) can discover the actual local address
    /// before connections start arriving.
    pub async fn bind(&self) -> io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let addr = listener.local_addr()?;
        Ok((listener, addr))
    }

    /// Binds and runs the accept loop forever, spawning one task per
    /// accepted connection.
    pub async fn serve(self: Arc<Self>) -> io::Result<()> {
        let (listener, addr) = self.bind().await?;
        tracing::info!(%addr, "listening");
        self.serve_on(listener).await
    }

    /// Runs the accept loop against an already-bound listener.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = conn::drive(&server, stream).await {
                    tracing::debug!(%peer, error = %err, "connection task ended with an error");
                }
            });
        }
    }
}
