//! A `TestServer` harness: runs a `Server` on an ephemeral port for the
//! duration of a test and hands back a way to connect a raw `TcpStream`,
//! so integration tests can drive the wire protocol byte-for-byte.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::server::Server;

/// Runs a [`Server`] in the background for as long as the harness is alive.
/// Dropping it aborts the accept loop.
pub struct TestServer {
    addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn<S>(server: Server<S>) -> Self
    where
        S: Send + Sync + 'static,
    {
        let server = Arc::new(server);
        let (listener, addr) = server.bind().await.expect("test server failed to bind");
        let accept_loop = tokio::spawn(async move {
            let _ = server.serve_on(listener).await;
        });
        Self { addr, accept_loop }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Opens a fresh client connection to the running server.
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.expect("failed to connect to test server")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}
