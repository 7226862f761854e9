//! The per-session WebSocket facade: outbound sends, scheduling, and
//! disposables, all suppressed once the session is closed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use bytes::Bytes;

use crate::codec::frame::{self, OpCode};
use crate::dispatch::{DispatchOutcome, SessionDispatcher};
use crate::write::{SendResult, Writer};

use super::disposable::{AbortOnDispose, Disposable};

struct Inner {
    writer: Arc<Writer>,
    dispatcher: SessionDispatcher,
    closed: AtomicBool,
    disposables: StdMutex<Vec<(u64, Arc<dyn Disposable>)>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to one WebSocket session's facade. Every clone
/// refers to the same underlying connection.
#[derive(Clone)]
pub struct WebSocketConnection(Arc<Inner>);

/// A handle to one registered disposable. Disposing it cancels the
/// underlying resource and removes it from the facade's list; safe to call
/// more than once.
#[derive(Clone)]
pub struct DisposableHandle {
    id: u64,
    facade: Weak<Inner>,
}

impl DisposableHandle {
    pub fn dispose(&self) {
        if let Some(inner) = self.facade.upgrade() {
            Self::dispose_one(&inner, self.id);
        }
    }

    fn dispose_one(inner: &Inner, id: u64) {
        let entry = {
            let mut list = inner.disposables.lock().unwrap();
            list.iter().position(|(existing, _)| *existing == id).map(|idx| list.remove(idx))
        };
        if let Some((_, disposable)) = entry {
            disposable.dispose();
        }
    }
}

impl WebSocketConnection {
    pub fn new(writer: Arc<Writer>, dispatcher: SessionDispatcher) -> Self {
        Self(Arc::new(Inner {
            writer,
            dispatcher,
            closed: AtomicBool::new(false),
            disposables: StdMutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    pub async fn send_text(&self, text: &str) -> SendResult {
        self.send_frame(OpCode::Text, text.as_bytes()).await
    }

    pub async fn send_binary(&self, data: &[u8]) -> SendResult {
        self.send_frame(OpCode::Binary, data).await
    }

    pub async fn send_ping(&self, payload: &[u8]) -> SendResult {
        self.send_frame(OpCode::Ping, payload).await
    }

    pub async fn send_pong(&self, payload: &[u8]) -> SendResult {
        self.send_frame(OpCode::Pong, payload).await
    }

    async fn send_frame(&self, opcode: OpCode, payload: &[u8]) -> SendResult {
        if self.is_closed() {
            return SendResult::Closed;
        }
        let mut out = Vec::with_capacity(payload.len() + 14);
        // Servers never mask outbound frames (RFC 6455 §5.1: masking is a
        // client-to-server obligation only).
        frame::encode_frame(&mut out, opcode, payload, None);
        self.0.writer.send(&out).await
    }

    /// Closes the session: shuts the socket down synchronously and drains
    /// every registered disposable exactly once. Idempotent.
    pub async fn close(&self) {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.0.writer.shutdown().await;
        self.0.dispatcher.dispose();
        self.drain_disposables();
    }

    /// Called by the connection driver when the peer initiates close (a
    /// CLOSE frame or EOF), rather than the user calling [`close`]. Same
    /// drain-exactly-once guarantee.
    pub(crate) async fn close_from_peer(&self) {
        self.close().await;
    }

    fn drain_disposables(&self) {
        let snapshot: Vec<_> = std::mem::take(&mut *self.0.disposables.lock().unwrap());
        for (_, disposable) in snapshot {
            disposable.dispose();
        }
    }

    fn next_id(&self) -> u64 {
        self.0.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `disposable` against this session. If the session is
    /// already closed, it is disposed immediately instead of being held.
    pub fn add(&self, disposable: Arc<dyn Disposable>) -> DisposableHandle {
        let id = self.next_id();
        let handle = DisposableHandle { id, facade: Arc::downgrade(&self.0) };
        if self.is_closed() {
            disposable.dispose();
        } else {
            self.0.disposables.lock().unwrap().push((id, disposable));
        }
        handle
    }

    pub fn remove(&self, handle: &DisposableHandle) {
        handle.dispose();
    }

    pub fn size(&self) -> usize {
        self.0.disposables.lock().unwrap().len()
    }

    /// Runs `task` now, on whichever execution target this session's
    /// dispatcher selects. A no-op once the session is closed.
    pub fn execute<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        match self.0.dispatcher.dispatch_websocket(Box::pin(task)) {
            DispatchOutcome::Inline(fut) => {
                tokio::spawn(fut);
            }
            DispatchOutcome::Submitted => {}
        }
    }

    /// Runs `task` once after `delay`, guarded so it never executes once
    /// the session has closed.
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F) -> DisposableHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let conn = self.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            conn.run_if_active(task()).await;
        });
        self.add(Arc::new(AbortOnDispose::new(join.abort_handle())))
    }

    /// Runs `task` every `period`, starting after `initial_delay`. Ticks
    /// accumulate (fixed-rate semantics): a slow invocation does not push
    /// later ticks back.
    pub fn schedule_at_fixed_rate<F, Fut>(&self, initial_delay: Duration, period: Duration, task: F) -> DisposableHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let conn = self.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                if conn.is_closed() {
                    return;
                }
                conn.run_if_active(task()).await;
            }
        });
        self.add(Arc::new(AbortOnDispose::new(join.abort_handle())))
    }

    /// Runs `task`, waits `delay` after it completes, and repeats —
    /// starting after `initial_delay`.
    pub fn schedule_with_fixed_delay<F, Fut>(&self, initial_delay: Duration, delay: Duration, task: F) -> DisposableHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let conn = self.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                if conn.is_closed() {
                    return;
                }
                conn.run_if_active(task()).await;
                tokio::time::sleep(delay).await;
            }
        });
        self.add(Arc::new(AbortOnDispose::new(join.abort_handle())))
    }

    async fn run_if_active<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        match self.0.dispatcher.dispatch_websocket(Box::pin(fut)) {
            DispatchOutcome::Inline(fut) => fut.await,
            DispatchOutcome::Submitted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::SessionDispatcher;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_pair() -> (Arc<Writer>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_, write_half) = server.into_split();
        (Writer::new(write_half), client)
    }

    #[tokio::test]
    async fn close_drains_disposables_exactly_once() {
        let (writer, _client) = test_pair().await;
        let conn = WebSocketConnection::new(writer, SessionDispatcher::on_read_thread());

        let disposed = Arc::new(AtomicUsize::new(0));
        struct CountingDisposable(Arc<AtomicUsize>);
        impl Disposable for CountingDisposable {
            fn dispose(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        conn.add(Arc::new(CountingDisposable(Arc::clone(&disposed))));
        conn.close().await;
        conn.close().await;

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(conn.size(), 0);
    }

    #[tokio::test]
    async fn add_after_close_disposes_immediately() {
        let (writer, _client) = test_pair().await;
        let conn = WebSocketConnection::new(writer, SessionDispatcher::on_read_thread());
        conn.close().await;

        let disposed = Arc::new(AtomicBool::new(false));
        struct FlagDisposable(Arc<AtomicBool>);
        impl Disposable for FlagDisposable {
            fn dispose(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        conn.add(Arc::new(FlagDisposable(Arc::clone(&disposed))));
        assert!(disposed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn scheduled_task_does_not_run_after_close() {
        let (writer, _client) = test_pair().await;
        let conn = WebSocketConnection::new(writer, SessionDispatcher::on_read_thread());

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        conn.schedule(Duration::from_millis(30), move || {
            let ran = Arc::clone(&ran2);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }
        });

        conn.close().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
