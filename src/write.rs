//! The non-blocking write path: opportunistic inline writes with automatic
//! promotion to a buffered, write-readiness-driven drain on backpressure.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex as AsyncMutex, Notify};

/// Outcome of a [`Writer::send`] call.
#[derive(Debug)]
pub enum SendResult {
    /// The payload was written to the socket in full, inline.
    Success,
    /// The payload (or part of it) was queued in the per-connection
    /// [`BufferedWrite`]; `accepted` is always `payload.len()` since the
    /// queue owns a copy, `queued` is the queue's new total length.
    Buffered { accepted: usize, queued: usize },
    /// The connection is already closed; nothing was written.
    Closed,
    /// The socket failed while writing; the channel is being closed.
    FailedOnError { cause: io::Error },
}

/// Invoked when a write fails, either inline or while draining the buffered
/// queue. Failures are surfaced here rather than silently dropped.
pub type FailureHandler = Arc<dyn Fn(io::Error) + Send + Sync>;

/// Per-connection writer. Holds at most one pending queue of bytes awaiting
/// write-readiness at any time, guarded by the same mutex used for the
/// socket itself so that application senders and the drain task never
/// interleave writes.
pub struct Writer {
    write_half: AsyncMutex<OwnedWriteHalf>,
    pending: StdMutex<Option<VecDeque<u8>>>,
    /// Serializes the whole "no `BufferedWrite` yet? write inline and maybe
    /// create one" sequence in `send`, so two concurrent callers can never
    /// both observe an empty queue, both write, and race to install (and
    /// clobber) the residual.
    inline_section: AsyncMutex<()>,
    closed: AtomicBool,
    closed_notify: Notify,
    on_failure: StdMutex<Option<FailureHandler>>,
}

impl Writer {
    pub fn new(write_half: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            write_half: AsyncMutex::new(write_half),
            pending: StdMutex::new(None),
            inline_section: AsyncMutex::new(()),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            on_failure: StdMutex::new(None),
        })
    }

    /// Registers (or replaces) the callback invoked on write failure.
    /// Installed once a WebSocket upgrade completes, wiring the writer to
    /// the connection's `on_exception`/`on_unknown_exception` delivery.
    pub fn set_failure_handler(&self, handler: FailureHandler) {
        *self.on_failure.lock().unwrap() = Some(handler);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the writer is closed, whether already closed when
    /// called or closed later by `shutdown`/a write failure. Lets the
    /// connection driver stop blocking on reads as soon as a handler closes
    /// the channel, instead of waiting for the peer to send or hang up.
    pub async fn wait_until_closed(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let notified = self.closed_notify.notified();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Sends `payload`: an opportunistic inline write that promotes to a
    /// buffered, write-readiness-driven drain on backpressure.
    pub async fn send(self: &Arc<Self>, payload: &[u8]) -> SendResult {
        if self.closed.load(Ordering::Acquire) {
            return SendResult::Closed;
        }

        // Fast path: a BufferedWrite already exists, so no write_half access
        // or serialization against other senders is needed.
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(queue) = pending.as_mut() {
                queue.extend(payload.iter().copied());
                return SendResult::Buffered { accepted: payload.len(), queued: queue.len() };
            }
        }

        // Slow path: hold this for the whole "still no BufferedWrite? write
        // inline and maybe create one" decision, so only one caller at a
        // time can observe an empty queue and act on it.
        let _inline = self.inline_section.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return SendResult::Closed;
        }

        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(queue) = pending.as_mut() {
                queue.extend(payload.iter().copied());
                return SendResult::Buffered { accepted: payload.len(), queued: queue.len() };
            }
        }

        let mut written = 0usize;
        let failure = {
            let mut guard = self.write_half.lock().await;
            loop {
                if written == payload.len() {
                    break None;
                }
                match guard.try_write(&payload[written..]) {
                    Ok(0) => break None,
                    Ok(n) => written += n,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break None,
                    Err(e) => break Some(e),
                }
            }
        };

        if let Some(cause) = failure {
            self.fail(io::Error::new(cause.kind(), cause.to_string())).await;
            return SendResult::FailedOnError { cause };
        }

        if written == payload.len() {
            return SendResult::Success;
        }

        let residual: VecDeque<u8> = payload[written..].iter().copied().collect();
        let queued = residual.len();
        {
            let mut pending = self.pending.lock().unwrap();
            *pending = Some(residual);
        }
        self.spawn_drain();
        SendResult::Buffered { accepted: payload.len(), queued }
    }

    /// Spawns the drain task that awaits write-readiness and flushes the
    /// pending queue, clearing the slot once empty (back to inline-only).
    fn spawn_drain(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if this.closed.load(Ordering::Acquire) {
                    return;
                }

                let wait_result = {
                    let guard = this.write_half.lock().await;
                    guard.writable().await
                };
                if let Err(e) = wait_result {
                    this.fail(e).await;
                    return;
                }

                let mut guard = this.write_half.lock().await;
                let chunk: Vec<u8> = {
                    let pending = this.pending.lock().unwrap();
                    match pending.as_ref() {
                        Some(queue) => queue.iter().copied().collect(),
                        None => return,
                    }
                };

                match guard.try_write(&chunk) {
                    Ok(0) => continue,
                    Ok(n) => {
                        drop(guard);
                        let mut pending = this.pending.lock().unwrap();
                        if let Some(queue) = pending.as_mut() {
                            queue.drain(..n);
                            if queue.is_empty() {
                                *pending = None;
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                    Err(e) => {
                        drop(guard);
                        this.fail(e).await;
                        return;
                    }
                }
            }
        });
    }

    async fn fail(self: &Arc<Self>, cause: io::Error) {
        self.closed.store(true, Ordering::Release);
        self.closed_notify.notify_waiters();
        *self.pending.lock().unwrap() = None;
        {
            let mut guard = self.write_half.lock().await;
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut *guard).await;
        }
        let handler = self.on_failure.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(cause);
        }
    }

    /// Synchronously initiates socket shutdown (used by `close()` on the
    /// WebSocket facade). Idempotent.
    pub async fn shutdown(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed_notify.notify_waiters();
        *self.pending.lock().unwrap() = None;
        let mut guard = self.write_half.lock().await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut *guard).await;
    }

    pub fn has_buffered_write(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}
