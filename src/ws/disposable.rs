//! Session-scoped disposables: handles whose disposal cancels a scheduled
//! task or releases a resource exactly once.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::AbortHandle;

/// Anything a [`WebSocketConnection`](super::connection::WebSocketConnection)
/// can own for the lifetime of a session.
pub trait Disposable: Send + Sync {
    /// Disposes the resource. Implementations must tolerate being called
    /// more than once (callers only guarantee *at least* one call).
    fn dispose(&self);
}

/// Wraps a spawned task's [`AbortHandle`] so it can be registered as a
/// [`Disposable`]; backs `schedule`/`scheduleAtFixedRate`/
/// `scheduleWithFixedDelay`.
pub struct AbortOnDispose {
    handle: AbortHandle,
    disposed: AtomicBool,
}

impl AbortOnDispose {
    pub fn new(handle: AbortHandle) -> Self {
        Self { handle, disposed: AtomicBool::new(false) }
    }
}

impl Disposable for AbortOnDispose {
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.handle.abort();
        }
    }
}
