//! The session dispatch policy: decides whether handler callbacks run
//! inline on the connection's own task (`OnReadThread`) or on a dedicated,
//! strictly-sequential per-session fiber task (`FiberSession`).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// A boxed, `'static` future — the shape of work submitted to a fiber.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Flags selecting which traffic a [`FiberSession`] handles off the
/// reactor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiberFlags {
    pub use_for_http: bool,
    pub use_for_websocket: bool,
}

/// The one-at-a-time task queue backing a `FiberSession`. A single consumer
/// task drains `rx` in order; `active` lets [`FiberHandle::dispose`] stop
/// further user code from running without having to drain the channel
/// itself (disposal never runs a Runnable body after it fires).
#[derive(Clone)]
pub struct FiberHandle {
    sender: mpsc::UnboundedSender<BoxFuture>,
    active: Arc<AtomicBool>,
}

impl FiberHandle {
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture>();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = Arc::clone(&active);

        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                if task_active.load(Ordering::Acquire) {
                    task.await;
                }
            }
        });

        Self { sender, active }
    }

    /// Submits a task for sequential execution. Silently dropped if the
    /// session was already disposed (the channel may still be open while
    /// the drain loop finishes, but `active` guards against running it).
    pub fn submit(&self, task: BoxFuture) {
        let _ = self.sender.send(task);
    }

    /// Marks the fiber inactive: any task still in the queue is popped and
    /// discarded without awaiting it. Idempotent.
    pub fn dispose(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Policy object selecting where handler callbacks run for one session.
/// Cloning a
/// `FiberSession` shares the same underlying fiber — every clone dispatches
/// onto the same sequential queue.
#[derive(Clone)]
pub enum SessionDispatcher {
    /// Handlers run synchronously on the connection's own task. No
    /// per-session resources are allocated.
    OnReadThread,
    /// Handlers run on a dedicated sequential fiber task.
    FiberSession { fiber: FiberHandle, flags: FiberFlags },
}

impl SessionDispatcher {
    pub fn on_read_thread() -> Self {
        SessionDispatcher::OnReadThread
    }

    pub fn fiber_session(flags: FiberFlags) -> Self {
        SessionDispatcher::FiberSession { fiber: FiberHandle::spawn(), flags }
    }

    pub fn uses_fiber_for_http(&self) -> bool {
        matches!(self, SessionDispatcher::FiberSession { flags, .. } if flags.use_for_http)
    }

    pub fn uses_fiber_for_websocket(&self) -> bool {
        matches!(self, SessionDispatcher::FiberSession { flags, .. } if flags.use_for_websocket)
    }

    /// Runs `task` either inline (returned for the caller to await) or
    /// handed off to the fiber, depending on `use_fiber` and this session's
    /// policy. `dispatch_http`/`dispatch_websocket` are the named
    /// conveniences; this is the mechanism both share.
    pub fn dispatch(&self, use_fiber: bool, task: BoxFuture) -> DispatchOutcome {
        match self {
            SessionDispatcher::OnReadThread => DispatchOutcome::Inline(task),
            SessionDispatcher::FiberSession { fiber, .. } if use_fiber => {
                fiber.submit(task);
                DispatchOutcome::Submitted
            }
            SessionDispatcher::FiberSession { .. } => DispatchOutcome::Inline(task),
        }
    }

    pub fn dispatch_websocket(&self, task: BoxFuture) -> DispatchOutcome {
        self.dispatch(self.uses_fiber_for_websocket(), task)
    }

    pub fn dispatch_http(&self, task: BoxFuture) -> DispatchOutcome {
        self.dispatch(self.uses_fiber_for_http(), task)
    }

    /// Disposes session-scoped resources. Called when a non-WebSocket
    /// request completes (if `use_for_http`) or when `on_close` fires for
    /// a WebSocket session.
    pub fn dispose(&self) {
        if let SessionDispatcher::FiberSession { fiber, .. } = self {
            fiber.dispose();
        }
    }
}

/// What to do with a dispatched WebSocket callback: either it must be
/// awaited by the caller (ran inline, reactor-equivalent path) or it has
/// already been handed off to the fiber.
pub enum DispatchOutcome {
    Inline(BoxFuture),
    Submitted,
}
