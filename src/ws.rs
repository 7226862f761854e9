//! The WebSocket connection facade and handler contract.

pub mod connection;
pub mod disposable;
pub mod handler;

pub use connection::{DisposableHandle, WebSocketConnection};
pub use disposable::{AbortOnDispose, Disposable};
pub use handler::WebSocketHandler;
