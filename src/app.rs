//! The configuration builder and handler map wiring external collaborators
//! into the reactor core.

pub mod config;
pub mod router;

pub use config::{DispatcherKind, ServerBuilder, SessionFactory};
pub use router::Router;
