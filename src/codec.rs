//! Byte-level codecs: pure functions that translate between bytes and
//! structured events. Nothing in this module performs I/O.

pub mod frame;
pub mod handshake;
pub mod http;
