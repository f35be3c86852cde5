//! WebSocket transport
//!
//! A spawned task owns the socket, reconnects after failures, answers pings
//! and sends keepalives. Callers talk to it over two bounded channels.

mod client;
mod types;

pub use client::{open, SocketHandle};
pub use types::{SocketConfig, SocketError, SocketEvent};
