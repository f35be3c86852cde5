//! Socket settings, events and errors

use std::time::Duration;
use thiserror::Error;

/// Socket configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    /// Pause before each reconnection attempt
    pub reconnect_delay: Duration,
    /// Interval between keepalive pings
    pub keepalive: Duration,
    /// A ping unanswered for this long drops the connection
    pub pong_timeout: Duration,
    /// Capacity of the event channel
    pub event_capacity: usize,
    /// Capacity of the outgoing frame channel
    pub outgoing_capacity: usize,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
            keepalive: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            event_capacity: 1024,
            outgoing_capacity: 64,
        }
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Events reported by a running socket
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Handshake completed; sent again after every reconnect
    Connected,
    Text(String),
    Binary(Vec<u8>),
    /// Connection failed; next attempt after the retry delay
    Reconnecting { attempt: u32 },
    /// Peer closed the socket; no further events follow
    Disconnected,
}

/// Socket errors
#[derive(Debug, Clone, Error)]
pub enum SocketError {
    #[error("connect to {url} failed: {message}")]
    Connect { url: String, message: String },
    #[error("connection lost: {0}")]
    Lost(String),
    #[error("no pong within {0:?}")]
    PongTimeout(Duration),
    #[error("socket channel closed")]
    ChannelClosed,
}
