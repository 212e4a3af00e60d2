//! Socket Boundary
//!
//! Platform-agnostic abstraction for the multiplexed channel socket. The
//! channel semantics this client depends on (join/reply correlation,
//! heartbeat, presence events) live above this trait in
//! [`super::channel::ChannelTransport`].

use crate::error::TransportResult;
use crate::message::Frame;

/// Socket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Not connected to any server.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
}

/// Auth/identity parameters sent on socket init.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectParams {
    pub token: String,
    pub platform: String,
}

/// Configuration for socket connections.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Relay WebSocket URL.
    pub url: String,
    /// Connect params appended to the socket init request.
    pub params: ConnectParams,
    /// Connection (TCP + handshake) timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Channel join timeout in milliseconds.
    pub join_timeout_ms: u64,
    /// Default push ack timeout in milliseconds.
    pub push_timeout_ms: u64,
    /// Heartbeat pong ack timeout in milliseconds, independent of other
    /// in-flight pushes.
    pub pong_timeout_ms: u64,
    /// Read-poll interval in milliseconds; a quiet socket returns within
    /// this bound so callers can pace their own deadlines.
    pub io_timeout_ms: u64,
    /// Maximum automatic reconnection attempts.
    pub max_reconnect_attempts: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            url: String::new(),
            params: ConnectParams::default(),
            connect_timeout_ms: 10_000,
            join_timeout_ms: 10_000,
            push_timeout_ms: 10_000,
            pong_timeout_ms: 5_000,
            io_timeout_ms: 250,
            max_reconnect_attempts: 5,
        }
    }
}

/// Reconnect backoff: 1s, 2s, 4s, ... capped at 30s.
pub fn reconnect_delay_ms(attempt: u32) -> u64 {
    (1_000u64 << attempt.min(6)).min(30_000)
}

/// Transport trait for the relay socket.
///
/// Abstracts the underlying connection (WebSocket in production, a mock in
/// tests). Synchronous interface: implementations may run async internals
/// but expose blocking calls here; `receive` must return `Ok(None)` rather
/// than blocking indefinitely on a quiet socket.
pub trait Socket: Send {
    /// Connects to the relay server.
    fn connect(&mut self, config: &SocketConfig) -> TransportResult<()>;

    /// Disconnects from the relay server. Safe to call when not connected.
    fn disconnect(&mut self) -> TransportResult<()>;

    /// Returns the current connection state.
    fn state(&self) -> SocketState;

    /// Sends one frame.
    fn send(&mut self, frame: &Frame) -> TransportResult<()>;

    /// Receives the next frame, or `Ok(None)` when none is available within
    /// the configured poll interval.
    fn receive(&mut self) -> TransportResult<Option<Frame>>;
}
