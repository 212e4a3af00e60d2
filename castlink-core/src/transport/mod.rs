//! Transport Layer
//!
//! The socket boundary (trait + implementations) and the channel transport
//! that adds join/push/heartbeat/presence semantics on top of it.

pub mod channel;
pub mod mock;
pub mod socket;

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub mod websocket;

pub use channel::{
    is_critical_error, is_retryable_error, ChannelTransport, TransportEvent, TransportEventKind,
    NON_RETRYABLE_ERROR_CODES,
};
pub use mock::MockSocket;
pub use socket::{reconnect_delay_ms, ConnectParams, Socket, SocketConfig, SocketState};

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use websocket::WebSocketTransport;
