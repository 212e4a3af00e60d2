// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Castlink Core Library
//!
//! Second-screen casting session client: joins a server-hosted relay room
//! over a multiplexed channel socket, exchanges typed control/metadata
//! messages with the other room participants, and reacts to remote playback
//! commands by driving host-app navigation.

pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod message;
pub mod presence;
pub mod session;
pub mod transport;
pub mod validate;

pub use client::{ClientEvent, ClientEventKind, ClientStatus, ProtocolClient};
pub use dedup::DedupSet;
pub use error::{SessionError, SessionResult, TransportError, TransportResult};
pub use events::{Event, EventDispatcher, HandlerId};
pub use message::{
    room_topic, AdBreak, Command, Envelope, Frame, MetadataPayload, EVENT_CLOSE, EVENT_ERROR,
    EVENT_JOIN, EVENT_LEAVE, EVENT_MESSAGE, EVENT_PING, EVENT_PONG, EVENT_PRESENCE_DIFF,
    EVENT_PRESENCE_STATE, EVENT_REPLY,
};
pub use presence::PresenceMap;
pub use session::{
    BackOverride, LastMetadata, NavigationDispatch, PlayerTarget, SessionManager, SessionRequest,
    TokenProvider,
};
pub use transport::{
    is_critical_error, is_retryable_error, reconnect_delay_ms, ChannelTransport, ConnectParams,
    MockSocket, Socket, SocketConfig, SocketState, TransportEvent, TransportEventKind,
    NON_RETRYABLE_ERROR_CODES,
};

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use transport::WebSocketTransport;
