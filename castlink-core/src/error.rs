// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error Types
//!
//! Per-layer error enums: `TransportError` for socket/channel failures,
//! `SessionError` for the session layer wrapping transport failures.

use thiserror::Error;

/// Errors raised by the socket and channel layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket construction or TCP/TLS/handshake failure.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation requires a connected socket.
    #[error("not connected")]
    NotConnected,

    /// Operation requires a joined channel.
    #[error("no channel joined")]
    NotJoined,

    /// No correlated reply arrived before the deadline.
    #[error("timed out waiting for reply")]
    Timeout,

    /// The server rejected a channel join.
    ///
    /// `critical` marks auth failures that require re-authentication;
    /// `retryable` is false for the fixed non-retryable code list.
    #[error("join refused: {reason}")]
    JoinRefused {
        reason: String,
        critical: bool,
        retryable: bool,
    },

    /// The server rejected a push.
    #[error("push refused: {0}")]
    PushRefused(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The reconnect attempt cap was reached.
    #[error("max reconnect attempts exceeded")]
    MaxRetriesExceeded,
}

/// Errors raised by the session layer.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No auth token could be resolved; connecting unauthenticated is refused.
    #[error("no auth token available")]
    NoToken,

    /// The token sync collaborator failed.
    #[error("token sync failed: {0}")]
    TokenSync(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
