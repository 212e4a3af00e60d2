// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Transport
//!
//! Owns one socket and at most one joined room channel. Adds the channel
//! semantics on top of the raw socket: join handshake with correlated-reply
//! timeout, push with ack/error/timeout, heartbeat pong replies, presence
//! aggregation, and the retryable-vs-critical error classification that
//! controls automatic reconnection.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};
use crate::events::{Event, EventDispatcher, HandlerId};
use crate::message::{
    room_topic, Frame, EVENT_CLOSE, EVENT_ERROR, EVENT_JOIN, EVENT_LEAVE, EVENT_MESSAGE,
    EVENT_PING, EVENT_PONG, EVENT_PRESENCE_DIFF, EVENT_PRESENCE_STATE, EVENT_REPLY,
};
use crate::presence::PresenceMap;
use crate::transport::socket::{reconnect_delay_ms, Socket, SocketConfig, SocketState};

/// Error codes that will not resolve by retrying. A join refused with one of
/// these permanently stops automatic reconnection.
pub const NON_RETRYABLE_ERROR_CODES: [&str; 7] = [
    "TOKEN_INVALID",
    "TOKEN_EXPIRED",
    "PERMISSION_DENIED",
    "ROOM_NOT_FOUND",
    "ROOM_CLOSED",
    "INVALID_ROOM",
    "Missing authorization token",
];

/// Auth failures that require the hosting app to re-authenticate.
const CRITICAL_ERROR_CODES: [&str; 3] = [
    "TOKEN_INVALID",
    "TOKEN_EXPIRED",
    "Missing authorization token",
];

fn error_code(response: &Value) -> Option<&str> {
    response
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| response.get("reason").and_then(Value::as_str))
}

/// Returns false only for the fixed non-retryable code list; unknown codes
/// and unreadable responses are treated as transient.
pub fn is_retryable_error(response: &Value) -> bool {
    error_code(response).map_or(true, |code| !NON_RETRYABLE_ERROR_CODES.contains(&code))
}

/// Returns true for auth failures (bad/expired/missing token).
pub fn is_critical_error(response: &Value) -> bool {
    error_code(response).is_some_and(|code| CRITICAL_ERROR_CODES.contains(&code))
}

fn refusal_reason(response: &Value) -> String {
    error_code(response)
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

/// Events emitted by the channel transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Socket connected.
    Open,
    /// Socket or channel torn down.
    Close,
    /// Room channel joined; carries the server's initial payload.
    Joined { response: Value },
    /// Join refusal, channel failure, or timeout.
    Error {
        reason: String,
        critical: bool,
        retryable: bool,
    },
    /// Relayed envelope from another participant.
    Message { payload: Value },
    /// Server heartbeat probe, re-emitted for observability.
    Ping { payload: Value },
    /// The server acknowledged our heartbeat reply.
    Pong,
    /// Full presence snapshot (already applied to the roster).
    PresenceState { state: Value },
    /// Incremental presence diff (already applied to the roster).
    PresenceDiff { diff: Value },
}

/// Event kinds for handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Open,
    Close,
    Joined,
    Error,
    Message,
    Ping,
    Pong,
    PresenceState,
    PresenceDiff,
}

impl Event for TransportEvent {
    type Kind = TransportEventKind;

    fn kind(&self) -> TransportEventKind {
        match self {
            TransportEvent::Open => TransportEventKind::Open,
            TransportEvent::Close => TransportEventKind::Close,
            TransportEvent::Joined { .. } => TransportEventKind::Joined,
            TransportEvent::Error { .. } => TransportEventKind::Error,
            TransportEvent::Message { .. } => TransportEventKind::Message,
            TransportEvent::Ping { .. } => TransportEventKind::Ping,
            TransportEvent::Pong => TransportEventKind::Pong,
            TransportEvent::PresenceState { .. } => TransportEventKind::PresenceState,
            TransportEvent::PresenceDiff { .. } => TransportEventKind::PresenceDiff,
        }
    }
}

#[derive(Debug, Clone)]
struct JoinedRoom {
    room_id: String,
    topic: String,
    join_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckKind {
    Pong,
}

#[derive(Debug)]
struct PendingAck {
    kind: AckKind,
    deadline: Instant,
}

enum Reply {
    Ok(Value),
    Error(Value),
}

fn split_reply(payload: &Value) -> Reply {
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("error");
    let response = payload.get("response").cloned().unwrap_or(Value::Null);
    if status == "ok" {
        Reply::Ok(response)
    } else {
        Reply::Error(response)
    }
}

fn next_ref() -> String {
    Uuid::new_v4().to_string()
}

/// Channel transport over one socket with at most one joined room.
///
/// # Example
///
/// ```ignore
/// use castlink_core::transport::{ChannelTransport, MockSocket, SocketConfig};
///
/// let mut transport = ChannelTransport::new(MockSocket::acking(), SocketConfig::default());
/// transport.connect()?;
/// let response = transport.join_room("living-room")?;
/// transport.push("message", payload)?;
/// ```
pub struct ChannelTransport<S: Socket> {
    socket: S,
    config: SocketConfig,
    joined: Option<JoinedRoom>,
    should_stop_reconnecting: bool,
    connected_once: bool,
    reconnect_attempt: u32,
    pending_acks: HashMap<String, PendingAck>,
    presence: PresenceMap,
    events: EventDispatcher<TransportEvent>,
    queue: VecDeque<TransportEvent>,
}

impl<S: Socket> ChannelTransport<S> {
    /// Creates a transport over an unconnected socket.
    pub fn new(socket: S, config: SocketConfig) -> Self {
        ChannelTransport {
            socket,
            config,
            joined: None,
            should_stop_reconnecting: false,
            connected_once: false,
            reconnect_attempt: 0,
            pending_acks: HashMap::new(),
            presence: PresenceMap::new(),
            events: EventDispatcher::new(),
            queue: VecDeque::new(),
        }
    }

    /// Connects the socket.
    ///
    /// No-op while connecting/connected, and while a prior critical error
    /// holds the stop-reconnect flag; only a full [`disconnect`] releases
    /// that flag.
    ///
    /// [`disconnect`]: ChannelTransport::disconnect
    pub fn connect(&mut self) -> TransportResult<()> {
        if self.should_stop_reconnecting {
            debug!("connect suppressed: reconnect stopped by critical error");
            return Ok(());
        }
        if self.socket.state() != SocketState::Disconnected {
            return Ok(());
        }
        self.socket.connect(&self.config)?;
        self.connected_once = true;
        self.reconnect_attempt = 0;
        self.notify(TransportEvent::Open);
        Ok(())
    }

    /// Leaves the joined channel, tears down the socket, clears presence and
    /// pending acks, and resets the stop-reconnect flag.
    pub fn disconnect(&mut self) {
        self.teardown(true);
    }

    /// Teardown that preserves the stop-reconnect flag, so a later
    /// caller-initiated `connect` cannot silently resume retrying.
    fn force_disconnect(&mut self) {
        self.teardown(false);
    }

    fn teardown(&mut self, reset_reconnect_flag: bool) {
        self.leave_current();
        let _ = self.socket.disconnect();
        self.pending_acks.clear();
        self.presence.clear();
        self.reconnect_attempt = 0;
        if reset_reconnect_flag {
            self.should_stop_reconnecting = false;
        }
        self.notify(TransportEvent::Close);
    }

    fn leave_current(&mut self) {
        if let Some(joined) = self.joined.take() {
            let frame = Frame::new(&joined.topic, EVENT_LEAVE, json!({})).with_ref(next_ref());
            if let Err(e) = self.socket.send(&frame) {
                debug!(room = %joined.room_id, error = %e, "leave send failed");
            }
            self.presence.clear();
        }
    }

    /// Joins a room channel, leaving any currently joined channel first.
    ///
    /// Blocks until the server's correlated reply or the join timeout.
    /// Returns the server's initial payload on success. A refusal is
    /// classified: non-retryable codes set the stop-reconnect flag and force
    /// a disconnect that preserves it.
    pub fn join_room(&mut self, room_id: &str) -> TransportResult<Value> {
        if self.socket.state() != SocketState::Connected {
            return Err(TransportError::NotConnected);
        }
        if self.joined.is_some() {
            // only one joined channel at a time
            self.leave_current();
        }

        let topic = room_topic(room_id);
        let join_ref = next_ref();
        let frame = Frame {
            join_ref: Some(join_ref.clone()),
            reference: Some(join_ref.clone()),
            topic: topic.clone(),
            event: EVENT_JOIN.to_string(),
            payload: json!({}),
        };
        self.socket.send(&frame)?;

        let timeout = Duration::from_millis(self.config.join_timeout_ms);
        match self.wait_for_reply(&join_ref, timeout) {
            Ok(Reply::Ok(response)) => {
                debug!(room = %room_id, "room joined");
                self.joined = Some(JoinedRoom {
                    room_id: room_id.to_string(),
                    topic,
                    join_ref,
                });
                self.reconnect_attempt = 0;
                self.notify(TransportEvent::Joined {
                    response: response.clone(),
                });
                Ok(response)
            }
            Ok(Reply::Error(response)) => {
                let reason = refusal_reason(&response);
                let critical = is_critical_error(&response);
                let retryable = is_retryable_error(&response);
                warn!(room = %room_id, reason = %reason, critical, retryable, "room join refused");
                if !retryable {
                    self.should_stop_reconnecting = true;
                    self.force_disconnect();
                }
                self.notify(TransportEvent::Error {
                    reason: reason.clone(),
                    critical,
                    retryable,
                });
                Err(TransportError::JoinRefused {
                    reason,
                    critical,
                    retryable,
                })
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "room join failed");
                self.notify(TransportEvent::Error {
                    reason: e.to_string(),
                    critical: false,
                    retryable: true,
                });
                Err(e)
            }
        }
    }

    /// Pushes an event on the joined channel and blocks for its ack.
    pub fn push(&mut self, event: &str, payload: Value) -> TransportResult<Value> {
        let timeout = Duration::from_millis(self.config.push_timeout_ms);
        self.push_with_timeout(event, payload, timeout)
    }

    /// [`push`](ChannelTransport::push) with a per-call ack timeout.
    pub fn push_with_timeout(
        &mut self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> TransportResult<Value> {
        let Some(joined) = &self.joined else {
            return Err(TransportError::NotJoined);
        };
        let reference = next_ref();
        let frame = Frame {
            join_ref: Some(joined.join_ref.clone()),
            reference: Some(reference.clone()),
            topic: joined.topic.clone(),
            event: event.to_string(),
            payload,
        };
        self.socket.send(&frame)?;
        match self.wait_for_reply(&reference, timeout)? {
            Reply::Ok(response) => Ok(response),
            Reply::Error(response) => Err(TransportError::PushRefused(refusal_reason(&response))),
        }
    }

    /// Drains frames until the correlated reply arrives or the deadline
    /// passes. Unrelated frames are handled in delivery order so nothing is
    /// lost while waiting.
    fn wait_for_reply(&mut self, reference: &str, timeout: Duration) -> TransportResult<Reply> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.socket.receive() {
                Ok(Some(frame)) => {
                    if frame.event == EVENT_REPLY && frame.reference.as_deref() == Some(reference) {
                        return Ok(split_reply(&frame.payload));
                    }
                    self.handle_frame(frame);
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pumps the socket and returns the next app-visible event, if any.
    ///
    /// Also expires overdue pending acks and, when the socket dropped,
    /// drives reconnection (with rejoin) unless a critical error stopped it.
    pub fn poll_event(&mut self) -> TransportResult<Option<TransportEvent>> {
        if let Some(event) = self.queue.pop_front() {
            return Ok(Some(event));
        }
        self.expire_pending_acks();

        if self.socket.state() != SocketState::Connected {
            if !self.try_reconnect()? {
                return Ok(self.queue.pop_front());
            }
        }

        match self.socket.receive() {
            Ok(Some(frame)) => {
                self.handle_frame(frame);
                Ok(self.queue.pop_front())
            }
            Ok(None) => Ok(None),
            Err(TransportError::ConnectionClosed) | Err(TransportError::NotConnected) => {
                debug!("socket dropped; reconnect on next poll");
                self.queue_event(TransportEvent::Close);
                Ok(self.queue.pop_front())
            }
            Err(e) => Err(e),
        }
    }

    /// Attempts one reconnect + rejoin cycle. Returns false when reconnecting
    /// is not warranted (never connected, or stopped by a critical error).
    fn try_reconnect(&mut self) -> TransportResult<bool> {
        if self.should_stop_reconnecting || !self.connected_once {
            return Ok(false);
        }
        if self.reconnect_attempt >= self.config.max_reconnect_attempts {
            return Err(TransportError::MaxRetriesExceeded);
        }
        // Backoff delay paces the caller's polling, not a sleep here.
        let delay_ms = reconnect_delay_ms(self.reconnect_attempt);
        self.reconnect_attempt += 1;
        debug!(attempt = self.reconnect_attempt, delay_ms, "reconnecting");

        let _ = self.socket.disconnect();
        self.socket.connect(&self.config)?;
        self.notify(TransportEvent::Open);

        if let Some(room_id) = self.joined.as_ref().map(|j| j.room_id.clone()) {
            self.joined = None;
            self.join_room(&room_id)?;
        }
        Ok(true)
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame.event.as_str() {
            EVENT_REPLY => self.handle_reply(frame),
            EVENT_MESSAGE => self.queue_event(TransportEvent::Message {
                payload: frame.payload,
            }),
            EVENT_PING => self.handle_ping(frame.payload),
            EVENT_PRESENCE_STATE => {
                self.presence.sync_state(&frame.payload);
                self.queue_event(TransportEvent::PresenceState {
                    state: frame.payload,
                });
            }
            EVENT_PRESENCE_DIFF => {
                self.presence.sync_diff(&frame.payload);
                self.queue_event(TransportEvent::PresenceDiff {
                    diff: frame.payload,
                });
            }
            EVENT_ERROR => {
                warn!(topic = %frame.topic, "channel error");
                self.queue_event(TransportEvent::Error {
                    reason: "channel error".to_string(),
                    critical: false,
                    retryable: true,
                });
            }
            EVENT_CLOSE => {
                debug!(topic = %frame.topic, "channel closed by server");
                self.joined = None;
                self.presence.clear();
                self.queue_event(TransportEvent::Close);
            }
            other => debug!(event = %other, "unhandled channel event"),
        }
    }

    fn handle_reply(&mut self, frame: Frame) {
        let Some(reference) = frame.reference else {
            return;
        };
        let Some(ack) = self.pending_acks.remove(&reference) else {
            debug!(reference = %reference, "reply with no pending request");
            return;
        };
        match ack.kind {
            AckKind::Pong => match split_reply(&frame.payload) {
                Reply::Ok(_) => self.queue_event(TransportEvent::Pong),
                Reply::Error(response) => {
                    warn!(reason = %refusal_reason(&response), "pong rejected")
                }
            },
        }
    }

    /// Replies to a server heartbeat with a pong push carrying the probe's
    /// timestamp. The ack is tracked out-of-band with its own deadline so a
    /// slow ack never blocks other traffic. Pings are never deduplicated.
    fn handle_ping(&mut self, payload: Value) {
        self.queue_event(TransportEvent::Ping {
            payload: payload.clone(),
        });
        let Some(joined) = &self.joined else {
            debug!("ping before join; no pong sent");
            return;
        };
        let ts = payload.get("ts").cloned().unwrap_or(Value::Null);
        let room_id = payload
            .get("room_id")
            .and_then(Value::as_str)
            .unwrap_or(&joined.room_id)
            .to_string();
        let reference = next_ref();
        let frame = Frame {
            join_ref: Some(joined.join_ref.clone()),
            reference: Some(reference.clone()),
            topic: joined.topic.clone(),
            event: EVENT_PONG.to_string(),
            payload: json!({ "type": "pong", "room_id": room_id, "payload": { "ts": ts } }),
        };
        match self.socket.send(&frame) {
            Ok(()) => {
                self.pending_acks.insert(
                    reference,
                    PendingAck {
                        kind: AckKind::Pong,
                        deadline: Instant::now()
                            + Duration::from_millis(self.config.pong_timeout_ms),
                    },
                );
            }
            Err(e) => warn!(error = %e, "pong send failed"),
        }
    }

    fn expire_pending_acks(&mut self) {
        let now = Instant::now();
        self.pending_acks.retain(|reference, ack| {
            if now >= ack.deadline {
                debug!(reference = %reference, kind = ?ack.kind, "ack wait expired");
                false
            } else {
                true
            }
        });
    }

    fn notify(&self, event: TransportEvent) {
        self.events.emit(&event);
    }

    fn queue_event(&mut self, event: TransportEvent) {
        self.events.emit(&event);
        self.queue.push_back(event);
    }

    /// Registers an event handler.
    pub fn on<F>(&mut self, kind: TransportEventKind, handler: F) -> HandlerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    /// Removes an event handler.
    pub fn off(&mut self, id: HandlerId) -> bool {
        self.events.off(id)
    }

    /// Returns the socket state.
    pub fn state(&self) -> SocketState {
        self.socket.state()
    }

    /// Returns true if a room channel is joined.
    pub fn is_joined(&self) -> bool {
        self.joined.is_some()
    }

    /// Returns the joined room id, if any.
    pub fn joined_room_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|j| j.room_id.as_str())
    }

    /// Returns true if a critical error stopped automatic reconnection.
    pub fn reconnect_stopped(&self) -> bool {
        self.should_stop_reconnecting
    }

    /// Returns the reconnect attempt counter.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Returns the participant roster.
    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Returns a reference to the underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Returns a mutable reference to the underlying socket.
    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }
}

// INLINE_TEST_REQUIRED: Tests private pending-ack expiry and classification internals
#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockSocket;

    #[test]
    fn test_non_retryable_codes_classified() {
        for code in NON_RETRYABLE_ERROR_CODES {
            assert!(
                !is_retryable_error(&json!({ "error": code })),
                "{code} must be non-retryable"
            );
        }
        assert!(is_retryable_error(&json!({ "error": "SOMETHING_ELSE" })));
        assert!(is_retryable_error(&json!({})));
    }

    #[test]
    fn test_critical_codes_are_auth_failures() {
        assert!(is_critical_error(&json!({ "error": "TOKEN_INVALID" })));
        assert!(is_critical_error(&json!({ "error": "TOKEN_EXPIRED" })));
        assert!(is_critical_error(&json!({ "reason": "Missing authorization token" })));
        assert!(!is_critical_error(&json!({ "error": "ROOM_NOT_FOUND" })));
        assert!(!is_critical_error(&json!({ "error": "FLAKY_NETWORK" })));
    }

    #[test]
    fn test_reason_read_from_error_then_reason() {
        assert_eq!(refusal_reason(&json!({ "error": "ROOM_CLOSED" })), "ROOM_CLOSED");
        assert_eq!(refusal_reason(&json!({ "reason": "busy" })), "busy");
    }

    #[test]
    fn test_expire_pending_acks() {
        let mut transport =
            ChannelTransport::new(MockSocket::new(), SocketConfig::default());
        transport.pending_acks.insert(
            "r1".into(),
            PendingAck {
                kind: AckKind::Pong,
                deadline: Instant::now() - Duration::from_millis(1),
            },
        );
        transport.pending_acks.insert(
            "r2".into(),
            PendingAck {
                kind: AckKind::Pong,
                deadline: Instant::now() + Duration::from_secs(60),
            },
        );

        transport.expire_pending_acks();
        assert!(!transport.pending_acks.contains_key("r1"));
        assert!(transport.pending_acks.contains_key("r2"));
    }

    #[test]
    fn test_connect_noop_when_stopped() {
        let mut transport =
            ChannelTransport::new(MockSocket::new(), SocketConfig::default());
        transport.should_stop_reconnecting = true;

        transport.connect().unwrap();
        assert_eq!(transport.state(), SocketState::Disconnected);

        // a full disconnect releases the flag
        transport.disconnect();
        transport.connect().unwrap();
        assert_eq!(transport.state(), SocketState::Connected);
    }
}
