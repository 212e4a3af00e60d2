//! Protocol Client
//!
//! Message-level semantics over one channel transport: envelope validation,
//! per-message deduplication, typed command fan-out, relay send/receive, and
//! the connection status state machine.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config;
use crate::dedup::DedupSet;
use crate::error::{TransportError, TransportResult};
use crate::events::{Event, EventDispatcher, HandlerId};
use crate::message::{Command, MetadataPayload, EVENT_MESSAGE};
use crate::transport::channel::{ChannelTransport, TransportEvent};
use crate::transport::socket::{Socket, SocketConfig};
use crate::validate;

/// Connection status of a protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Created, never connected.
    Idle,
    /// Socket connect + room join in progress.
    Connecting,
    /// Room joined, relay traffic flowing.
    Connected,
    /// Connect or join failed.
    Error,
    /// Torn down by the caller or the server.
    Disconnected,
}

/// Events emitted by a protocol client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Status transition.
    Status { status: ClientStatus },
    /// A validated, deduplicated remote command.
    Command {
        command: Command,
        sender: Option<String>,
    },
    /// Room joined; carries the server's initial payload.
    Joined { response: Value },
    /// Transport or join failure.
    Error {
        reason: String,
        critical: bool,
        retryable: bool,
    },
    /// Presence diff pass-through (already applied to the roster).
    PresenceDiff { diff: Value },
    /// Heartbeat probe pass-through.
    Ping { payload: Value },
}

/// Event kinds for handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    Status,
    Command,
    Joined,
    Error,
    PresenceDiff,
    Ping,
}

impl Event for ClientEvent {
    type Kind = ClientEventKind;

    fn kind(&self) -> ClientEventKind {
        match self {
            ClientEvent::Status { .. } => ClientEventKind::Status,
            ClientEvent::Command { .. } => ClientEventKind::Command,
            ClientEvent::Joined { .. } => ClientEventKind::Joined,
            ClientEvent::Error { .. } => ClientEventKind::Error,
            ClientEvent::PresenceDiff { .. } => ClientEventKind::PresenceDiff,
            ClientEvent::Ping { .. } => ClientEventKind::Ping,
        }
    }
}

/// Casting protocol client bound to one room.
///
/// # Example
///
/// ```ignore
/// use castlink_core::client::{ClientEventKind, ProtocolClient};
/// use castlink_core::transport::{MockSocket, SocketConfig};
///
/// let mut client = ProtocolClient::new(MockSocket::acking(), SocketConfig::default(), "42");
/// client.on(ClientEventKind::Command, |event| { /* … */ });
/// client.connect()?;
/// client.process_incoming()?;
/// ```
pub struct ProtocolClient<S: Socket> {
    transport: ChannelTransport<S>,
    room_id: String,
    status: ClientStatus,
    processed_ids: DedupSet,
    events: EventDispatcher<ClientEvent>,
}

impl<S: Socket> ProtocolClient<S> {
    /// Creates a client for one room over an unconnected socket.
    pub fn new(socket: S, config: SocketConfig, room_id: impl Into<String>) -> Self {
        ProtocolClient {
            transport: ChannelTransport::new(socket, config),
            room_id: room_id.into(),
            status: ClientStatus::Idle,
            processed_ids: DedupSet::new(config::resolve_dedup_window(None)),
            events: EventDispatcher::new(),
        }
    }

    /// Overrides the dedup window size.
    pub fn with_dedup_window(mut self, capacity: usize) -> Self {
        self.processed_ids = DedupSet::new(capacity);
        self
    }

    /// Connects the socket and joins the room.
    ///
    /// Guarded against re-entrant calls: a no-op while already connecting or
    /// connected. Any failure transitions to `Error` and propagates.
    pub fn connect(&mut self) -> TransportResult<()> {
        if matches!(self.status, ClientStatus::Connecting | ClientStatus::Connected) {
            debug!(room = %self.room_id, status = ?self.status, "connect already in progress");
            return Ok(());
        }
        self.set_status(ClientStatus::Connecting);

        if let Err(e) = self.transport.connect() {
            self.set_status(ClientStatus::Error);
            self.emit_error(&e);
            return Err(e);
        }
        let room_id = self.room_id.clone();
        match self.transport.join_room(&room_id) {
            Ok(response) => {
                self.set_status(ClientStatus::Connected);
                self.events.emit(&ClientEvent::Joined { response });
                Ok(())
            }
            Err(e) => {
                self.set_status(ClientStatus::Error);
                self.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Tears down the transport and transitions to `Disconnected`.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.set_status(ClientStatus::Disconnected);
    }

    /// Sends a payload to the room relay.
    ///
    /// The server wraps the payload into a full envelope (sender, room_id,
    /// ts) for downstream recipients.
    pub fn send_relay(&mut self, payload: Value) -> TransportResult<Value> {
        if self.status != ClientStatus::Connected {
            return Err(TransportError::NotConnected);
        }
        self.transport.push(EVENT_MESSAGE, payload)
    }

    /// Sends playback metadata to the room. Best-effort: callers on a report
    /// interval drop the tick on failure rather than queueing.
    pub fn send_metadata(&mut self, metadata: &MetadataPayload) -> TransportResult<Value> {
        let mut payload = serde_json::to_value(metadata)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        payload["type"] = Value::String("metadata".into());
        self.send_relay(payload)
    }

    /// Pumps the transport and fans out all pending inbound events.
    pub fn process_incoming(&mut self) -> TransportResult<()> {
        loop {
            match self.transport.poll_event() {
                Ok(Some(event)) => self.handle_transport_event(event),
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.emit_error(&e);
                    if matches!(e, TransportError::MaxRetriesExceeded) {
                        self.set_status(ClientStatus::Error);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { payload } => self.handle_casting_message(payload),
            TransportEvent::Ping { payload } => {
                self.events.emit(&ClientEvent::Ping { payload });
            }
            TransportEvent::PresenceDiff { diff } => {
                self.events.emit(&ClientEvent::PresenceDiff { diff });
            }
            TransportEvent::Error {
                reason,
                critical,
                retryable,
            } => {
                if critical {
                    self.set_status(ClientStatus::Error);
                }
                self.events.emit(&ClientEvent::Error {
                    reason,
                    critical,
                    retryable,
                });
            }
            TransportEvent::Close => {
                if self.status == ClientStatus::Connected {
                    self.set_status(ClientStatus::Disconnected);
                }
            }
            // presence snapshots update the roster; joins/opens are handled
            // synchronously in connect()
            TransportEvent::PresenceState { .. }
            | TransportEvent::Pong
            | TransportEvent::Open
            | TransportEvent::Joined { .. } => {}
        }
    }

    /// Validates, deduplicates and fans out one relayed envelope.
    ///
    /// Dedup keys on `msg_id` only when present: envelopes without an id are
    /// never deduplicated, the server guarantees ids on anything requiring
    /// it (multi-sender relays, replays after reconnect).
    fn handle_casting_message(&mut self, envelope: Value) {
        if !validate::is_envelope(&envelope) {
            debug!(room = %self.room_id, "malformed envelope dropped");
            return;
        }
        if let Some(msg_id) = envelope.get("msg_id").and_then(Value::as_str) {
            if self.processed_ids.has(msg_id) {
                debug!(room = %self.room_id, msg_id = %msg_id, "duplicate message dropped");
                return;
            }
            self.processed_ids.add(msg_id);
        }

        let payload = envelope.get("payload").cloned().unwrap_or(Value::Null);
        if !validate::is_command_payload(&payload) {
            debug!(room = %self.room_id, "non-command payload dropped");
            return;
        }
        let Some(command) = Command::parse(&payload) else {
            warn!(room = %self.room_id, "invalid command payload dropped");
            return;
        };
        let sender = envelope
            .get("sender")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.events.emit(&ClientEvent::Command { command, sender });
    }

    fn emit_error(&self, error: &TransportError) {
        let (critical, retryable) = match error {
            TransportError::JoinRefused {
                critical, retryable, ..
            } => (*critical, *retryable),
            _ => (false, true),
        };
        self.events.emit(&ClientEvent::Error {
            reason: error.to_string(),
            critical,
            retryable,
        });
    }

    fn set_status(&mut self, status: ClientStatus) {
        if self.status != status {
            debug!(room = %self.room_id, from = ?self.status, to = ?status, "status change");
            self.status = status;
            self.events.emit(&ClientEvent::Status { status });
        }
    }

    /// Registers an event handler.
    pub fn on<F>(&mut self, kind: ClientEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    /// Removes an event handler.
    pub fn off(&mut self, id: HandlerId) -> bool {
        self.events.off(id)
    }

    /// Returns the current status.
    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// Returns the room this client is bound to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Returns the participant ids currently present in the room.
    pub fn participants(&self) -> Vec<String> {
        self.transport.presence().participants()
    }

    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &ChannelTransport<S> {
        &self.transport
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut ChannelTransport<S> {
        &mut self.transport
    }
}
