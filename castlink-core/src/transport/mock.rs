//! Mock Socket
//!
//! In-memory socket for tests: scripted inbound frames, recorded outbound
//! frames, an optional responder that turns sends into inbound replies, and
//! a lifecycle journal for asserting connect/disconnect ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::error::{TransportError, TransportResult};
use crate::message::{Frame, EVENT_LEAVE};
use crate::transport::socket::{Socket, SocketConfig, SocketState};

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// Scriptable in-memory socket.
pub struct MockSocket {
    state: SocketState,
    inbound: VecDeque<Frame>,
    sent: Vec<Frame>,
    responder: Option<Responder>,
    fail_next_connect: bool,
    connect_count: usize,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockSocket {
    pub fn new() -> Self {
        MockSocket {
            state: SocketState::Disconnected,
            inbound: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            fail_next_connect: false,
            connect_count: 0,
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock that acknowledges every ref-carrying frame (except leaves) with
    /// an ok reply.
    pub fn acking() -> Self {
        let mut socket = Self::new();
        socket.set_responder(|frame| match &frame.reference {
            Some(reference) if frame.event != EVENT_LEAVE => {
                vec![Frame::reply_ok(&frame.topic, reference, json!({}))]
            }
            _ => Vec::new(),
        });
        socket
    }

    /// Queues a frame for the next `receive` calls.
    pub fn queue_receive(&mut self, frame: Frame) {
        self.inbound.push_back(frame);
    }

    /// Replaces the send responder.
    pub fn set_responder<F>(&mut self, responder: F)
    where
        F: FnMut(&Frame) -> Vec<Frame> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// All frames sent through this socket, in order.
    pub fn sent_frames(&self) -> &[Frame] {
        &self.sent
    }

    /// Frames sent with a given event name.
    pub fn sent_with_event(&self, event: &str) -> Vec<&Frame> {
        self.sent.iter().filter(|f| f.event == event).collect()
    }

    /// Forces the connection state, simulating a dropped socket.
    pub fn set_state(&mut self, state: SocketState) {
        self.state = state;
    }

    /// Makes the next `connect` call fail.
    pub fn fail_next_connect(&mut self) {
        self.fail_next_connect = true;
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.connect_count
    }

    /// Shared lifecycle journal ("connect"/"disconnect" entries); the handle
    /// stays valid after the socket moves into a transport.
    pub fn journal(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.journal)
    }

    fn record(&self, entry: &str) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(entry.to_string());
        }
    }
}

impl Default for MockSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for MockSocket {
    fn connect(&mut self, _config: &SocketConfig) -> TransportResult<()> {
        if self.fail_next_connect {
            self.fail_next_connect = false;
            self.state = SocketState::Disconnected;
            return Err(TransportError::ConnectionFailed("mock connect failure".into()));
        }
        self.state = SocketState::Connected;
        self.connect_count += 1;
        self.record("connect");
        Ok(())
    }

    fn disconnect(&mut self) -> TransportResult<()> {
        self.state = SocketState::Disconnected;
        self.record("disconnect");
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        if self.state != SocketState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(frame.clone());
        if let Some(responder) = self.responder.as_mut() {
            for reply in responder(frame) {
                self.inbound.push_back(reply);
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> TransportResult<Option<Frame>> {
        if self.state != SocketState::Connected {
            return Err(TransportError::NotConnected);
        }
        Ok(self.inbound.pop_front())
    }
}
