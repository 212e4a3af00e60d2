//! Channel Join Tests
//!
//! Join handshake, single-channel rule, push acks, and the reconnect policy
//! split between transient and critical failures.

use serde_json::json;

use castlink_core::message::{Frame, EVENT_JOIN, EVENT_LEAVE, EVENT_MESSAGE};
use castlink_core::transport::{ChannelTransport, MockSocket, SocketConfig, SocketState};
use castlink_core::TransportError;

fn fast_config() -> SocketConfig {
    SocketConfig {
        url: "ws://localhost:4000/socket".into(),
        join_timeout_ms: 50,
        push_timeout_ms: 50,
        pong_timeout_ms: 50,
        ..Default::default()
    }
}

fn refusing_socket(code: &str) -> MockSocket {
    let code = code.to_string();
    let mut socket = MockSocket::new();
    socket.set_responder(move |frame| {
        if frame.event == EVENT_JOIN {
            let reference = frame.reference.clone().unwrap_or_default();
            vec![Frame::reply_error(
                &frame.topic,
                reference,
                json!({ "error": code }),
            )]
        } else {
            Vec::new()
        }
    });
    socket
}

// =============================================================================
// Join Handshake
// =============================================================================

/// Scenario: successful join records the channel and returns the response
#[test]
fn test_join_ok() {
    let mut socket = MockSocket::new();
    socket.set_responder(|frame| {
        if frame.event == EVENT_JOIN {
            let reference = frame.reference.clone().unwrap_or_default();
            vec![Frame::reply_ok(
                &frame.topic,
                reference,
                json!({ "participants": ["tv"] }),
            )]
        } else {
            Vec::new()
        }
    });

    let mut transport = ChannelTransport::new(socket, fast_config());
    transport.connect().unwrap();
    let response = transport.join_room("living-room").unwrap();

    assert_eq!(response["participants"], json!(["tv"]));
    assert!(transport.is_joined());
    assert_eq!(transport.joined_room_id(), Some("living-room"));

    let sent = transport.socket().sent_frames();
    assert_eq!(sent[0].event, EVENT_JOIN);
    assert_eq!(sent[0].topic, "room:living-room");
}

/// Scenario: join without a connected socket rejects immediately
#[test]
fn test_join_requires_socket() {
    let mut transport = ChannelTransport::new(MockSocket::new(), fast_config());
    let result = transport.join_room("living-room");
    assert!(matches!(result, Err(TransportError::NotConnected)));
}

/// Scenario: join with no reply times out
#[test]
fn test_join_timeout() {
    let mut transport = ChannelTransport::new(MockSocket::new(), fast_config());
    transport.connect().unwrap();

    let result = transport.join_room("living-room");
    assert!(matches!(result, Err(TransportError::Timeout)));
    assert!(!transport.is_joined());
}

/// Scenario: joining a second room leaves the first - one channel at a time
#[test]
fn test_join_leaves_previous_channel_first() {
    let mut transport = ChannelTransport::new(MockSocket::acking(), fast_config());
    transport.connect().unwrap();
    transport.join_room("a").unwrap();
    transport.join_room("b").unwrap();

    let events: Vec<(&str, &str)> = transport
        .socket()
        .sent_frames()
        .iter()
        .map(|f| (f.event.as_str(), f.topic.as_str()))
        .collect();
    assert_eq!(
        events,
        vec![
            (EVENT_JOIN, "room:a"),
            (EVENT_LEAVE, "room:a"),
            (EVENT_JOIN, "room:b"),
        ]
    );
    assert_eq!(transport.joined_room_id(), Some("b"));
}

// =============================================================================
// Refusal Classification
// =============================================================================

/// Scenario: critical refusal stops reconnecting and force-disconnects
#[test]
fn test_critical_refusal_stops_reconnect() {
    let mut transport = ChannelTransport::new(refusing_socket("TOKEN_EXPIRED"), fast_config());
    transport.connect().unwrap();

    let result = transport.join_room("living-room");
    match result {
        Err(TransportError::JoinRefused {
            reason,
            critical,
            retryable,
        }) => {
            assert_eq!(reason, "TOKEN_EXPIRED");
            assert!(critical);
            assert!(!retryable);
        }
        other => panic!("expected JoinRefused, got {other:?}"),
    }
    assert!(transport.reconnect_stopped());
    assert_eq!(transport.state(), SocketState::Disconnected);

    // connect is suppressed until an explicit flag-resetting disconnect
    transport.connect().unwrap();
    assert_eq!(transport.state(), SocketState::Disconnected);

    transport.disconnect();
    assert!(!transport.reconnect_stopped());
    transport.connect().unwrap();
    assert_eq!(transport.state(), SocketState::Connected);
}

/// Scenario: room refusal is non-retryable but not an auth problem
#[test]
fn test_room_refusal_non_retryable_not_critical() {
    let mut transport = ChannelTransport::new(refusing_socket("ROOM_CLOSED"), fast_config());
    transport.connect().unwrap();

    match transport.join_room("living-room") {
        Err(TransportError::JoinRefused {
            critical,
            retryable,
            ..
        }) => {
            assert!(!critical);
            assert!(!retryable);
        }
        other => panic!("expected JoinRefused, got {other:?}"),
    }
    assert!(transport.reconnect_stopped());
}

/// Scenario: unknown refusal codes stay retryable and keep the socket open
#[test]
fn test_transient_refusal_keeps_reconnect() {
    let mut transport = ChannelTransport::new(refusing_socket("UPSTREAM_HICCUP"), fast_config());
    transport.connect().unwrap();

    match transport.join_room("living-room") {
        Err(TransportError::JoinRefused {
            critical,
            retryable,
            ..
        }) => {
            assert!(!critical);
            assert!(retryable);
        }
        other => panic!("expected JoinRefused, got {other:?}"),
    }
    assert!(!transport.reconnect_stopped());
    assert_eq!(transport.state(), SocketState::Connected);
}

// =============================================================================
// Push
// =============================================================================

/// Scenario: push before join rejects immediately
#[test]
fn test_push_requires_join() {
    let mut transport = ChannelTransport::new(MockSocket::acking(), fast_config());
    transport.connect().unwrap();

    let result = transport.push(EVENT_MESSAGE, json!({ "type": "resume" }));
    assert!(matches!(result, Err(TransportError::NotJoined)));
}

/// Scenario: push resolves with the server ack
#[test]
fn test_push_acked() {
    let mut transport = ChannelTransport::new(MockSocket::acking(), fast_config());
    transport.connect().unwrap();
    transport.join_room("living-room").unwrap();

    let response = transport.push(EVENT_MESSAGE, json!({ "type": "resume" })).unwrap();
    assert_eq!(response, json!({}));

    let pushes = transport.socket().sent_with_event(EVENT_MESSAGE);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload, json!({ "type": "resume" }));
}

/// Scenario: push error rejects the caller but keeps the connection
#[test]
fn test_push_refused_is_caller_scoped() {
    let mut socket = MockSocket::new();
    socket.set_responder(|frame| {
        let reference = frame.reference.clone().unwrap_or_default();
        match frame.event.as_str() {
            EVENT_JOIN => vec![Frame::reply_ok(&frame.topic, reference, json!({}))],
            EVENT_MESSAGE => vec![Frame::reply_error(
                &frame.topic,
                reference,
                json!({ "reason": "too large" }),
            )],
            _ => Vec::new(),
        }
    });

    let mut transport = ChannelTransport::new(socket, fast_config());
    transport.connect().unwrap();
    transport.join_room("living-room").unwrap();

    let result = transport.push(EVENT_MESSAGE, json!({ "type": "resume" }));
    assert!(matches!(result, Err(TransportError::PushRefused(r)) if r == "too large"));
    assert!(transport.is_joined());
    assert_eq!(transport.state(), SocketState::Connected);
}

// =============================================================================
// Reconnect
// =============================================================================

/// Scenario: a dropped socket reconnects and rejoins the last room
#[test]
fn test_reconnect_rejoins_room() {
    let mut transport = ChannelTransport::new(MockSocket::acking(), fast_config());
    transport.connect().unwrap();
    transport.join_room("living-room").unwrap();

    transport.socket_mut().set_state(SocketState::Disconnected);
    transport.poll_event().unwrap();

    assert_eq!(transport.socket().connect_count(), 2);
    assert!(transport.is_joined());
    assert_eq!(transport.joined_room_id(), Some("living-room"));
    // the successful rejoin resets the attempt counter
    assert_eq!(transport.reconnect_attempt(), 0);
    assert_eq!(transport.socket().sent_with_event(EVENT_JOIN).len(), 2);
}

/// Scenario: reconnect backs off and gives up after the attempt cap
#[test]
fn test_reconnect_attempts_capped() {
    let config = SocketConfig {
        max_reconnect_attempts: 2,
        ..fast_config()
    };
    let mut transport = ChannelTransport::new(MockSocket::acking(), config);
    transport.connect().unwrap();
    transport.join_room("living-room").unwrap();

    for _ in 0..2 {
        transport.socket_mut().set_state(SocketState::Disconnected);
        transport.socket_mut().fail_next_connect();
        let _ = transport.poll_event();
    }
    transport.socket_mut().set_state(SocketState::Disconnected);
    let result = transport.poll_event();
    assert!(matches!(result, Err(TransportError::MaxRetriesExceeded)));
}

/// Scenario: a stopped transport does not reconnect on poll
#[test]
fn test_poll_does_not_reconnect_after_critical_error() {
    let mut transport = ChannelTransport::new(refusing_socket("TOKEN_INVALID"), fast_config());
    transport.connect().unwrap();
    let _ = transport.join_room("living-room");
    assert!(transport.reconnect_stopped());

    let connects_before = transport.socket().connect_count();
    assert!(transport.poll_event().unwrap().is_none());
    assert_eq!(transport.socket().connect_count(), connects_before);
}
