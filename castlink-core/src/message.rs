// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire Message Types
//!
//! Frame types for the multiplexed channel protocol and the typed payloads
//! exchanged inside relay envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate;

/// Channel-control event: join a channel.
pub const EVENT_JOIN: &str = "join";
/// Channel-control event: leave the joined channel.
pub const EVENT_LEAVE: &str = "leave";
/// Channel-control event: correlated reply to a join/push.
pub const EVENT_REPLY: &str = "reply";
/// Channel-control event: server-side channel failure.
pub const EVENT_ERROR: &str = "error";
/// Channel-control event: server closed the channel.
pub const EVENT_CLOSE: &str = "close";

/// Relayed envelope carrying a command or metadata payload.
pub const EVENT_MESSAGE: &str = "message";
/// Server heartbeat probe.
pub const EVENT_PING: &str = "ping";
/// Client heartbeat reply.
pub const EVENT_PONG: &str = "pong";
/// Full presence snapshot.
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
/// Incremental presence joins/leaves.
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";

/// Channel name for a relay room.
pub fn room_topic(room_id: &str) -> String {
    format!("room:{room_id}")
}

/// One frame of the multiplexed channel protocol.
///
/// `reference` correlates replies with the join/push that caused them;
/// `join_ref` ties a frame to the channel join it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    /// Creates a frame without correlation refs.
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Frame {
            join_ref: None,
            reference: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Sets the correlation ref.
    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Builds an ok reply to the given ref. Used by tests and mocks.
    pub fn reply_ok(topic: impl Into<String>, reference: impl Into<String>, response: Value) -> Self {
        Frame::new(
            topic,
            EVENT_REPLY,
            serde_json::json!({ "status": "ok", "response": response }),
        )
        .with_ref(reference)
    }

    /// Builds an error reply to the given ref. Used by tests and mocks.
    pub fn reply_error(
        topic: impl Into<String>,
        reference: impl Into<String>,
        response: Value,
    ) -> Self {
        Frame::new(
            topic,
            EVENT_REPLY,
            serde_json::json!({ "status": "error", "response": response }),
        )
        .with_ref(reference)
    }
}

/// Relay envelope around a command or metadata payload.
///
/// Server-relayed envelopes carry `sender`/`room_id`/`ts`; the optional
/// `type` is only set on client-originated envelopes. Inbound envelopes are
/// validated as raw JSON first (see [`crate::validate`]); this struct exists
/// for construction and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Remote playback command, decoded from a relayed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "play")]
    Play {
        #[serde(rename = "contentId")]
        content_id: String,
        #[serde(rename = "isLive", default, skip_serializing_if = "Option::is_none")]
        is_live: Option<bool>,
    },
    #[serde(rename = "resume")]
    Resume,
    #[serde(rename = "seek")]
    Seek { position: f64 },
    #[serde(rename = "skipForward")]
    SkipForward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
    },
    #[serde(rename = "skipBackward")]
    SkipBackward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
    },
    #[serde(rename = "setSubtitles")]
    SetSubtitles { language: String },
}

impl Command {
    /// Decodes a payload that already passed the validator gates.
    ///
    /// Returns `None` for unknown command types or structurally invalid
    /// variants; callers log and drop, they never fail on bad input.
    pub fn parse(payload: &Value) -> Option<Command> {
        if !validate::is_command_payload(payload) {
            return None;
        }
        let valid = match payload.get("type").and_then(Value::as_str)? {
            "play" => validate::is_valid_play_command(payload),
            "resume" => true,
            "seek" => validate::is_valid_seek_command(payload),
            "skipForward" | "skipBackward" => validate::is_valid_skip_command(payload),
            "setSubtitles" => validate::is_valid_subtitle_command(payload),
            _ => false,
        };
        if !valid {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Ad break info attached to playback metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdBreak {
    pub position: f64,
    pub duration: f64,
    pub sequence: u32,
    #[serde(rename = "podCount")]
    pub pod_count: u32,
}

/// Playback metadata reported to the room while playing.
///
/// Sent outbound on a fixed interval; never stored beyond the session's
/// in-memory last-metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPayload {
    #[serde(rename = "contentId")]
    pub content_id: Option<String>,
    #[serde(rename = "isLive")]
    pub is_live: bool,
    pub duration: f64,
    pub position: f64,
    pub rate: f64,
    #[serde(rename = "isMuted")]
    pub is_muted: bool,
    pub volume: f64,
    #[serde(rename = "subtitleLanguage")]
    pub subtitle_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad: Option<AdBreak>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new("room:42", EVENT_MESSAGE, json!({"a": 1})).with_ref("7");
        let encoded = serde_json::to_string(&frame).unwrap();
        assert!(encoded.contains("\"ref\":\"7\""));
        assert!(!encoded.contains("join_ref"));
        let decoded: Frame = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_command_parse_play() {
        let cmd = Command::parse(&json!({"type": "play", "contentId": "42", "isLive": true}));
        assert_eq!(
            cmd,
            Some(Command::Play {
                content_id: "42".into(),
                is_live: Some(true),
            })
        );
    }

    #[test]
    fn test_command_parse_resume_and_seek() {
        assert_eq!(Command::parse(&json!({"type": "resume"})), Some(Command::Resume));
        assert_eq!(
            Command::parse(&json!({"type": "seek", "position": 5})),
            Some(Command::Seek { position: 5.0 })
        );
    }

    #[test]
    fn test_command_parse_rejects_invalid() {
        assert_eq!(Command::parse(&json!({"type": "play"})), None);
        assert_eq!(Command::parse(&json!({"type": "seek", "position": -2})), None);
        assert_eq!(Command::parse(&json!({"type": "teleport"})), None);
        assert_eq!(Command::parse(&json!({"position": 5})), None);
    }

    #[test]
    fn test_metadata_wire_names() {
        let metadata = MetadataPayload {
            content_id: Some("42".into()),
            is_live: false,
            duration: 3600.0,
            position: 12.0,
            rate: 1.0,
            is_muted: false,
            volume: 1.0,
            subtitle_language: "en".into(),
            ad: None,
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["contentId"], json!("42"));
        assert_eq!(value["isLive"], json!(false));
        assert_eq!(value["subtitleLanguage"], json!("en"));
        assert!(value.get("ad").is_none());
    }

    #[test]
    fn test_envelope_serde() {
        let envelope: Envelope = serde_json::from_value(json!({
            "sender": "device-1",
            "room_id": "42",
            "ts": 1700000000,
            "msg_id": "m1",
            "payload": {"type": "resume"}
        }))
        .unwrap();
        assert_eq!(envelope.sender.as_deref(), Some("device-1"));
        assert_eq!(envelope.msg_id.as_deref(), Some("m1"));
        assert!(envelope.kind.is_none());
    }
}
