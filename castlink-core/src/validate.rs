// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Validators
//!
//! Pure boolean predicates classifying untyped inbound JSON as envelope,
//! command, or metadata shapes. These are permissive pass/fail gates, not
//! schema errors: callers that receive `false` drop the message and log,
//! they never fail the connection over it.

use serde_json::Value;

/// Non-empty-string check for a `type` discriminator field.
fn type_field(value: &Value) -> Option<&str> {
    value
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn is_number(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_number)
}

/// A relay envelope: an object carrying a `payload`; a `type` field, when
/// present, must be a non-empty string. Server-relayed envelopes omit
/// `type`; only client-originated envelopes set it.
pub fn is_envelope(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if !obj.contains_key("payload") {
        return false;
    }
    match obj.get("type") {
        None => true,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => false,
    }
}

/// A command payload: an object with a non-empty-string `type`.
pub fn is_command_payload(value: &Value) -> bool {
    value.is_object() && type_field(value).is_some()
}

/// `play` requires a non-empty `contentId`; `isLive` is optional boolean.
pub fn is_valid_play_command(value: &Value) -> bool {
    if type_field(value) != Some("play") {
        return false;
    }
    let has_content = value
        .get("contentId")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    let live_ok = match value.get("isLive") {
        None | Some(Value::Null) => true,
        Some(v) => v.is_boolean(),
    };
    has_content && live_ok
}

/// `seek` requires a numeric, non-negative `position`.
pub fn is_valid_seek_command(value: &Value) -> bool {
    type_field(value) == Some("seek")
        && value
            .get("position")
            .and_then(Value::as_f64)
            .is_some_and(|p| p >= 0.0)
}

/// `skipForward`/`skipBackward` with optional numeric `seconds`.
pub fn is_valid_skip_command(value: &Value) -> bool {
    let kind_ok = matches!(type_field(value), Some("skipForward") | Some("skipBackward"));
    let seconds_ok = match value.get("seconds") {
        None | Some(Value::Null) => true,
        Some(v) => v.is_number(),
    };
    kind_ok && seconds_ok
}

/// `setSubtitles` requires a string `language`.
pub fn is_valid_subtitle_command(value: &Value) -> bool {
    type_field(value) == Some("setSubtitles")
        && value.get("language").is_some_and(Value::is_string)
}

/// Playback metadata: all required scalars present with the right primitive
/// type; `ad`, when present, must carry its four numeric fields.
pub fn is_metadata_payload(value: &Value) -> bool {
    if type_field(value) != Some("metadata") {
        return false;
    }
    let content_ok = matches!(
        value.get("contentId"),
        Some(Value::String(_)) | Some(Value::Null)
    );
    let scalars_ok = content_ok
        && value.get("isLive").is_some_and(Value::is_boolean)
        && is_number(value.get("duration"))
        && is_number(value.get("position"))
        && is_number(value.get("rate"))
        && value.get("isMuted").is_some_and(Value::is_boolean)
        && is_number(value.get("volume"))
        && value.get("subtitleLanguage").is_some_and(Value::is_string);
    if !scalars_ok {
        return false;
    }
    match value.get("ad") {
        None | Some(Value::Null) => true,
        Some(ad) => {
            ad.is_object()
                && is_number(ad.get("position"))
                && is_number(ad.get("duration"))
                && is_number(ad.get("sequence"))
                && is_number(ad.get("podCount"))
        }
    }
}
