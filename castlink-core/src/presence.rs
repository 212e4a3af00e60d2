// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Presence Tracking
//!
//! Client-side roster of room participants, rebuilt from the server's
//! periodic full-state snapshots and incremental diffs. Eventually
//! consistent with the server's view, never authoritative.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

/// Participant roster: participant id → list of meta records
/// (device name, platform, ...).
#[derive(Debug, Default)]
pub struct PresenceMap {
    entries: HashMap<String, Vec<Value>>,
}

fn metas_of(entry: &Value) -> Vec<Value> {
    entry
        .get("metas")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl PresenceMap {
    pub fn new() -> Self {
        PresenceMap::default()
    }

    /// Applies a full snapshot: union of existing and incoming state, with
    /// incoming metas replacing existing metas per participant.
    pub fn sync_state(&mut self, state: &Value) {
        let Some(incoming) = state.as_object() else {
            return;
        };
        for (id, entry) in incoming {
            if !self.entries.contains_key(id) {
                debug!(participant = %id, "presence join");
            }
            self.entries.insert(id.clone(), metas_of(entry));
        }
    }

    /// Applies an incremental diff of joins and leaves.
    pub fn sync_diff(&mut self, diff: &Value) {
        if let Some(joins) = diff.get("joins").and_then(Value::as_object) {
            for (id, entry) in joins {
                debug!(participant = %id, "presence join");
                self.entries
                    .entry(id.clone())
                    .or_default()
                    .extend(metas_of(entry));
            }
        }
        if let Some(leaves) = diff.get("leaves").and_then(Value::as_object) {
            for (id, entry) in leaves {
                debug!(participant = %id, "presence leave");
                let left = metas_of(entry);
                if let Some(metas) = self.entries.get_mut(id) {
                    metas.retain(|meta| !left.contains(meta));
                    if metas.is_empty() {
                        self.entries.remove(id);
                    }
                }
            }
        }
    }

    /// Returns all participant ids, sorted for stable iteration.
    pub fn participants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the meta records for a participant.
    pub fn metas(&self, participant_id: &str) -> Option<&[Value]> {
        self.entries.get(participant_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
