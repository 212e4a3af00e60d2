// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration Resolution
//!
//! Compiled defaults with runtime and environment overrides. The WebSocket
//! URL resolves caller override → `CASTLINK_WS_URL` → compiled default;
//! the dedup window resolves caller override → compiled default.

/// Compiled default relay WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://relay.castlink.app/socket";

/// Environment variable overriding the relay WebSocket URL.
pub const WS_URL_ENV: &str = "CASTLINK_WS_URL";

/// Compiled default dedup window (retained message ids).
pub const DEFAULT_DEDUP_WINDOW: usize = 100;

/// Platform identifier sent in the socket connect params.
pub const DEFAULT_PLATFORM: &str = "castlink-rs";

/// Resolves the relay WebSocket URL.
pub fn resolve_ws_url(override_url: Option<&str>) -> String {
    resolve_ws_url_from(override_url, std::env::var(WS_URL_ENV).ok())
}

fn resolve_ws_url_from(override_url: Option<&str>, env_url: Option<String>) -> String {
    if let Some(url) = override_url {
        if !url.is_empty() {
            return url.to_string();
        }
    }
    if let Some(url) = env_url {
        if !url.is_empty() {
            return url;
        }
    }
    DEFAULT_WS_URL.to_string()
}

/// Resolves the dedup window size.
pub fn resolve_dedup_window(override_size: Option<usize>) -> usize {
    override_size.unwrap_or(DEFAULT_DEDUP_WINDOW)
}
