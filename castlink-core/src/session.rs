// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Manager
//!
//! Owns the single live casting client and its room, resolves auth tokens,
//! and turns remote play/resume commands into host-app navigation while
//! keeping the last-known playback metadata for resume.
//!
//! This is an explicit struct owned by the application's composition root
//! and passed by reference, so tests can construct isolated instances.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::client::{ClientEvent, ClientEventKind, ClientStatus, ProtocolClient};
use crate::config;
use crate::error::{SessionError, SessionResult};
use crate::events::HandlerId;
use crate::message::Command;
use crate::transport::socket::{ConnectParams, Socket, SocketConfig};

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
use crate::transport::websocket::WebSocketTransport;

/// Auth token collaborator.
///
/// `sync_tokens` refreshes from the auth backend; `stored_token` reads the
/// current token, if any.
pub trait TokenProvider: Send {
    fn sync_tokens(&mut self) -> SessionResult<()>;
    fn stored_token(&self) -> Option<String>;
}

/// Navigation intent: open the player for a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTarget {
    pub content_id: String,
    pub is_live: bool,
}

/// Back-button override installed before navigating, so the back button
/// unwinds to a sensible screen instead of the literal history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOverride {
    /// VOD: player → detail → home.
    DetailThenHome { content_id: String },
    /// Live: player → home.
    Home,
}

/// Host-app navigation collaborator.
pub trait NavigationDispatch: Send {
    fn set_back_override(&mut self, back: BackOverride);
    fn navigate_to_player(&mut self, target: PlayerTarget);
}

/// Last-known playback state, read when a `resume` command arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct LastMetadata {
    pub content_id: String,
    pub is_live: bool,
    pub position: f64,
    pub subtitle_language: Option<String>,
}

/// Navigation state shared between the session and the installed command
/// handler. Survives client recreation on room change.
#[derive(Default)]
struct NavigationState {
    dispatch: Option<Box<dyn NavigationDispatch>>,
    last_metadata: Option<LastMetadata>,
    /// One-shot suppression of a stale metadata report from the outgoing
    /// player's teardown race; holds the old content id.
    skip_metadata_for: Option<String>,
}

/// Parameters for [`SessionManager::get_client`].
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub room_id: String,
    pub ws_url: Option<String>,
    pub token: Option<String>,
}

impl SessionRequest {
    pub fn new(room_id: impl Into<String>) -> Self {
        SessionRequest {
            room_id: room_id.into(),
            ws_url: None,
            token: None,
        }
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Owns "which room is currently joined" and the one live client.
///
/// # Example
///
/// ```ignore
/// use castlink_core::session::{SessionManager, SessionRequest};
///
/// let mut session = SessionManager::new(Box::new(tokens));
/// session.set_dispatch(Box::new(app_navigation));
/// let client = session.get_client(SessionRequest::new("living-room"))?;
/// client.connect()?;
/// ```
pub struct SessionManager<S: Socket> {
    client: Option<ProtocolClient<S>>,
    room_id: Option<String>,
    socket_factory: Box<dyn FnMut() -> S + Send>,
    tokens: Box<dyn TokenProvider>,
    platform: String,
    dedup_window: Option<usize>,
    nav: Arc<Mutex<NavigationState>>,
    command_handler: Option<HandlerId>,
}

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
impl SessionManager<WebSocketTransport> {
    /// Creates a session manager over the production WebSocket transport.
    pub fn new(tokens: Box<dyn TokenProvider>) -> Self {
        Self::with_socket_factory(tokens, WebSocketTransport::new)
    }
}

impl<S: Socket> SessionManager<S> {
    /// Creates a session manager with a custom socket factory (for tests or
    /// alternative transports).
    pub fn with_socket_factory<F>(tokens: Box<dyn TokenProvider>, socket_factory: F) -> Self
    where
        F: FnMut() -> S + Send + 'static,
    {
        SessionManager {
            client: None,
            room_id: None,
            socket_factory: Box::new(socket_factory),
            tokens,
            platform: config::DEFAULT_PLATFORM.to_string(),
            dedup_window: None,
            nav: Arc::new(Mutex::new(NavigationState::default())),
            command_handler: None,
        }
    }

    /// Overrides the platform identifier sent on socket init.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Overrides the dedup window for clients created by this session.
    pub fn with_dedup_window(mut self, capacity: usize) -> Self {
        self.dedup_window = Some(capacity);
        self
    }

    /// Returns the client for a room, creating it if needed.
    ///
    /// A request for the currently joined room returns the existing client
    /// unchanged. A request for a different room tears the old client down
    /// first: never two rooms concurrently. The caller is responsible for
    /// invoking `connect()`.
    pub fn get_client(&mut self, request: SessionRequest) -> SessionResult<&mut ProtocolClient<S>> {
        let same_room = self.room_id.as_deref() == Some(request.room_id.as_str());
        if !(same_room && self.client.is_some()) {
            if let Some(mut old) = self.client.take() {
                debug!(from = ?self.room_id, to = %request.room_id, "room changed; tearing down client");
                old.disconnect();
                self.room_id = None;
            }

            let token = self.resolve_token(request.token)?;
            let socket_config = SocketConfig {
                url: config::resolve_ws_url(request.ws_url.as_deref()),
                params: ConnectParams {
                    token,
                    platform: self.platform.clone(),
                },
                ..SocketConfig::default()
            };
            let socket = (self.socket_factory)();
            let mut client = ProtocolClient::new(socket, socket_config, request.room_id.clone())
                .with_dedup_window(config::resolve_dedup_window(self.dedup_window));
            self.install_command_handler(&mut client);
            self.client = Some(client);
            self.room_id = Some(request.room_id);
        }
        match self.client.as_mut() {
            Some(client) => Ok(client),
            None => Err(SessionError::Configuration("client construction failed".into())),
        }
    }

    /// Resolves a token: caller-supplied wins, otherwise sync + read from
    /// the token collaborator. Never connects unauthenticated.
    fn resolve_token(&mut self, explicit: Option<String>) -> SessionResult<String> {
        if let Some(token) = explicit {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        self.tokens.sync_tokens()?;
        self.tokens
            .stored_token()
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NoToken)
    }

    /// Attaches the navigation command handler to a new client. The handler
    /// closes over the shared navigation state, so the metadata cache and
    /// skip flag survive client recreation.
    fn install_command_handler(&mut self, client: &mut ProtocolClient<S>) {
        let nav = Arc::clone(&self.nav);
        let id = client.on(ClientEventKind::Command, move |event| {
            if let ClientEvent::Command { command, .. } = event {
                handle_navigation_command(&nav, command);
            }
        });
        self.command_handler = Some(id);
    }

    /// Returns the live client, if any.
    pub fn current_client(&mut self) -> Option<&mut ProtocolClient<S>> {
        self.client.as_mut()
    }

    /// Returns the currently joined room id, if any.
    pub fn current_room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Returns true if the live client is connected.
    pub fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|c| c.status() == ClientStatus::Connected)
    }

    /// Full teardown: disconnects and discards the client, clears the room.
    pub fn disconnect(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
        self.room_id = None;
        self.command_handler = None;
    }

    /// Injects the navigation collaborator.
    pub fn set_dispatch(&self, dispatch: Box<dyn NavigationDispatch>) {
        if let Ok(mut nav) = self.nav.lock() {
            nav.dispatch = Some(dispatch);
        }
    }

    /// Removes the navigation collaborator.
    pub fn clear_dispatch(&self) {
        if let Ok(mut nav) = self.nav.lock() {
            nav.dispatch = None;
        }
    }

    /// Returns true if a navigation collaborator is installed.
    pub fn has_dispatch(&self) -> bool {
        self.nav.lock().map(|nav| nav.dispatch.is_some()).unwrap_or(false)
    }

    /// Records playback state reported by the host app.
    pub fn update_last_metadata(&self, metadata: LastMetadata) {
        if let Ok(mut nav) = self.nav.lock() {
            nav.last_metadata = Some(metadata);
        }
    }

    /// Returns the cached playback state, if any.
    pub fn last_metadata(&self) -> Option<LastMetadata> {
        self.nav.lock().ok().and_then(|nav| nav.last_metadata.clone())
    }

    /// Clears the cached playback state (logout/teardown).
    pub fn clear_last_metadata(&self) {
        if let Ok(mut nav) = self.nav.lock() {
            nav.last_metadata = None;
            nav.skip_metadata_for = None;
        }
    }

    /// Returns true if a metadata report for this content id should be
    /// suppressed as a stale teardown-race report. Checking clears the flag:
    /// exactly-once semantics.
    pub fn should_skip_metadata(&self, content_id: &str) -> bool {
        let Ok(mut nav) = self.nav.lock() else {
            return false;
        };
        if nav.skip_metadata_for.as_deref() == Some(content_id) {
            nav.skip_metadata_for = None;
            true
        } else {
            false
        }
    }

    /// Detaches the navigation command handler from the live client.
    /// Test/cleanup hook.
    pub fn clear_navigation_command_handler(&mut self) {
        if let (Some(client), Some(id)) = (self.client.as_mut(), self.command_handler.take()) {
            client.off(id);
        }
    }
}

/// Turns a remote command into navigation. Only `play` and `resume` are
/// navigation concerns; the player handles the rest.
fn handle_navigation_command(nav: &Arc<Mutex<NavigationState>>, command: &Command) {
    let Ok(mut state) = nav.lock() else {
        warn!("navigation state poisoned; command dropped");
        return;
    };
    match command {
        Command::Play {
            content_id,
            is_live,
        } => {
            let is_live = is_live.unwrap_or(false);
            if let Some(previous) = &state.last_metadata {
                if previous.content_id != *content_id {
                    // the outgoing player may still report one stale tick
                    state.skip_metadata_for = Some(previous.content_id.clone());
                }
            }
            let subtitle_language = state
                .last_metadata
                .as_ref()
                .and_then(|m| m.subtitle_language.clone());
            state.last_metadata = Some(LastMetadata {
                content_id: content_id.clone(),
                is_live,
                position: 0.0,
                subtitle_language,
            });
            navigate(&mut state, content_id.clone(), is_live);
        }
        Command::Resume => {
            let Some(cached) = state.last_metadata.clone() else {
                debug!("resume with no cached playback; ignored");
                return;
            };
            navigate(&mut state, cached.content_id, cached.is_live);
        }
        _ => {}
    }
}

fn navigate(state: &mut NavigationState, content_id: String, is_live: bool) {
    let Some(dispatch) = state.dispatch.as_mut() else {
        debug!(content = %content_id, "no navigation dispatch installed");
        return;
    };
    let back = if is_live {
        BackOverride::Home
    } else {
        BackOverride::DetailThenHome {
            content_id: content_id.clone(),
        }
    };
    dispatch.set_back_override(back);
    dispatch.navigate_to_player(PlayerTarget {
        content_id,
        is_live,
    });
}
