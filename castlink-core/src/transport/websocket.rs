// SPDX-FileCopyrightText: 2026 Castlink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Transport
//!
//! Real socket implementation using tungstenite for WebSocket connections.
//! Supports both native-tls and rustls TLS backends. Frames are JSON text
//! messages; auth params travel as query parameters on the handshake URL.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(all(feature = "network-native-tls", not(feature = "network-rustls")))]
use native_tls::TlsConnector;

#[cfg(feature = "network-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "network-rustls")]
use std::sync::Arc;

use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::{TransportError, TransportResult};
use crate::message::Frame;
use crate::transport::socket::{Socket, SocketConfig, SocketState};

/// WebSocket socket for relay communication.
///
/// Supports both ws:// (plaintext) and wss:// (TLS) connections.
///
/// # Example
///
/// ```ignore
/// use castlink_core::transport::{Socket, SocketConfig, WebSocketTransport};
///
/// let mut socket = WebSocketTransport::new();
/// let config = SocketConfig {
///     url: "wss://relay.example.com/socket".to_string(),
///     ..Default::default()
/// };
/// socket.connect(&config)?;
/// ```
pub struct WebSocketTransport {
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    state: SocketState,
}

impl WebSocketTransport {
    /// Creates a new, unconnected WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport {
            socket: None,
            state: SocketState::Disconnected,
        }
    }

    /// Parses a WebSocket URL into host, port and TLS flag.
    fn parse_url(url: &str) -> TransportResult<(String, u16, bool)> {
        let is_tls = url.starts_with("wss://");
        let url_without_scheme = url
            .strip_prefix("wss://")
            .or_else(|| url.strip_prefix("ws://"))
            .ok_or_else(|| {
                TransportError::ConnectionFailed(
                    "Invalid URL scheme (expected ws:// or wss://)".into(),
                )
            })?;

        // Split host:port/path
        let host_port = url_without_scheme
            .split('/')
            .next()
            .unwrap_or(url_without_scheme);

        let (host, port) = if let Some(colon_pos) = host_port.rfind(':') {
            let host = &host_port[..colon_pos];
            let port_str = &host_port[colon_pos + 1..];
            let port: u16 = port_str.parse().map_err(|_| {
                TransportError::ConnectionFailed(format!("Invalid port: {}", port_str))
            })?;
            (host.to_string(), port)
        } else {
            let default_port = if is_tls { 443 } else { 80 };
            (host_port.to_string(), default_port)
        };

        Ok((host, port, is_tls))
    }

    /// Appends the connect params as query parameters.
    fn handshake_url(config: &SocketConfig) -> String {
        let separator = if config.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}token={}&platform={}",
            config.url,
            separator,
            encode_component(&config.params.token),
            encode_component(&config.params.platform),
        )
    }

    /// Create a TLS stream using native-tls
    #[cfg(all(feature = "network-native-tls", not(feature = "network-rustls")))]
    fn create_tls_stream(
        host: &str,
        tcp_stream: TcpStream,
    ) -> TransportResult<MaybeTlsStream<TcpStream>> {
        let connector = TlsConnector::new()
            .map_err(|e| TransportError::ConnectionFailed(format!("TLS error: {}", e)))?;
        let tls_stream = connector.connect(host, tcp_stream).map_err(|e| {
            TransportError::ConnectionFailed(format!("TLS handshake failed: {}", e))
        })?;
        Ok(MaybeTlsStream::NativeTls(tls_stream))
    }

    /// Create a TLS stream using rustls
    #[cfg(feature = "network-rustls")]
    fn create_tls_stream(
        host: &str,
        tcp_stream: TcpStream,
    ) -> TransportResult<MaybeTlsStream<TcpStream>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let server_name: ServerName<'_> = host.try_into().map_err(|_| {
            TransportError::ConnectionFailed(format!("Invalid server name: {}", host))
        })?;

        let tls_conn = rustls::ClientConnection::new(Arc::new(tls_config), server_name.to_owned())
            .map_err(|e| TransportError::ConnectionFailed(format!("TLS setup failed: {}", e)))?;

        let tls_stream = rustls::StreamOwned::new(tls_conn, tcp_stream);
        Ok(MaybeTlsStream::Rustls(tls_stream))
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for WebSocketTransport {
    fn connect(&mut self, config: &SocketConfig) -> TransportResult<()> {
        if matches!(self.state, SocketState::Connected) {
            return Ok(());
        }

        self.state = SocketState::Connecting;

        let (host, port, is_tls) = Self::parse_url(&config.url).inspect_err(|_| {
            self.state = SocketState::Disconnected;
        })?;
        let addr = format!("{}:{}", host, port);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| {
                self.state = SocketState::Disconnected;
                TransportError::ConnectionFailed(e.to_string())
            })?
            .next()
            .ok_or_else(|| {
                self.state = SocketState::Disconnected;
                TransportError::ConnectionFailed(format!("No address for {}", addr))
            })?;

        let tcp_stream = TcpStream::connect_timeout(
            &socket_addr,
            Duration::from_millis(config.connect_timeout_ms),
        )
        .map_err(|e| {
            self.state = SocketState::Disconnected;
            TransportError::ConnectionFailed(e.to_string())
        })?;

        // Read timeout bounds the receive poll; writes use the connect timeout
        tcp_stream
            .set_read_timeout(Some(Duration::from_millis(config.io_timeout_ms)))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tcp_stream
            .set_write_timeout(Some(Duration::from_millis(config.connect_timeout_ms)))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Wrap in TLS if needed
        let stream: MaybeTlsStream<TcpStream> = if is_tls {
            Self::create_tls_stream(&host, tcp_stream).inspect_err(|_| {
                self.state = SocketState::Disconnected;
            })?
        } else {
            MaybeTlsStream::Plain(tcp_stream)
        };

        // WebSocket handshake with auth params on the URL
        let request = Self::handshake_url(config)
            .as_str()
            .into_client_request()
            .map_err(|e| {
                self.state = SocketState::Disconnected;
                TransportError::ConnectionFailed(format!("Invalid WebSocket request: {}", e))
            })?;

        let (socket, _response) = tungstenite::client(request, stream).map_err(|e| {
            self.state = SocketState::Disconnected;
            TransportError::ConnectionFailed(format!("WebSocket handshake failed: {}", e))
        })?;

        self.socket = Some(socket);
        self.state = SocketState::Connected;

        Ok(())
    }

    fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None); // Ignore errors on close
        }
        self.state = SocketState::Disconnected;
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;

        let encoded = serde_json::to_string(frame)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        socket.send(Message::Text(encoded)).map_err(|e| {
            if matches!(
                e,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ) {
                self.state = SocketState::Disconnected;
                TransportError::ConnectionClosed
            } else {
                TransportError::SendFailed(e.to_string())
            }
        })?;

        socket
            .flush()
            .map_err(|e| TransportError::SendFailed(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn receive(&mut self) -> TransportResult<Option<Frame>> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;

        match socket.read() {
            Ok(Message::Text(data)) => {
                let frame: Frame = serde_json::from_str(&data)
                    .map_err(|e| TransportError::InvalidFrame(e.to_string()))?;
                Ok(Some(frame))
            }
            Ok(Message::Ping(data)) => {
                // WebSocket-level keepalive, distinct from the channel heartbeat
                let _ = socket.send(Message::Pong(data));
                Ok(None)
            }
            Ok(Message::Pong(_)) => Ok(None),
            Ok(Message::Close(_)) => {
                self.state = SocketState::Disconnected;
                Err(TransportError::ConnectionClosed)
            }
            Ok(Message::Binary(_)) => Err(TransportError::InvalidFrame(
                "Unexpected binary message".into(),
            )),
            Ok(Message::Frame(_)) => Ok(None),
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // No message available within the poll interval
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                self.state = SocketState::Disconnected;
                Err(TransportError::ConnectionClosed)
            }
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }
}

/// Minimal percent-encoding for query components.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

// INLINE_TEST_REQUIRED: Tests private parse_url and handshake_url helpers
#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::socket::ConnectParams;

    #[test]
    fn test_parse_url_wss() {
        let (host, port, is_tls) =
            WebSocketTransport::parse_url("wss://relay.example.com").unwrap();
        assert_eq!(host, "relay.example.com");
        assert_eq!(port, 443);
        assert!(is_tls);
    }

    #[test]
    fn test_parse_url_ws_with_port() {
        let (host, port, is_tls) = WebSocketTransport::parse_url("ws://localhost:4000").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 4000);
        assert!(!is_tls);
    }

    #[test]
    fn test_parse_url_with_path() {
        let (host, port, is_tls) =
            WebSocketTransport::parse_url("wss://relay.example.com:9000/socket").unwrap();
        assert_eq!(host, "relay.example.com");
        assert_eq!(port, 9000);
        assert!(is_tls);
    }

    #[test]
    fn test_parse_url_invalid_scheme() {
        assert!(WebSocketTransport::parse_url("http://example.com").is_err());
    }

    #[test]
    fn test_handshake_url_params() {
        let config = SocketConfig {
            url: "wss://relay.example.com/socket".into(),
            params: ConnectParams {
                token: "a b&c".into(),
                platform: "castlink-rs".into(),
            },
            ..Default::default()
        };
        assert_eq!(
            WebSocketTransport::handshake_url(&config),
            "wss://relay.example.com/socket?token=a%20b%26c&platform=castlink-rs"
        );
    }

    #[test]
    fn test_send_without_connect_fails() {
        let mut socket = WebSocketTransport::new();
        let frame = Frame::new("room:1", "message", serde_json::json!({}));
        assert!(matches!(
            socket.send(&frame),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_when_not_connected_ok() {
        let mut socket = WebSocketTransport::new();
        assert!(socket.disconnect().is_ok());
        assert_eq!(socket.state(), SocketState::Disconnected);
    }
}
