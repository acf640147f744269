//! Client configuration.

use std::time::Duration;

use critcast_feed::DEFAULT_FEED_CAPACITY;
use critcast_protocol::{RollSource, SourceKind, WireFormat};
use critcast_session::DEFAULT_CONNECT_TIMEOUT;
use tracing::warn;

/// Persistent connection endpoint (a Socket.IO server).
pub const DEFAULT_SOCKET_URL: &str = "wss://api.critcast.com";
/// Base URL of the REST API (`{base}/api/v1/ingest`).
pub const DEFAULT_SERVER_URL: &str = "https://api.critcast.com";
/// Application name stamped on locally authored rolls.
pub const DEFAULT_APP_NAME: &str = "CritCast Client";

/// Settings for a [`TableClient`](crate::TableClient).
///
/// Start from `ClientConfig::default()` (or [`from_env`](Self::from_env))
/// and override what you need. Values are normalized by
/// [`validated`](Self::validated) when the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL the table connection is opened against.
    pub socket_url: String,

    /// Framing spoken on the table connection. Socket.IO URLs get the
    /// `/socket.io/` path appended when they carry no query.
    pub wire_format: WireFormat,

    /// REST base URL used for roll submission.
    pub server_url: String,

    /// How long a connection attempt may take before it fails with
    /// `"timeout"`.
    pub connect_timeout: Duration,

    /// Timeout for each roll submission request.
    pub request_timeout: Duration,

    /// Maximum number of rolls kept in the feed.
    pub feed_capacity: usize,

    /// Source descriptor for locally authored rolls.
    pub app_name: String,
    pub app_version: String,

    /// Capacity of the client command channel.
    pub command_buffer: usize,

    /// Events kept for a slow receiver before new ones are dropped.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            wire_format: WireFormat::SocketIo,
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            app_name: DEFAULT_APP_NAME.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl ClientConfig {
    /// Upper bound on the feed size.
    pub const MAX_FEED_CAPACITY: usize = 1_000;

    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Reads `CRITCAST_SOCKET_URL`, `CRITCAST_SERVER_URL` and
    /// `CRITCAST_WIRE_FORMAT` (`socket.io` or `json`), falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let wire_format = match std::env::var("CRITCAST_WIRE_FORMAT") {
            Ok(name) => parse_wire_format(&name).unwrap_or_else(|| {
                warn!(%name, "unknown CRITCAST_WIRE_FORMAT, using socket.io");
                defaults.wire_format
            }),
            Err(_) => defaults.wire_format,
        };
        Self {
            socket_url: std::env::var("CRITCAST_SOCKET_URL").unwrap_or(defaults.socket_url),
            server_url: std::env::var("CRITCAST_SERVER_URL").unwrap_or(defaults.server_url),
            wire_format,
            ..Self::default()
        }
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// - URLs are trimmed, and the server URL loses trailing slashes.
    /// - Zero timeouts fall back to their defaults.
    /// - `feed_capacity` is clamped to `1..=MAX_FEED_CAPACITY`.
    /// - `command_buffer` and `event_buffer` are at least 1.
    pub fn validated(mut self) -> Self {
        self.socket_url = self.socket_url.trim().to_string();
        self.server_url = self.server_url.trim().trim_end_matches('/').to_string();

        if self.connect_timeout.is_zero() {
            warn!("connect_timeout is zero, using default");
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = Self::DEFAULT_REQUEST_TIMEOUT;
        }
        if self.feed_capacity == 0 || self.feed_capacity > Self::MAX_FEED_CAPACITY {
            warn!(
                capacity = self.feed_capacity,
                max = Self::MAX_FEED_CAPACITY,
                "feed_capacity out of range, clamping"
            );
            self.feed_capacity = self.feed_capacity.clamp(1, Self::MAX_FEED_CAPACITY);
        }
        self.command_buffer = self.command_buffer.max(1);
        self.event_buffer = self.event_buffer.max(1);
        self
    }

    /// The `source` block attached to rolls authored by this client.
    pub fn roll_source(&self) -> RollSource {
        RollSource {
            kind: SourceKind::App,
            label: Some(self.app_name.clone()),
            version: Some(self.app_version.clone()),
        }
    }
}

fn parse_wire_format(name: &str) -> Option<WireFormat> {
    match name.trim().to_ascii_lowercase().as_str() {
        "socket.io" | "socketio" => Some(WireFormat::SocketIo),
        "json" | "json-frames" => Some(WireFormat::JsonFrames),
        _ => None,
    }
}
