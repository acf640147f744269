//! Wire framings for the persistent connection.
//!
//! The hosted table service speaks Socket.IO (protocol 5) on top of
//! Engine.IO v4, one packet per WebSocket message:
//!
//! ```text
//! server ──0{"sid":..,"pingInterval":..}──▶ client   engine open
//! client ──40{"apiKey":".."}──────────────▶ server   namespace connect
//! server ──40{"sid":..}───────────────────▶ client   connect ack
//! client ──42["subscribe:table",{..}]─────▶ server   event
//! server ──2──────────────────────────────▶ client   ping, answered with 3
//! ```
//!
//! [`WireFormat::JsonFrames`] keeps the bare `{"event","data"}` framing for
//! relays and local test servers that do not speak Socket.IO.

use serde_json::{Value, json};

use crate::{Codec, Frame, JsonCodec, OutboundEvent, ProtocolError};

/// Path and query appended to a Socket.IO base URL.
pub const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// How events are framed on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Socket.IO over Engine.IO v4.
    #[default]
    SocketIo,
    /// One `{"event": .., "data": ..}` JSON object per message.
    JsonFrames,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// An application event.
    Event(Frame),
    /// Engine.IO session opened.
    Open,
    /// Heartbeat that must be answered with [`WireFormat::pong`].
    Ping,
    /// The server accepted the namespace connect.
    Connected,
    /// The server refused the namespace connect.
    Refused(String),
    /// The server ended the namespace or the engine session.
    Closed,
    /// Pongs, noops, acks, and packets for other namespaces.
    Ignored,
}

impl WireFormat {
    /// The URL to open for a configured socket URL.
    ///
    /// A Socket.IO URL that already names a path with a query string is
    /// used as is.
    pub fn endpoint(self, url: &str) -> String {
        match self {
            Self::SocketIo if !url.contains('?') => {
                format!("{}{SOCKET_IO_PATH}", url.trim_end_matches('/'))
            }
            _ => url.to_string(),
        }
    }

    /// Whether the client must wait for a connect ack before the session
    /// counts as established.
    pub fn has_handshake(self) -> bool {
        matches!(self, Self::SocketIo)
    }

    /// The message carrying the API key.
    ///
    /// # Errors
    /// `ProtocolError::Encode` if serialization fails.
    pub fn auth(self, api_key: &str) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::SocketIo => {
                let payload = serde_json::to_string(&json!({ "apiKey": api_key }))
                    .map_err(ProtocolError::Encode)?;
                Ok(format!("40{payload}").into_bytes())
            }
            Self::JsonFrames => JsonCodec.encode(&OutboundEvent::Auth {
                api_key: api_key.to_string(),
            }),
        }
    }

    /// Encodes an outbound event.
    ///
    /// # Errors
    /// `ProtocolError::Encode` if serialization fails.
    pub fn event(self, event: &OutboundEvent) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::SocketIo => {
                let value = serde_json::to_value(event).map_err(ProtocolError::Encode)?;
                let packet = json!([value["event"], value["data"]]);
                let body = serde_json::to_string(&packet).map_err(ProtocolError::Encode)?;
                Ok(format!("42{body}").into_bytes())
            }
            Self::JsonFrames => JsonCodec.encode(event),
        }
    }

    /// Reply to an [`Incoming::Ping`].
    pub fn pong(self) -> Option<&'static [u8]> {
        match self {
            Self::SocketIo => Some(b"3"),
            Self::JsonFrames => None,
        }
    }

    /// Sent before closing so the server drops the namespace right away.
    pub fn goodbye(self) -> Option<&'static [u8]> {
        match self {
            Self::SocketIo => Some(b"41"),
            Self::JsonFrames => None,
        }
    }

    /// Decodes one inbound message.
    ///
    /// # Errors
    /// - `ProtocolError::Decode`: the JSON body is malformed
    /// - `ProtocolError::Malformed`: the packet does not follow the framing
    pub fn decode(self, data: &[u8]) -> Result<Incoming, ProtocolError> {
        match self {
            Self::SocketIo => decode_packet(data),
            Self::JsonFrames => JsonCodec.decode(data).map(Incoming::Event),
        }
    }
}

fn decode_packet(data: &[u8]) -> Result<Incoming, ProtocolError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| ProtocolError::Malformed("packet is not UTF-8".to_string()))?;
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => Ok(Incoming::Open),
        Some('1') => Ok(Incoming::Closed),
        Some('2') => Ok(Incoming::Ping),
        Some('3' | '5' | '6') => Ok(Incoming::Ignored),
        Some('4') => decode_message(chars.as_str()),
        Some(other) => Err(ProtocolError::Malformed(format!(
            "unknown engine packet type '{other}'"
        ))),
        None => Err(ProtocolError::Malformed("empty packet".to_string())),
    }
}

/// Decodes the Socket.IO packet inside an Engine.IO message.
fn decode_message(body: &str) -> Result<Incoming, ProtocolError> {
    let mut chars = body.chars();
    let Some(kind) = chars.next() else {
        return Err(ProtocolError::Malformed("empty message packet".to_string()));
    };
    let rest = chars.as_str();
    // Only the default namespace is joined.
    if rest.starts_with('/') {
        return Ok(Incoming::Ignored);
    }

    match kind {
        '0' => Ok(Incoming::Connected),
        '1' => Ok(Incoming::Closed),
        '2' => decode_event(rest),
        '4' => Ok(Incoming::Refused(refusal_reason(rest))),
        '3' | '5' | '6' => Ok(Incoming::Ignored),
        other => Err(ProtocolError::Malformed(format!(
            "unknown socket packet type '{other}'"
        ))),
    }
}

fn decode_event(body: &str) -> Result<Incoming, ProtocolError> {
    // Skip the ack id, if any.
    let json = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(json).map_err(ProtocolError::Decode)?;
    let mut args = args.into_iter();
    let Some(Value::String(event)) = args.next() else {
        return Err(ProtocolError::Malformed(
            "event packet without a name".to_string(),
        ));
    };
    Ok(Incoming::Event(Frame {
        event,
        data: args.next().unwrap_or(Value::Null),
    }))
}

fn refusal_reason(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => Value::Object(map).to_string(),
        },
        Ok(Value::String(message)) => message,
        _ if body.is_empty() => "connection refused".to_string(),
        _ => body.to_string(),
    }
}
