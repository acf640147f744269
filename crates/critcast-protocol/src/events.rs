//! Table events: the frames exchanged over the persistent connection.
//!
//! Every frame is an event name with a JSON payload, written as
//! `{"event": "<name>", "data": <payload>}` (see [`WireFormat`](crate::WireFormat)
//! for how that is packed into Socket.IO packets). Outbound frames are produced by serializing [`OutboundEvent`]; inbound
//! frames are read as a [`Frame`] first and then classified into the
//! closed set of [`InboundEvent`] variants by [`InboundEvent::from_frame`].
//!
//! ```text
//! client ──auth──────────────▶ server
//! client ──subscribe:table───▶ server
//! client ◀──table:subscribed── server
//! client ◀──table:history───── server   (oldest first)
//! client ◀──roll:new────────── server   (repeats)
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{ProtocolError, RollRecord, TableId};

// ---------------------------------------------------------------------------
// Wire event names
// ---------------------------------------------------------------------------

pub const EVENT_AUTH: &str = "auth";
pub const EVENT_SUBSCRIBE_TABLE: &str = "subscribe:table";
pub const EVENT_TABLE_SUBSCRIBED: &str = "table:subscribed";
pub const EVENT_TABLE_HISTORY: &str = "table:history";
pub const EVENT_ROLL_NEW: &str = "roll:new";
pub const EVENT_ROLL: &str = "roll";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_PROXY_CONNECTED: &str = "connected";
pub const EVENT_ROLL_FORWARDED: &str = "roll_forwarded";
pub const EVENT_ROLL_ERROR: &str = "roll_error";
pub const EVENT_ROLL_RESULT: &str = "roll_result";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A raw inbound frame before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// First frame on a new connection.
    #[serde(rename = "auth", rename_all = "camelCase")]
    Auth { api_key: String },

    /// Sent right after the connection counts as established.
    #[serde(rename = "subscribe:table", rename_all = "camelCase")]
    SubscribeTable { table_id: TableId },
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Payload of `table:subscribed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscribed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<TableId>,
}

/// Payload of `table:history`: recent rolls, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<TableId>,
    #[serde(default, deserialize_with = "lenient_rolls")]
    pub rolls: Vec<RollRecord>,
}

/// The generic `message` envelope, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TableMessage {
    /// A single roll wrapped in the envelope.
    Roll { roll: RollRecord },

    /// Subscription confirmation carrying recent rolls, each one prepended
    /// in the order given.
    #[serde(rename_all = "camelCase")]
    Subscribed {
        #[serde(default)]
        table_id: Option<TableId>,
        #[serde(default, deserialize_with = "lenient_rolls")]
        recent_rolls: Vec<RollRecord>,
    },

    /// The server rejected something.
    Error {
        #[serde(default)]
        message: String,
    },

    /// Any other `type`. Ignored by the router.
    #[serde(other)]
    Other,
}

/// Payload of `roll_result`: a roll forwarded by the proxy server.
///
/// Only raw die values are present; die sizes are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedRoll {
    #[serde(default)]
    pub notation: String,
    #[serde(default)]
    pub rolls: Vec<i64>,
    #[serde(default)]
    pub modifier: i64,
    #[serde(rename = "result")]
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Every inbound event shape the client understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `table:subscribed`
    TableSubscribed(Subscribed),
    /// `table:history`
    TableHistory(History),
    /// `roll:new`
    NewRoll(RollRecord),
    /// `roll`: a bare roll, equivalent to `message{type:"roll"}`
    Roll(RollRecord),
    /// `message`
    Message(TableMessage),
    /// `error`: a socket-level error, payload may be a string or an object
    SocketError { message: String },
    /// `connected`: proxy greeting
    ProxyConnected { server: Option<String> },
    /// `roll_forwarded`: the proxy relayed a roll to the API
    RollForwarded { success: bool },
    /// `roll_error`: the proxy failed to relay a roll
    RollError { message: Option<String> },
    /// `roll_result`
    RollResult(ForwardedRoll),
    /// Anything else; kept for diagnostics only.
    Unknown { event: String },
}

impl InboundEvent {
    /// Classifies a raw frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidPayload`] when the event name is
    /// known but its payload has the wrong shape. Unknown event names are
    /// not an error; they become [`InboundEvent::Unknown`].
    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let Frame { event, data } = frame;
        let parsed = match event.as_str() {
            EVENT_TABLE_SUBSCRIBED => Self::TableSubscribed(payload(&event, data)?),
            EVENT_TABLE_HISTORY => Self::TableHistory(payload(&event, data)?),
            EVENT_ROLL_NEW => Self::NewRoll(payload(&event, data)?),
            EVENT_ROLL => Self::Roll(payload(&event, data)?),
            EVENT_MESSAGE => Self::Message(payload(&event, data)?),
            EVENT_ERROR => Self::SocketError {
                message: error_text(&data).unwrap_or_else(|| data.to_string()),
            },
            EVENT_PROXY_CONNECTED => Self::ProxyConnected {
                server: data.get("server").and_then(Value::as_str).map(str::to_string),
            },
            EVENT_ROLL_FORWARDED => Self::RollForwarded {
                success: data.get("success").and_then(Value::as_bool).unwrap_or(false),
            },
            EVENT_ROLL_ERROR => Self::RollError {
                message: error_text(&data),
            },
            EVENT_ROLL_RESULT => Self::RollResult(payload(&event, data)?),
            _ => Self::Unknown { event },
        };
        Ok(parsed)
    }

    /// The wire name this event arrived under.
    pub fn name(&self) -> &str {
        match self {
            Self::TableSubscribed(_) => EVENT_TABLE_SUBSCRIBED,
            Self::TableHistory(_) => EVENT_TABLE_HISTORY,
            Self::NewRoll(_) => EVENT_ROLL_NEW,
            Self::Roll(_) => EVENT_ROLL,
            Self::Message(_) => EVENT_MESSAGE,
            Self::SocketError { .. } => EVENT_ERROR,
            Self::ProxyConnected { .. } => EVENT_PROXY_CONNECTED,
            Self::RollForwarded { .. } => EVENT_ROLL_FORWARDED,
            Self::RollError { .. } => EVENT_ROLL_ERROR,
            Self::RollResult(_) => EVENT_ROLL_RESULT,
            Self::Unknown { event } => event,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

/// Decodes a roll list element by element. A malformed roll is logged and
/// dropped; the rest of the list survives.
fn lenient_rolls<'de, D>(deserializer: D) -> Result<Vec<RollRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let rolls = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(roll) => Some(roll),
            Err(error) => {
                warn!(index, %error, "dropping malformed roll from list");
                None
            }
        })
        .collect();
    Ok(rolls)
}

/// Extracts a human-readable message from a string or `{message}` payload.
fn error_text(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

// =========================================================================
// Tests
// =========================================================================
