//! Codec trait and the JSON implementation.
//!
//! The protocol layer does not care how frames become bytes; it only needs
//! something implementing [`Codec`]. [`JsonCodec`] writes the plain JSON
//! frames, and [`WireFormat`](crate::WireFormat) builds Socket.IO packets
//! on top of it.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Frame, InboundEvent, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes a raw frame and classifies it.
    ///
    /// Returns the frame alongside the event so callers can keep the raw
    /// payload for diagnostics.
    fn decode_event(&self, data: &[u8]) -> Result<(Frame, InboundEvent), ProtocolError> {
        let frame: Frame = self.decode(data)?;
        let event = InboundEvent::from_frame(frame.clone())?;
        Ok((frame, event))
    }
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use critcast_protocol::{Codec, InboundEvent, JsonCodec, OutboundEvent, TableId};
///
/// let codec = JsonCodec;
///
/// let bytes = codec
///     .encode(&OutboundEvent::SubscribeTable { table_id: TableId::from("t-1") })
///     .unwrap();
/// assert!(String::from_utf8(bytes).unwrap().contains("subscribe:table"));
///
/// let (_, event) = codec
///     .decode_event(br#"{"event":"table:subscribed","data":{"tableId":"t-1"}}"#)
///     .unwrap();
/// assert!(matches!(event, InboundEvent::TableSubscribed(_)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
