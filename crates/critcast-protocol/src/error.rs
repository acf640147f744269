//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding table traffic.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON or a frame without an
    /// `event` name.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The event name is known but its payload has the wrong shape.
    #[error("invalid payload for event {event}: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// A Socket.IO packet that does not follow the framing.
    #[error("malformed packet: {0}")]
    Malformed(String),
}
