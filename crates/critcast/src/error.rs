//! Unified error type for the CritCast client.

use std::time::Duration;

use critcast_dice::DiceError;
use critcast_protocol::ProtocolError;
use critcast_session::SessionError;
use critcast_transport::TransportError;

use crate::IngestError;

/// Top-level error that wraps all crate-specific errors.
///
/// Every variant is recoverable: the session can always be retried with
/// [`ClientHandle::connect`](crate::ClientHandle::connect).
#[derive(Debug, thiserror::Error)]
pub enum CritcastError {
    /// The connection could not be opened or was lost.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The roll notation yielded no usable term.
    #[error(transparent)]
    Dice(#[from] DiceError),

    /// Missing credentials, or a connect while already active.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The ingest endpoint rejected or never answered a roll.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The server refused the Socket.IO connect, usually a bad API key.
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("{0} is required")]
    MissingRollField(&'static str),

    #[error("not connected to a table")]
    NotConnected,

    /// The connection attempt was cancelled by `disconnect()`.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The client actor has stopped.
    #[error("client is shut down")]
    ClientClosed,
}

impl CritcastError {
    /// `true` for errors caused by bad user input rather than the network.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Dice(_)
                | Self::MissingRollField(_)
                | Self::Session(SessionError::MissingCredentials(_))
        )
    }
}
