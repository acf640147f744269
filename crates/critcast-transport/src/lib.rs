//! Transport abstraction layer for CritCast.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the persistent connection a client keeps open to a rolling table.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound connections to a remote endpoint.
///
/// The returned futures are `Send` so a connection attempt can run on its
/// own task and be aborted when the attempt times out.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection to `url`.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// Sends data to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Must be
    /// cancel-safe: dropping the future before it resolves loses no data.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
