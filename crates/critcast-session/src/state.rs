//! Session states and attempt numbering.

use std::fmt;

use critcast_protocol::TableId;

// ---------------------------------------------------------------------------
// AttemptId
// ---------------------------------------------------------------------------

/// Sequence number of a connection attempt.
///
/// Every `connect()` starts a new attempt. Transport events and timeouts
/// carry the attempt they belong to, so anything reported for an older
/// attempt can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AttemptId(pub u64);

impl AttemptId {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the table session.
///
/// ```text
///            connect            transport-connected
///   Idle ─────────────▶ Connecting ─────────────────▶ Connected(table)
///                         │   │                          │
///               timeout   │   │ transport-error          │ disconnect /
///                         ▼   ▼                          ▼ transport-disconnected
///                    Failed(reason)                 Disconnected
///                         │                              │
///                         └──────── connect ─────────────┴──▶ Connecting
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected(TableId),
    Disconnected,
    Failed(String),
}

impl SessionState {
    /// Reason recorded when the connect deadline passes.
    pub const TIMEOUT_REASON: &'static str = "timeout";

    /// `true` while an attempt is in flight or established.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// The subscribed table, when connected.
    pub fn table_id(&self) -> Option<&TableId> {
        match self {
            Self::Connected(table_id) => Some(table_id),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected(table_id) => write!(f, "connected to {table_id}"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
