//! Inbound event routing.
//!
//! Peers describe rolls in several shapes (`roll:new`, `roll`, `message`
//! envelopes, proxy `roll_result`, batched history). [`route`] folds all of
//! them into one [`FeedAction`] plus an optional user-facing [`Notice`].

use chrono::Utc;
use critcast_protocol::{
    DieResult, ForwardedRoll, InboundEvent, ModifierResult, RollContext, RollId, RollRecord,
    RollSource, SourceKind, TableMessage,
};
use critcast_session::SessionState;
use tracing::debug;

use crate::{BatchOrder, RollFeed};

/// Label attached to rolls relayed by the proxy server.
pub const PROXY_SOURCE_LABEL: &str = "CritCast Proxy Server";
/// Roll type recorded on proxy-forwarded rolls.
pub const FORWARDED_ROLL_TYPE: &str = "forwarded";
/// Character recorded when a forwarded roll names no player.
pub const UNKNOWN_PLAYER: &str = "Unknown Player";

/// The canonical feed mutation an inbound event maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAction {
    None,
    Prepend(RollRecord),
    PrependBatch {
        records: Vec<RollRecord>,
        order: BatchOrder,
    },
}

impl FeedAction {
    /// Applies the action, returning how many records were inserted.
    pub fn apply(self, feed: &mut RollFeed) -> usize {
        match self {
            Self::None => 0,
            Self::Prepend(record) => {
                feed.prepend(record);
                1
            }
            Self::PrependBatch { records, order } => feed.prepend_batch(records, order),
        }
    }

    /// Drops records whose id `feed` already holds.
    ///
    /// The server echoes locally submitted rolls back as `roll:new`, and a
    /// resubscribe replays history that may already be shown.
    pub fn without_known(self, feed: &RollFeed) -> Self {
        match self {
            Self::Prepend(record) if feed.contains(&record.id) => {
                debug!(roll_id = %record.id, "known roll skipped");
                Self::None
            }
            Self::PrependBatch { mut records, order } => {
                records.retain(|record| !feed.contains(&record.id));
                if records.is_empty() {
                    Self::None
                } else {
                    Self::PrependBatch { records, order }
                }
            }
            other => other,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Self::Info(message) | Self::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Outcome of routing one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub action: FeedAction,
    pub notice: Option<Notice>,
}

impl Routed {
    fn ignored() -> Self {
        Self {
            action: FeedAction::None,
            notice: None,
        }
    }

    fn action(action: FeedAction) -> Self {
        Self {
            action,
            notice: None,
        }
    }

    fn info(message: impl Into<String>) -> Self {
        Self {
            action: FeedAction::None,
            notice: Some(Notice::Info(message.into())),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            action: FeedAction::None,
            notice: Some(Notice::Error(message.into())),
        }
    }
}

/// Maps an inbound event to a feed action.
///
/// Inert unless the session is connected: events that arrive while
/// connecting, after a disconnect, or after a failure are ignored.
pub fn route(state: &SessionState, event: InboundEvent) -> Routed {
    if !state.is_connected() {
        debug!(event = event.name(), %state, "event ignored while not connected");
        return Routed::ignored();
    }

    match event {
        InboundEvent::TableSubscribed(subscribed) => {
            let table = subscribed
                .table_id
                .or_else(|| state.table_id().cloned())
                .map(|id| id.to_string())
                .unwrap_or_default();
            Routed::info(format!("subscribed to table {table}"))
        }
        InboundEvent::TableHistory(history) => {
            debug!(count = history.rolls.len(), "history received");
            Routed::action(FeedAction::PrependBatch {
                records: history.rolls,
                order: BatchOrder::OldestFirst,
            })
        }
        InboundEvent::NewRoll(record) | InboundEvent::Roll(record) => {
            Routed::action(FeedAction::Prepend(record))
        }
        InboundEvent::Message(message) => route_message(message),
        InboundEvent::SocketError { message } => Routed::error(message),
        InboundEvent::ProxyConnected { server } => match server {
            Some(server) => Routed::info(format!("connected to {server}")),
            None => Routed::info("connected to proxy"),
        },
        InboundEvent::RollForwarded { success: true } => Routed::info("roll forwarded"),
        InboundEvent::RollForwarded { success: false } => Routed::ignored(),
        InboundEvent::RollError { message } => Routed::error(format!(
            "roll forwarding failed: {}",
            message.as_deref().unwrap_or("unknown error")
        )),
        InboundEvent::RollResult(forwarded) => {
            Routed::action(FeedAction::Prepend(forwarded_record(forwarded)))
        }
        InboundEvent::Unknown { event } => {
            debug!(%event, "unrouted event");
            Routed::ignored()
        }
    }
}

fn route_message(message: TableMessage) -> Routed {
    match message {
        TableMessage::Roll { roll } => Routed::action(FeedAction::Prepend(roll)),
        TableMessage::Subscribed {
            table_id,
            recent_rolls,
        } => {
            let table = table_id.map(|id| id.to_string()).unwrap_or_default();
            let notice = if recent_rolls.is_empty() {
                format!("subscribed to table {table}")
            } else {
                format!(
                    "subscribed to table {table}, loaded {} recent rolls",
                    recent_rolls.len()
                )
            };
            Routed {
                action: FeedAction::PrependBatch {
                    records: recent_rolls,
                    order: BatchOrder::OldestFirst,
                },
                notice: Some(Notice::Info(notice)),
            }
        }
        TableMessage::Error { message } => Routed::error(message),
        TableMessage::Other => Routed::ignored(),
    }
}

/// Builds a feed record for a roll relayed by the proxy.
///
/// The proxy only reports raw values, so every die has unknown sides and
/// the flat bonus becomes a single modifier.
pub fn forwarded_record(forwarded: ForwardedRoll) -> RollRecord {
    RollRecord {
        id: RollId::generate(),
        notation: forwarded.notation,
        dice: forwarded.rolls.into_iter().map(DieResult::unknown_sides).collect(),
        modifiers: vec![ModifierResult::from_signed(forwarded.modifier)],
        total: forwarded.total,
        context: RollContext {
            roll_type: Some(FORWARDED_ROLL_TYPE.to_string()),
            character: Some(
                forwarded
                    .player
                    .unwrap_or_else(|| UNKNOWN_PLAYER.to_string()),
            ),
            ..RollContext::default()
        },
        source: RollSource {
            kind: SourceKind::Proxy,
            label: Some(PROXY_SOURCE_LABEL.to_string()),
            version: None,
        },
        timestamp: forwarded.timestamp.unwrap_or_else(Utc::now),
    }
}
