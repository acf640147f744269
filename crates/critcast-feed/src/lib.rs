//! Roll feed and inbound event routing for CritCast.
//!
//! - [`RollFeed`]: bounded, newest-first store of roll records
//! - [`route`]: maps an [`InboundEvent`](critcast_protocol::InboundEvent)
//!   to a [`FeedAction`] and an optional [`Notice`]
//! - [`LastMessage`]: the most recent raw frame, for display
//!
//! Routing is pure. The client actor owns the feed, filters out rolls it
//! already shows, and applies the returned action:
//!
//! ```
//! use critcast_feed::{route, RollFeed};
//! use critcast_protocol::{InboundEvent, TableId};
//! use critcast_session::SessionState;
//!
//! let state = SessionState::Connected(TableId::from("table-1"));
//! let mut feed = RollFeed::default();
//!
//! let routed = route(&state, InboundEvent::Unknown { event: "presence".into() });
//! routed.action.without_known(&feed).apply(&mut feed);
//! assert!(feed.is_empty());
//! ```

mod feed;
mod last_message;
mod router;

pub use feed::{BatchOrder, DEFAULT_FEED_CAPACITY, RollFeed};
pub use last_message::LastMessage;
pub use router::{
    FORWARDED_ROLL_TYPE, FeedAction, Notice, PROXY_SOURCE_LABEL, Routed, UNKNOWN_PLAYER,
    forwarded_record, route,
};
