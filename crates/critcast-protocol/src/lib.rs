//! Wire protocol for CritCast.
//!
//! - **Types** ([`RollRecord`], [`DieResult`], [`ModifierResult`], …): the
//!   roll data carried by table events and the ingest endpoint.
//! - **Events** ([`InboundEvent`], [`OutboundEvent`], [`Frame`]): what
//!   travels over the persistent connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Wire** ([`WireFormat`], [`Incoming`]): Socket.IO packet framing
//!   around those frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (InboundEvent) → Feed (RollRecord)
//! ```

mod codec;
mod error;
mod events;
mod types;
mod wire;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use events::{
    EVENT_AUTH, EVENT_ERROR, EVENT_MESSAGE, EVENT_PROXY_CONNECTED, EVENT_ROLL,
    EVENT_ROLL_ERROR, EVENT_ROLL_FORWARDED, EVENT_ROLL_NEW, EVENT_ROLL_RESULT,
    EVENT_SUBSCRIBE_TABLE, EVENT_TABLE_HISTORY, EVENT_TABLE_SUBSCRIBED, ForwardedRoll, Frame,
    History, InboundEvent, OutboundEvent, Subscribed, TableMessage,
};
pub use types::{
    DieKind, DieResult, IngestReceipt, ModifierKind, ModifierResult, NewRoll, RollContext,
    RollId, RollRecord, RollSource, SourceKind, TableId,
};
pub use wire::{Incoming, SOCKET_IO_PATH, WireFormat};
