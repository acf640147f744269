//! # CritCast
//!
//! Realtime dice-roll table client.
//!
//! A [`TableClient`] joins a shared rolling table over a persistent
//! connection, keeps a bounded newest-first feed of the rolls everyone at
//! the table makes, and lets the user author rolls from dice notation
//! (`2d6+3`, `1d4+1d6+2`, `-1d20`), submitting them over REST.
//!
//! ```text
//! ClientHandle ──commands──▶ client actor ──events──▶ UI
//!                              │   ▲
//!          Socket.IO packets ──┘   └── REST ingest
//! ```
//!
//! The layers live in their own crates and are re-exported here:
//! transport, protocol, dice, session, feed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use critcast::prelude::*;
//!
//! # async fn demo() -> Result<(), CritcastError> {
//! critcast::init_logging();
//! let client = TableClient::builder().build()?;
//! let handle = client.handle();
//!
//! handle.connect(Credentials::new("api-key", "table-1")).await?;
//! let roll = handle
//!     .submit_roll(RollRequest::new("1d20+5", "Vex", "attack"))
//!     .await?;
//! println!("{roll}");
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod config;
mod error;
mod ingest;
mod logging;
mod request;

pub use builder::ClientBuilder;
pub use client::{ClientEvent, ClientHandle, ClientSnapshot, EventReceiver, TableClient};
pub use config::{ClientConfig, DEFAULT_APP_NAME, DEFAULT_SERVER_URL, DEFAULT_SOCKET_URL};
pub use error::CritcastError;
pub use ingest::{API_KEY_HEADER, HttpIngest, IngestError, RollIngest};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use request::RollRequest;

pub use critcast_dice as dice;
pub use critcast_feed as feed;
pub use critcast_protocol as protocol;
pub use critcast_session as session;
pub use critcast_transport as transport;

/// Common imports for applications using the client.
pub mod prelude {
    pub use crate::{
        ClientBuilder, ClientConfig, ClientEvent, ClientHandle, ClientSnapshot, CritcastError,
        RollRequest, TableClient,
    };
    pub use critcast_feed::Notice;
    pub use critcast_protocol::{RollRecord, TableId, WireFormat};
    pub use critcast_session::{Credentials, SessionState};
}
