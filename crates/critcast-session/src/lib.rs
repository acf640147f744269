//! Table session lifecycle for CritCast.
//!
//! - **Credentials** ([`Credentials`]): API key and table id, validated
//!   before any connection attempt.
//! - **State machine** ([`SessionStateMachine`]): the only place
//!   [`SessionState`] changes, including the cancellable connect timeout.
//!
//! ```text
//! Client actor (above)  ← drives transitions from transport events
//!     ↕
//! Session layer (this crate)  ← decides what each event means
//!     ↕
//! Protocol layer (below)  ← provides TableId
//! ```

mod credentials;
mod error;
mod machine;
mod state;

pub use credentials::Credentials;
pub use error::SessionError;
pub use machine::{DEFAULT_CONNECT_TIMEOUT, SessionStateMachine};
pub use state::{AttemptId, SessionState};
