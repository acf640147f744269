//! The session state machine: the single owner of [`SessionState`].
//!
//! The machine is plain data. It performs no I/O; the caller (the client
//! actor) opens and closes the transport and feeds the outcome back in as
//! events tagged with the [`AttemptId`] they belong to.
//!
//! # Connect timeout
//!
//! Entering `Connecting` arms a deadline owned by the machine. Leaving
//! `Connecting` by any transition disarms it. The caller waits on
//! [`SessionStateMachine::wait_for_timeout`] inside its `tokio::select!`
//! loop, the same way it would wait on any other event source:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* connect, disconnect, ... */ }
//!         attempt = machine.wait_for_timeout() => {
//!             machine.timed_out(attempt)?;
//!             // abort the transport attempt
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use critcast_protocol::TableId;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::{AttemptId, Credentials, SessionError, SessionState};

/// Default time a connection attempt may take before it fails.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Armed deadline for the in-flight attempt.
#[derive(Debug, Clone, Copy)]
struct ConnectDeadline {
    attempt: AttemptId,
    at: Instant,
}

/// Owns the session lifecycle.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    attempt: AttemptId,
    credentials: Option<Credentials>,
    deadline: Option<ConnectDeadline>,
    connect_timeout: Duration,
}

impl SessionStateMachine {
    /// Creates an idle machine with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            attempt: AttemptId::default(),
            credentials: None,
            deadline: None,
            connect_timeout,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The most recent attempt. Meaningful once `connect` has succeeded.
    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Credentials of the most recent attempt.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// `true` when the session is connected on `attempt`.
    ///
    /// Used to decide whether a late result (for example an ingest
    /// response) still belongs to the live session.
    pub fn is_live(&self, attempt: AttemptId) -> bool {
        self.attempt == attempt && self.state.is_connected()
    }

    /// `true` while the connect deadline is armed.
    pub fn has_pending_timeout(&self) -> bool {
        self.deadline.is_some()
    }

    // -----------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------

    /// `Idle | Disconnected | Failed --connect--> Connecting`.
    ///
    /// Starts a new attempt and arms its deadline.
    ///
    /// # Errors
    /// - [`SessionError::MissingCredentials`]: a field is empty; state unchanged.
    /// - [`SessionError::AlreadyActive`]: already connecting or connected.
    pub fn connect(&mut self, credentials: Credentials) -> Result<AttemptId, SessionError> {
        credentials.validate()?;
        if self.state.is_active() {
            return Err(SessionError::AlreadyActive(self.state.to_string()));
        }

        self.attempt = self.attempt.next();
        self.credentials = Some(credentials);
        self.state = SessionState::Connecting;
        self.deadline = Some(ConnectDeadline {
            attempt: self.attempt,
            at: Instant::now() + self.connect_timeout,
        });

        info!(attempt = %self.attempt, timeout = ?self.connect_timeout, "connecting");
        Ok(self.attempt)
    }

    /// `Connecting --transport-connected--> Connected(table)`.
    ///
    /// Returns the table the caller must now subscribe to.
    ///
    /// # Errors
    /// [`SessionError::StaleAttempt`] if `attempt` is not the in-flight
    /// attempt, including one that has already timed out.
    pub fn transport_connected(&mut self, attempt: AttemptId) -> Result<TableId, SessionError> {
        self.ensure_connecting(attempt)?;
        let table_id = self
            .credentials
            .as_ref()
            .map(|c| c.table_id().clone())
            .ok_or_else(|| self.invalid("transport-connected"))?;

        self.deadline = None;
        self.state = SessionState::Connected(table_id.clone());
        info!(%attempt, %table_id, "connected");
        Ok(table_id)
    }

    /// `Connecting --transport-error--> Failed(reason)`.
    pub fn transport_failed(
        &mut self,
        attempt: AttemptId,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_connecting(attempt)?;
        let reason = reason.into();
        warn!(%attempt, %reason, "connection attempt failed");
        self.deadline = None;
        self.state = SessionState::Failed(reason);
        Ok(())
    }

    /// `Connecting --timeout--> Failed("timeout")`.
    ///
    /// The caller must abort the transport attempt.
    pub fn timed_out(&mut self, attempt: AttemptId) -> Result<(), SessionError> {
        self.ensure_connecting(attempt)?;
        warn!(%attempt, timeout = ?self.connect_timeout, "connection attempt timed out");
        self.deadline = None;
        self.state = SessionState::Failed(SessionState::TIMEOUT_REASON.to_string());
        Ok(())
    }

    /// `Connected --transport-disconnected--> Disconnected`.
    pub fn transport_disconnected(&mut self, attempt: AttemptId) -> Result<(), SessionError> {
        if attempt != self.attempt {
            return Err(SessionError::StaleAttempt(attempt));
        }
        if !self.state.is_connected() {
            return Err(self.invalid("transport-disconnected"));
        }
        info!(%attempt, "transport disconnected");
        self.state = SessionState::Disconnected;
        Ok(())
    }

    /// `Connected | Connecting --disconnect--> Disconnected`.
    ///
    /// Explicit, user-requested. Disarms the deadline when called during
    /// an attempt. Returns `true` if the state changed; the caller closes
    /// the transport in that case.
    pub fn disconnect(&mut self) -> bool {
        if !self.state.is_active() {
            debug!(state = %self.state, "disconnect ignored");
            return false;
        }
        info!(attempt = %self.attempt, from = %self.state, "disconnecting");
        self.deadline = None;
        self.state = SessionState::Disconnected;
        true
    }

    // -----------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------

    /// Resolves when the armed connect deadline passes, yielding the
    /// attempt it belongs to. Pends forever while no deadline is armed.
    ///
    /// Cancel-safe: dropping the future leaves the deadline armed.
    pub async fn wait_for_timeout(&self) -> AttemptId {
        match self.deadline {
            Some(deadline) => {
                time::sleep_until(deadline.at).await;
                deadline.attempt
            }
            None => std::future::pending().await,
        }
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn ensure_connecting(&self, attempt: AttemptId) -> Result<(), SessionError> {
        if attempt != self.attempt {
            return Err(SessionError::StaleAttempt(attempt));
        }
        if !matches!(self.state, SessionState::Connecting) {
            // The attempt is current but already resolved (timed out,
            // failed, or disconnected): treat it as stale.
            return Err(SessionError::StaleAttempt(attempt));
        }
        Ok(())
    }

    fn invalid(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.to_string(),
            event,
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

// =========================================================================
// Tests
// =========================================================================
