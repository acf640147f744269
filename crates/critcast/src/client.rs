//! The table client actor.
//!
//! One Tokio task owns every piece of mutable client state: the session
//! state machine, the roll feed, and the last-message slot. The outside
//! world talks to it through a [`ClientHandle`] (commands over an mpsc
//! channel, replies over oneshot channels) and listens to it through
//! [`ClientEvent`]s.
//!
//! The actor never awaits I/O itself. Opening the connection, reading
//! frames, and submitting rolls all run on spawned tasks that report back
//! into the actor's internal mailbox, tagged with the [`AttemptId`] they
//! belong to. The connect timeout is a deadline polled in the same
//! `select!` loop, so it also covers the Socket.IO handshake.
//!
//! Events go out over a bounded channel. When the UI falls that far
//! behind, further events are dropped with a warning; the snapshot stays
//! authoritative.

use std::sync::Arc;

use critcast_feed::{LastMessage, Notice, RollFeed, route};
use critcast_protocol::{
    Frame, InboundEvent, Incoming, IngestReceipt, NewRoll, OutboundEvent, RollRecord, TableId,
    WireFormat,
};
use critcast_session::{AttemptId, Credentials, SessionState, SessionStateMachine};
use critcast_transport::{Connection, Connector, TransportError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ClientConfig, CritcastError, IngestError, RollIngest, RollRequest};

/// Shown when the connect deadline passes.
const TIMEOUT_NOTICE: &str = "Connection timeout - check your server URL and try again";

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The session moved to a new state.
    StatusChanged(SessionState),
    /// An informational or error message for the user.
    Notice(Notice),
    /// The feed changed; `len` is its new size.
    FeedUpdated { len: usize },
    /// A raw frame arrived and replaced the last-message slot.
    MessageReceived(Frame),
}

/// Receiving end of the client's event stream.
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

/// Point-in-time copy of the client state.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub state: SessionState,
    /// Newest first.
    pub feed: Vec<RollRecord>,
    pub last_message: LastMessage,
}

/// Commands sent to the client actor.
enum ClientCommand {
    Connect {
        credentials: Credentials,
        reply: oneshot::Sender<Result<TableId, CritcastError>>,
    },
    Disconnect {
        reply: oneshot::Sender<bool>,
    },
    SubmitRoll {
        request: RollRequest,
        reply: oneshot::Sender<Result<RollRecord, CritcastError>>,
    },
    ClearFeed {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<ClientSnapshot>,
    },
    Shutdown,
}

/// Handle to a running client actor.
///
/// Cheap to clone. Every method fails with
/// [`CritcastError::ClientClosed`] once the actor has stopped.
#[derive(Clone)]
pub struct ClientHandle {
    sender: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    /// Connects to the table and waits for the outcome.
    ///
    /// Resolves once the session is connected (returning the subscribed
    /// table), has failed, or the connect timeout has passed.
    ///
    /// # Errors
    /// - [`CritcastError::Session`]: missing credentials or already active
    /// - [`CritcastError::ConnectionTimeout`]: the deadline passed first
    /// - [`CritcastError::Transport`] / [`CritcastError::Protocol`]: the
    ///   connection or the auth frame failed
    /// - [`CritcastError::Refused`]: the server rejected the API key
    /// - [`CritcastError::Cancelled`]: `disconnect()` was called meanwhile
    pub async fn connect(&self, credentials: Credentials) -> Result<TableId, CritcastError> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Connect { credentials, reply }).await?;
        rx.await.map_err(|_| CritcastError::ClientClosed)?
    }

    /// Closes the session. Returns `false` if there was nothing to close.
    pub async fn disconnect(&self) -> Result<bool, CritcastError> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Disconnect { reply }).await?;
        rx.await.map_err(|_| CritcastError::ClientClosed)
    }

    /// Rolls the request's notation and submits the result.
    ///
    /// On success the stored record (carrying the server-assigned id) is
    /// returned and, if the session is still connected, added to the feed.
    ///
    /// # Errors
    /// - [`CritcastError::NotConnected`]
    /// - [`CritcastError::MissingRollField`]
    /// - [`CritcastError::Dice`]: nothing in the notation could be rolled
    /// - [`CritcastError::Ingest`]: the server did not accept the roll
    pub async fn submit_roll(&self, request: RollRequest) -> Result<RollRecord, CritcastError> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::SubmitRoll { request, reply }).await?;
        rx.await.map_err(|_| CritcastError::ClientClosed)?
    }

    /// Empties the feed and the last-message slot.
    pub async fn clear_feed(&self) -> Result<(), CritcastError> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::ClearFeed { reply }).await?;
        rx.await.map_err(|_| CritcastError::ClientClosed)
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, CritcastError> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| CritcastError::ClientClosed)
    }

    /// Stops the actor, closing any open connection.
    pub async fn shutdown(&self) -> Result<(), CritcastError> {
        self.send(ClientCommand::Shutdown).await
    }

    async fn send(&self, command: ClientCommand) -> Result<(), CritcastError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| CritcastError::ClientClosed)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Results reported back by spawned tasks.
enum Internal<T> {
    Connected {
        attempt: AttemptId,
        connection: T,
    },
    ConnectFailed {
        attempt: AttemptId,
        error: CritcastError,
    },
    Frame {
        attempt: AttemptId,
        frame: Frame,
    },
    Closed {
        attempt: AttemptId,
        reason: String,
    },
    Ingested {
        attempt: AttemptId,
        roll: NewRoll,
        result: Result<IngestReceipt, IngestError>,
        reply: oneshot::Sender<Result<RollRecord, CritcastError>>,
    },
}

type ConnectReply = oneshot::Sender<Result<TableId, CritcastError>>;

struct ClientActor<C: Connector, I: RollIngest> {
    config: ClientConfig,
    connector: Arc<C>,
    ingest: Arc<I>,
    wire: WireFormat,
    machine: SessionStateMachine,
    feed: RollFeed,
    last_message: LastMessage,
    connection: Option<Arc<C::Connection>>,
    connect_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    pending_connect: Option<(AttemptId, ConnectReply)>,
    commands: mpsc::Receiver<ClientCommand>,
    internal_tx: mpsc::UnboundedSender<Internal<C::Connection>>,
    internal_rx: mpsc::UnboundedReceiver<Internal<C::Connection>>,
    events: mpsc::Sender<ClientEvent>,
}

impl<C: Connector, I: RollIngest> ClientActor<C, I> {
    async fn run(mut self) {
        info!(socket_url = %self.config.socket_url, "client actor started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                attempt = self.machine.wait_for_timeout() => self.handle_timeout(attempt),
            }
        }

        self.teardown();
        info!("client actor stopped");
    }

    fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect { credentials, reply } => self.start_connect(credentials, reply),
            ClientCommand::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            ClientCommand::SubmitRoll { request, reply } => self.start_submission(request, reply),
            ClientCommand::ClearFeed { reply } => {
                self.feed.clear();
                self.last_message.clear();
                self.emit(ClientEvent::FeedUpdated { len: 0 });
                let _ = reply.send(());
            }
            ClientCommand::Snapshot { reply } => {
                let _ = reply.send(ClientSnapshot {
                    state: self.machine.state().clone(),
                    feed: self.feed.to_vec(),
                    last_message: self.last_message.clone(),
                });
            }
            // Handled by the run loop.
            ClientCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, internal: Internal<C::Connection>) {
        match internal {
            Internal::Connected {
                attempt,
                connection,
            } => self.on_connected(attempt, connection),
            Internal::ConnectFailed { attempt, error } => self.on_connect_failed(attempt, error),
            Internal::Frame { attempt, frame } => self.on_frame(attempt, frame),
            Internal::Closed { attempt, reason } => self.on_closed(attempt, &reason),
            Internal::Ingested {
                attempt,
                roll,
                result,
                reply,
            } => self.on_ingested(attempt, roll, result, reply),
        }
    }

    // -- connect ------------------------------------------------------------

    fn start_connect(&mut self, credentials: Credentials, reply: ConnectReply) {
        let api_key = credentials.api_key().to_string();
        let attempt = match self.machine.connect(credentials) {
            Ok(attempt) => attempt,
            Err(error) => {
                debug!(%error, "connect rejected");
                let _ = reply.send(Err(error.into()));
                return;
            }
        };
        self.emit_status();
        self.pending_connect = Some((attempt, reply));

        let connector = Arc::clone(&self.connector);
        let url = self.config.socket_url.clone();
        let tx = self.internal_tx.clone();
        let wire = self.wire;
        self.connect_task = Some(tokio::spawn(async move {
            let message = match open_connection(connector.as_ref(), &url, &api_key, wire).await {
                Ok(connection) => Internal::Connected {
                    attempt,
                    connection,
                },
                Err(error) => Internal::ConnectFailed { attempt, error },
            };
            let _ = tx.send(message);
        }));
    }

    fn on_connected(&mut self, attempt: AttemptId, connection: C::Connection) {
        let table_id = match self.machine.transport_connected(attempt) {
            Ok(table_id) => table_id,
            Err(error) => {
                warn!(%attempt, %error, "late connection discarded");
                spawn_close(Arc::new(connection), self.wire);
                return;
            }
        };
        self.connect_task = None;

        let connection = Arc::new(connection);
        self.reader_task = Some(spawn_reader(
            Arc::clone(&connection),
            attempt,
            self.wire,
            self.internal_tx.clone(),
        ));
        self.send_frame(
            &connection,
            &OutboundEvent::SubscribeTable {
                table_id: table_id.clone(),
            },
        );
        self.connection = Some(connection);

        self.emit_status();
        self.emit(ClientEvent::Notice(Notice::Info(
            "Connected successfully! Subscribing to table...".to_string(),
        )));
        self.resolve_connect(attempt, Ok(table_id));
    }

    fn on_connect_failed(&mut self, attempt: AttemptId, error: CritcastError) {
        if let Err(stale) = self.machine.transport_failed(attempt, error.to_string()) {
            debug!(%attempt, %stale, "connect failure for stale attempt");
            return;
        }
        self.connect_task = None;
        self.emit_status();
        self.emit(ClientEvent::Notice(Notice::Error(format!(
            "Connection failed: {error}"
        ))));
        self.resolve_connect(attempt, Err(error));
    }

    fn handle_timeout(&mut self, attempt: AttemptId) {
        if let Err(error) = self.machine.timed_out(attempt) {
            debug!(%attempt, %error, "timeout for stale attempt");
            return;
        }
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.emit_status();
        self.emit(ClientEvent::Notice(Notice::Error(TIMEOUT_NOTICE.to_string())));
        self.resolve_connect(
            attempt,
            Err(CritcastError::ConnectionTimeout(self.config.connect_timeout)),
        );
    }

    fn resolve_connect(&mut self, attempt: AttemptId, result: Result<TableId, CritcastError>) {
        match self.pending_connect.take() {
            Some((pending, reply)) if pending == attempt => {
                let _ = reply.send(result);
            }
            other => self.pending_connect = other,
        }
    }

    // -- connection ---------------------------------------------------------

    fn on_frame(&mut self, attempt: AttemptId, frame: Frame) {
        if attempt != self.machine.current_attempt() {
            debug!(%attempt, "frame from stale connection dropped");
            return;
        }

        // The raw slot records every well-formed frame, even one whose
        // payload does not match its event.
        self.last_message.replace(frame.clone());
        self.emit(ClientEvent::MessageReceived(frame.clone()));

        let event = match InboundEvent::from_frame(frame) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "malformed event payload ignored");
                return;
            }
        };

        let routed = route(self.machine.state(), event);
        if routed.action.without_known(&self.feed).apply(&mut self.feed) > 0 {
            self.emit(ClientEvent::FeedUpdated {
                len: self.feed.len(),
            });
        }
        if let Some(notice) = routed.notice {
            self.emit(ClientEvent::Notice(notice));
        }
    }

    fn on_closed(&mut self, attempt: AttemptId, reason: &str) {
        if let Err(error) = self.machine.transport_disconnected(attempt) {
            debug!(%attempt, %error, "close for inactive connection ignored");
            return;
        }
        warn!(%attempt, %reason, "connection lost");
        self.connection = None;
        self.reader_task = None;
        self.emit_status();
    }

    fn disconnect(&mut self) -> bool {
        if !self.machine.disconnect() {
            return false;
        }
        self.release_transport();
        self.emit_status();
        let attempt = self.machine.current_attempt();
        self.resolve_connect(attempt, Err(CritcastError::Cancelled));
        true
    }

    fn teardown(&mut self) {
        self.machine.disconnect();
        self.release_transport();
        if let Some((_, reply)) = self.pending_connect.take() {
            let _ = reply.send(Err(CritcastError::Cancelled));
        }
    }

    fn release_transport(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(connection) = self.connection.take() {
            spawn_close(connection, self.wire);
        }
    }

    fn send_frame(&self, connection: &Arc<C::Connection>, event: &OutboundEvent) {
        let bytes = match self.wire.event(event) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to encode outbound frame");
                return;
            }
        };
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            if let Err(error) = connection.send(&bytes).await {
                warn!(conn_id = %connection.id(), %error, "send failed");
            }
        });
    }

    // -- rolls --------------------------------------------------------------

    fn start_submission(
        &mut self,
        request: RollRequest,
        reply: oneshot::Sender<Result<RollRecord, CritcastError>>,
    ) {
        let connected = (self.machine.state().table_id(), self.machine.credentials());
        let (table_id, api_key) = match connected {
            (Some(table_id), Some(credentials)) => {
                (table_id.clone(), credentials.api_key().to_string())
            }
            _ => {
                self.reject_submission(reply, CritcastError::NotConnected);
                return;
            }
        };
        let source = self.config.roll_source();
        let roll = match request
            .normalized()
            .and_then(|request| request.author(table_id, source, &mut rand::rng()))
        {
            Ok(roll) => roll,
            Err(error) => {
                self.reject_submission(reply, error);
                return;
            }
        };

        debug!(notation = %roll.notation, total = roll.total, "roll simulated");
        let attempt = self.machine.current_attempt();
        let ingest = Arc::clone(&self.ingest);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = ingest.ingest(&api_key, &roll).await;
            let _ = tx.send(Internal::Ingested {
                attempt,
                roll,
                result,
                reply,
            });
        });
    }

    fn reject_submission(
        &self,
        reply: oneshot::Sender<Result<RollRecord, CritcastError>>,
        error: CritcastError,
    ) {
        self.emit(ClientEvent::Notice(Notice::Error(error.to_string())));
        let _ = reply.send(Err(error));
    }

    fn on_ingested(
        &mut self,
        attempt: AttemptId,
        roll: NewRoll,
        result: Result<IngestReceipt, IngestError>,
        reply: oneshot::Sender<Result<RollRecord, CritcastError>>,
    ) {
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!(%error, "roll submission failed");
                self.emit(ClientEvent::Notice(Notice::Error(format!(
                    "Failed to send roll: {error}"
                ))));
                let _ = reply.send(Err(error.into()));
                return;
            }
        };

        let record = roll.into_record(receipt.roll_id);
        info!(roll_id = %record.id, total = record.total, "roll submitted");
        if self.machine.is_live(attempt) {
            // The server's `roll:new` echo may have arrived first.
            if !self.feed.contains(&record.id) {
                self.feed.prepend(record.clone());
                self.emit(ClientEvent::FeedUpdated {
                    len: self.feed.len(),
                });
            }
            self.emit(ClientEvent::Notice(Notice::Info(format!(
                "Roll sent! Roll ID: {}",
                record.id
            ))));
        } else {
            warn!(
                %attempt,
                roll_id = %record.id,
                "session ended before ingest completed, roll not added to feed"
            );
        }
        let _ = reply.send(Ok(record));
    }

    // -- events -------------------------------------------------------------

    fn emit(&self, event: ClientEvent) {
        // The UI may have dropped its receiver; the client keeps working.
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            warn!(?event, "event receiver is full, event dropped");
        }
    }

    fn emit_status(&self) {
        self.emit(ClientEvent::StatusChanged(self.machine.state().clone()));
    }
}

/// Opens the connection and authenticates.
///
/// Over Socket.IO this waits for the engine open packet, sends the
/// namespace connect carrying the API key, and returns once the server
/// acknowledges it.
async fn open_connection<C: Connector>(
    connector: &C,
    url: &str,
    api_key: &str,
    wire: WireFormat,
) -> Result<C::Connection, CritcastError> {
    let connection = connector.connect(&wire.endpoint(url)).await?;
    if !wire.has_handshake() {
        connection.send(&wire.auth(api_key)?).await?;
        debug!(conn_id = %connection.id(), "auth frame sent");
        return Ok(connection);
    }

    loop {
        let Some(data) = connection.recv().await? else {
            return Err(TransportError::ConnectionClosed("closed during handshake".into()).into());
        };
        match wire.decode(&data)? {
            Incoming::Open => {
                connection.send(&wire.auth(api_key)?).await?;
                debug!(conn_id = %connection.id(), "namespace connect sent");
            }
            Incoming::Connected => return Ok(connection),
            Incoming::Refused(reason) => return Err(CritcastError::Refused(reason)),
            Incoming::Ping => send_pong(&connection, wire).await?,
            Incoming::Closed => {
                return Err(
                    TransportError::ConnectionClosed("server ended the handshake".into()).into(),
                );
            }
            Incoming::Event(frame) => {
                debug!(event = %frame.event, "event before connect ack dropped");
            }
            Incoming::Ignored => {}
        }
    }
}

async fn send_pong<T: Connection>(connection: &T, wire: WireFormat) -> Result<(), TransportError> {
    match wire.pong() {
        Some(pong) => connection.send(pong).await,
        None => Ok(()),
    }
}

/// Forwards every decoded event to the actor until the connection ends.
///
/// Heartbeats are answered here so a busy actor never delays them.
fn spawn_reader<T: Connection>(
    connection: Arc<T>,
    attempt: AttemptId,
    wire: WireFormat,
    tx: mpsc::UnboundedSender<Internal<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = loop {
            let data = match connection.recv().await {
                Ok(Some(data)) => data,
                Ok(None) => break "closed by server".to_string(),
                Err(error) => break error.to_string(),
            };
            match wire.decode(&data) {
                Ok(Incoming::Event(frame)) => {
                    if tx.send(Internal::Frame { attempt, frame }).is_err() {
                        return;
                    }
                }
                Ok(Incoming::Ping) => {
                    if let Err(error) = send_pong(connection.as_ref(), wire).await {
                        break error.to_string();
                    }
                }
                Ok(Incoming::Closed) => break "closed by server".to_string(),
                Ok(Incoming::Refused(reason)) => break format!("refused by server: {reason}"),
                Ok(Incoming::Open | Incoming::Connected | Incoming::Ignored) => {}
                Err(error) => debug!(conn_id = %connection.id(), %error, "undecodable frame dropped"),
            }
        };
        let _ = tx.send(Internal::Closed { attempt, reason });
    })
}

fn spawn_close<T: Connection>(connection: Arc<T>, wire: WireFormat) {
    tokio::spawn(async move {
        if let Some(goodbye) = wire.goodbye() {
            if let Err(error) = connection.send(goodbye).await {
                debug!(conn_id = %connection.id(), %error, "disconnect packet not sent");
            }
        }
        if let Err(error) = connection.close().await {
            debug!(conn_id = %connection.id(), %error, "close failed");
        }
    });
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// A running client: its command handle plus the event stream.
pub struct TableClient {
    handle: ClientHandle,
    events: EventReceiver,
}

impl TableClient {
    /// Creates a builder with default settings.
    pub fn builder() -> crate::ClientBuilder {
        crate::ClientBuilder::new()
    }

    /// A new handle to the actor.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Waits for the next event. `None` once the actor has stopped.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Splits into the handle and the raw event receiver.
    pub fn into_parts(self) -> (ClientHandle, EventReceiver) {
        (self.handle, self.events)
    }
}

/// Spawns the client actor. Must be called inside a Tokio runtime.
pub(crate) fn spawn_client<C: Connector, I: RollIngest>(
    config: ClientConfig,
    connector: C,
    ingest: I,
) -> TableClient {
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);

    let actor = ClientActor {
        machine: SessionStateMachine::new(config.connect_timeout),
        feed: RollFeed::new(config.feed_capacity),
        last_message: LastMessage::new(),
        connector: Arc::new(connector),
        ingest: Arc::new(ingest),
        wire: config.wire_format,
        connection: None,
        connect_task: None,
        reader_task: None,
        pending_connect: None,
        commands: command_rx,
        internal_tx,
        internal_rx,
        events: event_tx,
        config,
    };
    tokio::spawn(actor.run());

    TableClient {
        handle: ClientHandle { sender: command_tx },
        events: event_rx,
    }
}
