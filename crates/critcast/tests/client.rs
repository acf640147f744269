//! Client actor tests over an in-memory connection and a recording ingest.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use critcast::prelude::*;
use critcast::{IngestError, RollIngest};
use critcast::protocol::{IngestReceipt, NewRoll, RollId, WireFormat};
use critcast::session::SessionError;
use critcast::transport::{Connection, ConnectionId, Connector, TransportError};
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

// =========================================================================
// In-memory transport
// =========================================================================

struct MockConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl Connection for MockConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.outbound
            .send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inbound.lock().await.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The server side of a [`MockConnection`].
struct Peer {
    to_client: mpsc::UnboundedSender<Vec<u8>>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Peer {
    fn send(&self, event: &str, data: Value) {
        let bytes = serde_json::to_vec(&json!({"event": event, "data": data})).unwrap();
        self.to_client.send(bytes).unwrap();
    }

    async fn next_frame(&mut self) -> Value {
        serde_json::from_str(&self.next_text().await).unwrap()
    }

    fn send_text(&self, text: &str) {
        self.to_client.send(text.as_bytes().to_vec()).unwrap();
    }

    async fn next_text(&mut self) -> String {
        let bytes = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client connection dropped");
        String::from_utf8(bytes).unwrap()
    }
}

fn mock_pair(id: u64) -> (MockConnection, Peer) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    let connection = MockConnection {
        id: ConnectionId::new(id),
        inbound: tokio::sync::Mutex::new(inbound),
        outbound,
    };
    (connection, Peer { to_client, from_client })
}

/// Hands out prepared connections in order.
struct MockConnector {
    ready: Mutex<Vec<MockConnection>>,
}

impl MockConnector {
    fn with(connections: Vec<MockConnection>) -> Self {
        let mut ready = connections;
        ready.reverse();
        Self {
            ready: Mutex::new(ready),
        }
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, _url: &str) -> Result<MockConnection, TransportError> {
        let next = self.ready.lock().unwrap().pop();
        next.ok_or_else(|| TransportError::ConnectFailed("connection refused".into()))
    }
}

/// A connector whose handshake never completes.
struct HangingConnector;

impl Connector for HangingConnector {
    type Connection = MockConnection;

    async fn connect(&self, _url: &str) -> Result<MockConnection, TransportError> {
        std::future::pending().await
    }
}

// =========================================================================
// Ingest doubles
// =========================================================================

#[derive(Default)]
struct IngestState {
    next_id: AtomicU64,
    submitted: Mutex<Vec<(String, NewRoll)>>,
    reject: bool,
    /// When set, `ingest` signals `entered` and then waits for `gate`.
    gated: bool,
    entered: Notify,
    gate: Notify,
}

/// Accepts every roll (unless rejecting) and assigns `srv-N` ids.
#[derive(Clone, Default)]
struct RecordingIngest(Arc<IngestState>);

impl RecordingIngest {
    fn rejecting() -> Self {
        Self(Arc::new(IngestState {
            reject: true,
            ..IngestState::default()
        }))
    }

    fn gated() -> Self {
        Self(Arc::new(IngestState {
            gated: true,
            ..IngestState::default()
        }))
    }

    fn submitted(&self) -> Vec<(String, NewRoll)> {
        self.0.submitted.lock().unwrap().clone()
    }
}

impl RollIngest for RecordingIngest {
    async fn ingest(&self, api_key: &str, roll: &NewRoll) -> Result<IngestReceipt, IngestError> {
        let state = &self.0;
        if state.gated {
            state.entered.notify_one();
            state.gate.notified().await;
        }
        if state.reject {
            return Err(IngestError::Rejected {
                status: 401,
                message: "invalid api key".into(),
            });
        }
        state
            .submitted
            .lock()
            .unwrap()
            .push((api_key.to_string(), roll.clone()));
        let n = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IngestReceipt {
            roll_id: RollId(format!("srv-{n}")),
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn creds() -> Credentials {
    Credentials::new("key-1", "table-1")
}

fn roll_json(id: &str, total: i64) -> Value {
    json!({
        "rollId": id,
        "notation": "1d20",
        "dice": [{"sides": 20, "value": total, "type": "standard"}],
        "modifiers": [],
        "total": total,
        "context": {"rollType": "check", "character": "Ana"},
        "source": {"type": "app", "appName": "Other App"},
        "timestamp": "2024-05-01T12:00:00Z"
    })
}

fn client_with(
    connections: Vec<MockConnection>,
    ingest: RecordingIngest,
) -> TableClient {
    TableClient::builder()
        .wire_format(WireFormat::JsonFrames)
        .build_with(MockConnector::with(connections), ingest)
}

async fn wait_for(
    client: &mut TableClient,
    mut matches: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = client.next_event().await.expect("event stream ended");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn feed_ids(snapshot: &ClientSnapshot) -> Vec<String> {
    snapshot.feed.iter().map(|r| r.id.to_string()).collect()
}

/// Connects and drains the auth and subscribe frames.
async fn connected_client(
    ingest: RecordingIngest,
) -> (TableClient, Peer) {
    let (connection, mut peer) = mock_pair(1);
    let client = client_with(vec![connection], ingest);
    client.handle().connect(creds()).await.expect("should connect");
    peer.next_frame().await;
    peer.next_frame().await;
    (client, peer)
}

// =========================================================================
// connect / disconnect
// =========================================================================

#[tokio::test]
async fn test_connect_sends_auth_then_subscribe() {
    let (connection, mut peer) = mock_pair(1);
    let client = client_with(vec![connection], Default::default());

    let table = client.handle().connect(creds()).await.unwrap();

    assert_eq!(table, TableId::from("table-1"));
    assert_eq!(
        peer.next_frame().await,
        json!({"event": "auth", "data": {"apiKey": "key-1"}})
    );
    assert_eq!(
        peer.next_frame().await,
        json!({"event": "subscribe:table", "data": {"tableId": "table-1"}})
    );
    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Connected(TableId::from("table-1")));
}

#[tokio::test]
async fn test_connect_with_empty_table_id_stays_idle() {
    let client = client_with(Vec::new(), Default::default());

    let result = client.handle().connect(Credentials::new("key-1", " ")).await;

    assert!(matches!(
        result,
        Err(CritcastError::Session(SessionError::MissingCredentials("table id")))
    ));
    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
}

#[tokio::test]
async fn test_connect_while_connected_is_already_active() {
    let (client, _peer) = connected_client(Default::default()).await;

    let result = client.handle().connect(creds()).await;

    assert!(matches!(
        result,
        Err(CritcastError::Session(SessionError::AlreadyActive(_)))
    ));
}

#[tokio::test]
async fn test_connect_refused_enters_failed() {
    let mut client = client_with(Vec::new(), Default::default());

    let result = client.handle().connect(creds()).await;

    assert!(matches!(result, Err(CritcastError::Transport(_))));
    let event = wait_for(&mut client, |e| matches!(e, ClientEvent::Notice(n) if n.is_error())).await;
    assert!(matches!(event, ClientEvent::Notice(Notice::Error(m)) if m.contains("refused")));
    let snapshot = client.handle().snapshot().await.unwrap();
    assert!(matches!(snapshot.state, SessionState::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_fails_with_timeout_reason() {
    let mut client = TableClient::builder()
        .connect_timeout(Duration::from_secs(10))
        .build_with(HangingConnector, RecordingIngest::default());

    let result = client.handle().connect(creds()).await;

    assert!(matches!(
        result,
        Err(CritcastError::ConnectionTimeout(d)) if d == Duration::from_secs(10)
    ));
    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Failed("timeout".into()));
    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::StatusChanged(SessionState::Failed(r)) if r == "timeout")
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_then_reconnect_uses_new_connection() {
    let (first, mut first_peer) = mock_pair(1);
    let (second, mut second_peer) = mock_pair(2);
    let client = client_with(vec![first, second], Default::default());
    let handle = client.handle();

    handle.connect(creds()).await.unwrap();
    first_peer.next_frame().await;
    assert!(handle.disconnect().await.unwrap());
    assert!(!handle.disconnect().await.unwrap());

    handle.connect(creds()).await.unwrap();
    let auth = second_peer.next_frame().await;
    assert_eq!(auth["event"], "auth");
}

#[tokio::test]
async fn test_socket_io_handshake_then_subscribe() {
    let (connection, mut peer) = mock_pair(1);
    let mut client = TableClient::builder()
        .build_with(MockConnector::with(vec![connection]), RecordingIngest::default());
    let handle = client.handle();
    let connecting = tokio::spawn(async move { handle.connect(creds()).await });

    peer.send_text(r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
    assert_eq!(peer.next_text().await, r#"40{"apiKey":"key-1"}"#);
    peer.send_text(r#"40{"sid":"sio-1"}"#);

    let table = connecting.await.unwrap().unwrap();
    assert_eq!(table, TableId::from("table-1"));
    assert_eq!(
        peer.next_text().await,
        r#"42["subscribe:table",{"tableId":"table-1"}]"#
    );

    peer.send_text("2");
    assert_eq!(peer.next_text().await, "3");

    peer.send_text(&format!(r#"42["roll:new",{}]"#, roll_json("r-1", 12)));
    wait_for(&mut client, |e| matches!(e, ClientEvent::FeedUpdated { len: 1 })).await;
    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(feed_ids(&snapshot), ["r-1"]);
    assert_eq!(snapshot.last_message.frame().map(|f| f.event.as_str()), Some("roll:new"));
}

#[tokio::test]
async fn test_socket_io_connect_error_is_refused() {
    let (connection, mut peer) = mock_pair(1);
    let client = TableClient::builder()
        .build_with(MockConnector::with(vec![connection]), RecordingIngest::default());
    let handle = client.handle();
    let connecting = tokio::spawn(async move { handle.connect(creds()).await });

    peer.send_text(r#"0{"sid":"eio-1","pingInterval":25000}"#);
    peer.next_text().await;
    peer.send_text(r#"44{"message":"invalid api key"}"#);

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(CritcastError::Refused(m)) if m == "invalid api key"));
    let snapshot = client.handle().snapshot().await.unwrap();
    assert!(matches!(snapshot.state, SessionState::Failed(r) if r.contains("invalid api key")));
}

#[tokio::test]
async fn test_socket_io_disconnect_packet_ends_session() {
    let (connection, mut peer) = mock_pair(1);
    let mut client = TableClient::builder()
        .build_with(MockConnector::with(vec![connection]), RecordingIngest::default());
    let handle = client.handle();
    let connecting = tokio::spawn(async move { handle.connect(creds()).await });
    peer.send_text(r#"0{"sid":"eio-1"}"#);
    peer.next_text().await;
    peer.send_text("40");
    connecting.await.unwrap().unwrap();

    peer.send_text("41");

    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::StatusChanged(SessionState::Disconnected))
    })
    .await;
}

#[tokio::test]
async fn test_server_close_moves_to_disconnected() {
    let (mut client, peer) = connected_client(Default::default()).await;

    drop(peer);

    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::StatusChanged(SessionState::Disconnected))
    })
    .await;
    let result = client
        .handle()
        .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
        .await;
    assert!(matches!(result, Err(CritcastError::NotConnected)));
}

// =========================================================================
// Inbound routing
// =========================================================================

#[tokio::test]
async fn test_history_and_new_roll_build_newest_first_feed() {
    let (mut client, peer) = connected_client(Default::default()).await;

    peer.send(
        "table:history",
        json!({"tableId": "table-1", "rolls": [roll_json("a", 3), roll_json("b", 7)]}),
    );
    peer.send("roll:new", roll_json("c", 11));

    wait_for(&mut client, |e| matches!(e, ClientEvent::FeedUpdated { len: 3 })).await;
    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(feed_ids(&snapshot), ["c", "b", "a"]);
    assert_eq!(
        snapshot.last_message.frame().map(|f| f.event.as_str()),
        Some("roll:new")
    );
}

#[tokio::test]
async fn test_proxy_roll_result_lands_in_feed() {
    let (mut client, peer) = connected_client(Default::default()).await;

    peer.send(
        "roll_result",
        json!({"notation": "2d6+1", "rolls": [2, 5], "modifier": 1, "result": 8}),
    );

    wait_for(&mut client, |e| matches!(e, ClientEvent::FeedUpdated { len: 1 })).await;
    let snapshot = client.handle().snapshot().await.unwrap();
    let roll = &snapshot.feed[0];
    assert_eq!(roll.total, 8);
    assert!(roll.dice.iter().all(|d| d.sides.is_none()));
    assert_eq!(roll.context.character.as_deref(), Some("Unknown Player"));
}

#[tokio::test]
async fn test_server_error_is_reported_as_notice() {
    let (mut client, peer) = connected_client(Default::default()).await;

    peer.send("message", json!({"type": "error", "message": "table is closed"}));

    let event = wait_for(&mut client, |e| matches!(e, ClientEvent::Notice(n) if n.is_error())).await;
    assert_eq!(
        event,
        ClientEvent::Notice(Notice::Error("table is closed".into()))
    );
}

#[tokio::test]
async fn test_clear_feed_also_clears_last_message() {
    let (mut client, peer) = connected_client(Default::default()).await;
    peer.send("roll:new", roll_json("a", 4));
    wait_for(&mut client, |e| matches!(e, ClientEvent::FeedUpdated { len: 1 })).await;

    client.handle().clear_feed().await.unwrap();
    client.handle().clear_feed().await.unwrap();

    let snapshot = client.handle().snapshot().await.unwrap();
    assert!(snapshot.feed.is_empty());
    assert!(snapshot.last_message.frame().is_none());
}

// =========================================================================
// Roll submission
// =========================================================================

#[tokio::test]
async fn test_submit_roll_adds_confirmed_record_once() {
    let ingest = RecordingIngest::default();
    let (mut client, peer) = connected_client(ingest.clone()).await;

    let record = client
        .handle()
        .submit_roll(RollRequest::new("2d6+3", "Vex", "damage").with_weapon("Longsword"))
        .await
        .unwrap();

    assert_eq!(record.id.as_str(), "srv-1");
    assert_eq!(record.dice.len(), 2);
    assert_eq!(record.total, record.component_sum());
    let (api_key, body) = ingest.submitted()[0].clone();
    assert_eq!(api_key, "key-1");
    assert_eq!(body.table_id.as_str(), "table-1");
    assert_eq!(body.context.weapon.as_deref(), Some("Longsword"));

    // The server echoes the roll back to every subscriber.
    let echo = serde_json::to_value(&record).unwrap();
    peer.send("roll:new", echo);
    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::MessageReceived(f) if f.event == "roll:new")
    })
    .await;

    let snapshot = client.handle().snapshot().await.unwrap();
    assert_eq!(feed_ids(&snapshot), ["srv-1"]);
}

#[tokio::test]
async fn test_submit_roll_requires_connection() {
    let client = client_with(Vec::new(), Default::default());

    let result = client
        .handle()
        .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
        .await;

    assert!(matches!(result, Err(CritcastError::NotConnected)));
}

#[tokio::test]
async fn test_submit_roll_requires_character() {
    let (client, _peer) = connected_client(Default::default()).await;

    let result = client
        .handle()
        .submit_roll(RollRequest::new("1d20", "  ", "attack"))
        .await;

    assert!(matches!(result, Err(CritcastError::MissingRollField("character"))));
}

#[tokio::test]
async fn test_submit_roll_with_unusable_notation() {
    let (client, _peer) = connected_client(Default::default()).await;

    let result = client
        .handle()
        .submit_roll(RollRequest::new("banana", "Vex", "attack"))
        .await;

    assert!(matches!(result, Err(CritcastError::Dice(_))));
}

#[tokio::test]
async fn test_submit_roll_overflowing_total_keeps_client_alive() {
    let ingest = RecordingIngest::default();
    let (client, _peer) = connected_client(ingest.clone()).await;
    let handle = client.handle();

    let result = handle
        .submit_roll(RollRequest::new("9223372036854775807+1", "Vex", "attack"))
        .await;
    assert!(matches!(result, Err(CritcastError::Dice(_))), "{result:?}");

    // The actor is still serving commands and the session is untouched.
    let snapshot = handle.snapshot().await.unwrap();
    assert!(matches!(snapshot.state, SessionState::Connected(_)));
    assert!(ingest.submitted().is_empty());
    handle
        .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_submission_leaves_feed_untouched() {
    let ingest = RecordingIngest::rejecting();
    let (client, _peer) = connected_client(ingest).await;

    let result = client
        .handle()
        .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
        .await;

    assert!(matches!(
        result,
        Err(CritcastError::Ingest(IngestError::Rejected { status: 401, .. }))
    ));
    assert!(client.handle().snapshot().await.unwrap().feed.is_empty());
}

#[tokio::test]
async fn test_late_ingest_after_disconnect_is_not_added() {
    let ingest = RecordingIngest::gated();
    let (client, _peer) = connected_client(ingest.clone()).await;
    let handle = client.handle();

    let submit = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
                .await
        }
    });
    // Disconnect while the ingest request is in flight.
    ingest.0.entered.notified().await;
    handle.disconnect().await.unwrap();
    ingest.0.gate.notify_one();

    let record = submit.await.unwrap().expect("server accepted the roll");
    assert_eq!(record.id.as_str(), "srv-1");
    assert!(handle.snapshot().await.unwrap().feed.is_empty());
}

#[tokio::test]
async fn test_echo_before_ingest_reply_is_shown_once() {
    let ingest = RecordingIngest::gated();
    let (mut client, peer) = connected_client(ingest.clone()).await;
    let handle = client.handle();

    let submit = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .submit_roll(RollRequest::new("1d20", "Vex", "attack"))
                .await
        }
    });
    // The broadcast overtakes the HTTP response.
    ingest.0.entered.notified().await;
    peer.send("roll:new", roll_json("srv-1", 12));
    wait_for(&mut client, |e| matches!(e, ClientEvent::FeedUpdated { len: 1 })).await;
    ingest.0.gate.notify_one();

    let record = submit.await.unwrap().unwrap();
    assert_eq!(record.id.as_str(), "srv-1");
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(feed_ids(&snapshot), ["srv-1"]);
}

// =========================================================================
// Event delivery
// =========================================================================

#[tokio::test]
async fn test_unread_events_do_not_stall_the_client() {
    let mut client = TableClient::builder()
        .wire_format(WireFormat::JsonFrames)
        .event_buffer(2)
        .build_with(MockConnector::with(Vec::new()), RecordingIngest::default());
    let handle = client.handle();

    for _ in 0..10 {
        handle.clear_feed().await.unwrap();
    }
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);

    // Only the first two events were kept.
    assert_eq!(client.next_event().await, Some(ClientEvent::FeedUpdated { len: 0 }));
    assert_eq!(client.next_event().await, Some(ClientEvent::FeedUpdated { len: 0 }));
    drop(handle);
    let (handle, mut events) = client.into_parts();
    handle.shutdown().await.unwrap();
    assert_eq!(events.recv().await, None);
}
