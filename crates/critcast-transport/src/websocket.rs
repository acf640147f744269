//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A [`Connector`] that dials `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, url, "opened WebSocket connection");

        // Split so a pending recv never holds up an outbound frame.
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single outbound WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        // Packets are text, so they go out as text whenever they are UTF-8.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(send_error)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(send_error)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

fn send_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransportError::ConnectionClosed(error.to_string())
        }
        other => {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, other))
        }
    }
}
