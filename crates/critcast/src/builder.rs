//! `ClientBuilder`: configures and spawns a [`TableClient`].

use std::time::Duration;

use critcast_protocol::WireFormat;
use critcast_transport::{Connector, WebSocketConnector};
use tracing::debug;

use crate::client::spawn_client;
use crate::{ClientConfig, CritcastError, HttpIngest, RollIngest, TableClient};

/// Builder for configuring and starting a table client.
///
/// # Example
///
/// ```rust,no_run
/// use critcast::prelude::*;
///
/// # async fn demo() -> Result<(), CritcastError> {
/// let mut client = TableClient::builder()
///     .server_url("http://localhost:3000")
///     .build()?;
///
/// let handle = client.handle();
/// handle.connect(Credentials::new("my-api-key", "table-1")).await?;
/// while let Some(event) = client.next_event().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn socket_url(mut self, url: &str) -> Self {
        self.config.socket_url = url.to_string();
        self
    }

    /// Chooses the framing for the table connection.
    pub fn wire_format(mut self, wire_format: WireFormat) -> Self {
        self.config.wire_format = wire_format;
        self
    }

    pub fn server_url(mut self, url: &str) -> Self {
        self.config.server_url = url.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.config.feed_capacity = capacity;
        self
    }

    /// Events buffered for a slow receiver before new ones are dropped.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    /// Sets the application name and version stamped on authored rolls.
    pub fn app(mut self, name: &str, version: &str) -> Self {
        self.config.app_name = name.to_string();
        self.config.app_version = version.to_string();
        self
    }

    /// Spawns the client over WebSocket with HTTP roll submission.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// [`CritcastError::Ingest`] if the HTTP client cannot be created.
    pub fn build(self) -> Result<TableClient, CritcastError> {
        let config = self.config.validated();
        let ingest = HttpIngest::new(&config.server_url, config.request_timeout)?;
        debug!(
            socket_url = %config.wire_format.endpoint(&config.socket_url),
            ingest_url = ingest.url(),
            "client endpoints"
        );
        Ok(spawn_client(config, WebSocketConnector, ingest))
    }

    /// Spawns the client with a custom connector and ingest backend.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build_with<C: Connector, I: RollIngest>(self, connector: C, ingest: I) -> TableClient {
        spawn_client(self.config.validated(), connector, ingest)
    }
}
