//! Roll submission over the REST ingest endpoint.

use std::future::Future;
use std::time::Duration;

use critcast_protocol::{IngestReceipt, NewRoll};
use reqwest::Client;
use tracing::debug;

/// Header carrying the API key on REST calls.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors from the ingest endpoint. All of them mean the roll was not
/// accepted.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The request never completed (DNS, connect, timeout, ...).
    #[error("submission failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("submission failed: {status} {message}")]
    Rejected { status: u16, message: String },

    /// The server accepted the roll but its reply was unreadable.
    #[error("submission failed: invalid receipt: {0}")]
    InvalidReceipt(String),
}

/// Submits authored rolls to the table server.
///
/// The client runs `ingest` on a spawned task, so implementations may
/// take as long as they need.
pub trait RollIngest: Send + Sync + 'static {
    /// Submits `roll`, authenticating with `api_key`.
    ///
    /// # Errors
    /// Any [`IngestError`]; the roll must be treated as not stored.
    fn ingest(
        &self,
        api_key: &str,
        roll: &NewRoll,
    ) -> impl Future<Output = Result<IngestReceipt, IngestError>> + Send;
}

/// [`RollIngest`] over HTTP: `POST {base}/api/v1/ingest`.
#[derive(Debug, Clone)]
pub struct HttpIngest {
    client: Client,
    url: String,
}

impl HttpIngest {
    /// Creates an ingest client for `server_url`, with a request timeout.
    ///
    /// # Errors
    /// [`IngestError::Request`] if the HTTP client cannot be built (for
    /// example when no TLS backend is available).
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, IngestError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/api/v1/ingest", server_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RollIngest for HttpIngest {
    async fn ingest(&self, api_key: &str, roll: &NewRoll) -> Result<IngestReceipt, IngestError> {
        debug!(url = %self.url, notation = %roll.notation, "submitting roll");

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, api_key)
            .json(roll)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(IngestError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<IngestReceipt>()
            .await
            .map_err(|e| IngestError::InvalidReceipt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_ingest_path() {
        let ingest = HttpIngest::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(ingest.url(), "http://localhost:3000/api/v1/ingest");
    }

    #[test]
    fn test_rejected_display() {
        let err = IngestError::Rejected {
            status: 401,
            message: "invalid api key".into(),
        };
        assert_eq!(err.to_string(), "submission failed: 401 invalid api key");
    }
}
