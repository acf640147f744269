//! Credentials for joining a rolling table.
//!
//! The API key authenticates both the persistent connection (sent as an
//! auth frame, never as a header) and the REST ingest call (sent as the
//! `X-API-Key` header).

use std::fmt;

use critcast_protocol::TableId;

use crate::SessionError;

/// API key plus the table to subscribe to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    table_id: TableId,
}

impl Credentials {
    /// Builds credentials, trimming surrounding whitespace from both fields.
    pub fn new(api_key: impl AsRef<str>, table_id: impl AsRef<str>) -> Self {
        Self {
            api_key: api_key.as_ref().trim().to_string(),
            table_id: TableId(table_id.as_ref().trim().to_string()),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    /// Checks that both fields are present.
    ///
    /// # Errors
    /// [`SessionError::MissingCredentials`] naming the first empty field.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.api_key.is_empty() {
            return Err(SessionError::MissingCredentials("api key"));
        }
        if self.table_id.as_str().is_empty() {
            return Err(SessionError::MissingCredentials("table id"));
        }
        Ok(())
    }
}

// The key stays out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("table_id", &self.table_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_fields() {
        let creds = Credentials::new("  key-1 ", "\ttable-9\n");
        assert_eq!(creds.api_key(), "key-1");
        assert_eq!(creds.table_id().as_str(), "table-9");
    }

    #[test]
    fn test_validate_reports_missing_api_key_first() {
        let creds = Credentials::new("", "");
        assert_eq!(
            creds.validate(),
            Err(SessionError::MissingCredentials("api key"))
        );
    }

    #[test]
    fn test_validate_reports_blank_table_id() {
        let creds = Credentials::new("key", "   ");
        assert_eq!(
            creds.validate(),
            Err(SessionError::MissingCredentials("table id"))
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", Credentials::new("secret-key", "t"));
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
