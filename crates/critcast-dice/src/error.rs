//! Error types for dice notation.

/// Errors produced while interpreting dice notation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    /// The notation was empty after normalization or contained no term
    /// that could be rolled.
    #[error("invalid dice notation '{notation}': {reason}")]
    InvalidNotation { notation: String, reason: String },
}

impl DiceError {
    pub(crate) fn invalid(notation: &str, reason: &str) -> Self {
        Self::InvalidNotation {
            notation: notation.to_string(),
            reason: reason.to_string(),
        }
    }
}
