//! Error types for the invite ledger

use qrlink_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InviteError {
    /// The token never existed or was already consumed, possibly by a
    /// concurrent redemption.
    #[error("Invite not found or already used")]
    InviteNotFound { token: String },

    /// Entropy source unavailable or no unique token could be produced.
    #[error("Resource unavailable: {0}")]
    Resource(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid token length {length}: must be at least {min}")]
    InvalidTokenLength { length: usize, min: usize },
}

impl InviteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, InviteError::InviteNotFound { .. })
    }

    /// Only resource exhaustion is transient. A failed redemption must not be
    /// retried: the invite may already be consumed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InviteError::Resource(_))
    }
}

pub type Result<T> = std::result::Result<T, InviteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_omits_the_token() {
        let err = InviteError::InviteNotFound {
            token: "V1StGXR8_Z5jdHi6B-myT".to_string(),
        };
        assert_eq!(err.to_string(), "Invite not found or already used");
        assert!(err.is_not_found());
    }
}
