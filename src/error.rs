//! Crate-level error taxonomy.
//!
//! Every public operation returns `Result<_, VaultError>`. Authorization and
//! ownership failures surface before any side effect; storage failures roll
//! back the whole operation. Decryption failures are not errors here: they
//! are carried as [`crate::crypto::Decrypted::Undecryptable`] values.

use chrono::NaiveDateTime;

use crate::crypto::CryptoError;
use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Not authorized for {operation}")]
    Forbidden { operation: &'static str },

    /// Absent and not-owned are deliberately the same outcome.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate records found, these patient IDs already exist: {}", .colliding.join(", "))]
    DuplicatePatients { colliding: Vec<String> },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: NaiveDateTime },

    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Stable machine-readable code for outer transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) | Self::DuplicatePatients { .. } => "CONFLICT",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::InvalidCredentials => "AUTH_FAILED",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::Storage(_) => "STORAGE",
            Self::Crypto(_) | Self::Config(_) => "INTERNAL",
        }
    }

    /// Message safe to show a caller. Storage and internal details stay in logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                "A storage error occurred".to_string()
            }
            Self::Crypto(_) | Self::Config(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::Storage(DatabaseError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_variants_share_code() {
        assert_eq!(VaultError::Conflict("email".into()).code(), "CONFLICT");
        let dup = VaultError::DuplicatePatients {
            colliding: vec!["P1".into(), "P2".into()],
        };
        assert_eq!(dup.code(), "CONFLICT");
        assert!(dup.to_string().contains("P1, P2"));
    }

    #[test]
    fn storage_detail_hidden_from_caller() {
        let err = VaultError::Storage(DatabaseError::ConstraintViolation("UNIQUE patients.patient_id".into()));
        assert_eq!(err.code(), "STORAGE");
        assert_eq!(err.public_message(), "A storage error occurred");
    }

    #[test]
    fn forbidden_names_operation() {
        let err = VaultError::Forbidden { operation: "patient.update" };
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(err.public_message().contains("patient.update"));
    }

    #[test]
    fn rusqlite_error_maps_to_storage() {
        let err: VaultError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), "STORAGE");
    }
}
