//! Error types for the Metagrid state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("unsupported record encoding version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("transaction not committed due to conflict with another transaction")]
    Conflict,

    #[error("key outside legal range: {0}")]
    KeyOutsideLegalRange(String),
}

impl StateError {
    /// True for conflicts that are resolved by re-running the transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict)
    }

    /// True when stored bytes could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            StateError::Deserialize(_) | StateError::UnsupportedVersion { .. }
        )
    }
}
