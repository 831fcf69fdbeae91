//! Tenant error types.

use metagrid_core::NameError;
use metagrid_state::{Retryable, StateError};
use thiserror::Error;

use crate::entry::TenantState;

/// Errors that can occur during tenant metadata operations.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant `{0}' not found")]
    NotFound(String),

    #[error("tenant `{0}' already exists")]
    AlreadyExists(String),

    #[error("tenant `{0}' still contains data")]
    NotEmpty(String),

    #[error("tenant prefix {prefix} for `{name}' is already in use")]
    PrefixInUse { name: String, prefix: String },

    #[error("unrecognized tenant configuration parameter `{0}'")]
    UnrecognizedParameter(String),

    #[error("invalid value for tenant configuration parameter `{parameter}': {reason}")]
    InvalidConfigurationValue { parameter: String, reason: String },

    #[error("tenant cannot move from state `{from}' to `{to}'")]
    InvalidStateTransition { from: TenantState, to: TenantState },

    #[error("invalid tenant prefix {prefix}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("tenant id space exhausted")]
    IdSpaceExhausted,

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type TenantResult<T> = Result<T, TenantError>;

impl Retryable for TenantError {
    fn is_retryable(&self) -> bool {
        matches!(self, TenantError::State(e) if e.is_retryable())
    }
}
