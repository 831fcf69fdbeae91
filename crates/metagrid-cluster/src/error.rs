//! Cluster registry error types.

use metagrid_core::NameError;
use metagrid_state::{Retryable, StateError};
use thiserror::Error;

/// Errors that can occur during cluster registry operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster `{0}' not found")]
    NotFound(String),

    #[error("cluster `{0}' already exists")]
    AlreadyExists(String),

    #[error("cluster `{name}' still has {allocated} allocated tenant groups")]
    NotEmpty { name: String, allocated: i64 },

    #[error(
        "cluster `{name}' capacity of {capacity} tenant groups is below its {allocated} allocated tenant groups"
    )]
    CapacityBelowAllocation {
        name: String,
        capacity: i64,
        allocated: i64,
    },

    #[error("cluster `{name}' has no free tenant group capacity (capacity {capacity})")]
    AtCapacity { name: String, capacity: i64 },

    #[error("no data cluster has free tenant group capacity")]
    NoCapacity,

    #[error("invalid number of tenant groups {0}")]
    InvalidCapacity(String),

    #[error("invalid connection string `{value}': {reason}")]
    InvalidConnectionString { value: String, reason: String },

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl Retryable for ClusterError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::State(e) if e.is_retryable())
    }
}
