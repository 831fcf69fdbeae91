//! Metacluster management error types.

use std::fmt;

use metagrid_cluster::ClusterError;
use metagrid_state::{Retryable, StateError};
use metagrid_tenant::{TenantError, TenantState};
use serde::Serialize;
use thiserror::Error;

use crate::parse::ConfigParseError;

/// Coarse classification of a management failure, stable across the
/// individual error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    PreconditionFailed,
    Conflict,
    DecodeError,
    Inconsistent,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::Inconsistent => "inconsistent",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`MetaclusterApi`](crate::MetaclusterApi).
#[derive(Debug, Error)]
pub enum MetaclusterError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigParseError),

    #[error("tenant `{name}' is in state `{state}' and cannot be {action}")]
    InvalidTenantState {
        name: String,
        state: TenantState,
        action: &'static str,
    },

    #[error("tenant group `{group}' is assigned to {assigned}, not {requested}")]
    TenantGroupClusterMismatch {
        group: String,
        assigned: String,
        requested: String,
    },

    #[error("tenant group `{group}' is stranded on removed cluster `{cluster}'")]
    StrandedTenantGroup { group: String, cluster: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type MetaclusterResult<T> = Result<T, MetaclusterError>;

fn state_kind(error: &StateError) -> ErrorKind {
    if error.is_conflict() {
        ErrorKind::Conflict
    } else if error.is_decode() {
        ErrorKind::DecodeError
    } else {
        ErrorKind::Storage
    }
}

impl MetaclusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaclusterError::Cluster(e) => match e {
                ClusterError::NotFound(_) => ErrorKind::NotFound,
                ClusterError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                ClusterError::NotEmpty { .. }
                | ClusterError::CapacityBelowAllocation { .. }
                | ClusterError::AtCapacity { .. }
                | ClusterError::NoCapacity => ErrorKind::PreconditionFailed,
                ClusterError::InvalidCapacity(_)
                | ClusterError::InvalidConnectionString { .. }
                | ClusterError::Name(_) => ErrorKind::InvalidArgument,
                ClusterError::State(e) => state_kind(e),
            },
            MetaclusterError::Tenant(e) => match e {
                TenantError::NotFound(_) => ErrorKind::NotFound,
                TenantError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                TenantError::NotEmpty(_)
                | TenantError::InvalidStateTransition { .. }
                | TenantError::IdSpaceExhausted => ErrorKind::PreconditionFailed,
                TenantError::PrefixInUse { .. } => ErrorKind::Inconsistent,
                TenantError::UnrecognizedParameter(_)
                | TenantError::InvalidConfigurationValue { .. }
                | TenantError::Name(_) => ErrorKind::InvalidArgument,
                TenantError::InvalidPrefix { .. } => ErrorKind::DecodeError,
                TenantError::State(e) => state_kind(e),
            },
            MetaclusterError::InvalidConfiguration(_)
            | MetaclusterError::TenantGroupClusterMismatch { .. } => ErrorKind::InvalidArgument,
            MetaclusterError::InvalidTenantState { state, .. } => {
                if *state == TenantState::Error {
                    ErrorKind::Inconsistent
                } else {
                    ErrorKind::PreconditionFailed
                }
            }
            MetaclusterError::StrandedTenantGroup { .. } => ErrorKind::Inconsistent,
            MetaclusterError::State(e) => state_kind(e),
        }
    }
}

impl Retryable for MetaclusterError {
    fn is_retryable(&self) -> bool {
        match self {
            MetaclusterError::Cluster(e) => e.is_retryable(),
            MetaclusterError::Tenant(e) => e.is_retryable(),
            MetaclusterError::State(e) => e.is_retryable(),
            _ => false,
        }
    }
}
