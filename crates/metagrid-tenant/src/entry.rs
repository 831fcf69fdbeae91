//! Tenant map entries and the tenant lifecycle.

use std::fmt;
use std::str::FromStr;

use metagrid_core::{ClusterName, NameKind, TenantGroupName, printable, validate_name};
use metagrid_state::VersionedRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::id_to_prefix;
use crate::error::{TenantError, TenantResult};

/// Configuration parameter naming a tenant's group.
pub const TENANT_GROUP_PARAM: &str = "tenant_group";

/// Lifecycle state of a tenant.
///
/// ```text
/// REGISTERING ──> READY <──> UPDATING_CONFIGURATION
///      │            │                 │
///      └──────> REMOVING <────────────┘     any ──> ERROR
/// ```
///
/// Stored as a numeric tag; unknown tags fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TenantState {
    Registering,
    Ready,
    Removing,
    UpdatingConfiguration,
    Error,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tenant state tag {0} is out of range")]
pub struct InvalidTenantState(pub u8);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown tenant state `{0}'")]
pub struct UnknownTenantState(pub String);

impl TryFrom<u8> for TenantState {
    type Error = InvalidTenantState;

    fn try_from(tag: u8) -> Result<Self, InvalidTenantState> {
        Ok(match tag {
            0 => TenantState::Registering,
            1 => TenantState::Ready,
            2 => TenantState::Removing,
            3 => TenantState::UpdatingConfiguration,
            4 => TenantState::Error,
            other => return Err(InvalidTenantState(other)),
        })
    }
}

impl From<TenantState> for u8 {
    fn from(state: TenantState) -> u8 {
        match state {
            TenantState::Registering => 0,
            TenantState::Ready => 1,
            TenantState::Removing => 2,
            TenantState::UpdatingConfiguration => 3,
            TenantState::Error => 4,
        }
    }
}

impl TenantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantState::Registering => "registering",
            TenantState::Ready => "ready",
            TenantState::Removing => "removing",
            TenantState::UpdatingConfiguration => "updating configuration",
            TenantState::Error => "error",
        }
    }

    /// Whether a tenant in this state may move to `next` without force.
    pub fn can_transition_to(self, next: TenantState) -> bool {
        use TenantState::*;
        match (self, next) {
            (_, Error) => self != Error,
            (Registering, Ready | Removing) => true,
            (Ready, UpdatingConfiguration | Removing) => true,
            (UpdatingConfiguration, Ready | Removing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantState {
    type Err = UnknownTenantState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registering" => Ok(TenantState::Registering),
            "ready" => Ok(TenantState::Ready),
            "removing" => Ok(TenantState::Removing),
            "updating configuration" => Ok(TenantState::UpdatingConfiguration),
            "error" => Ok(TenantState::Error),
            other => Err(UnknownTenantState(other.to_string())),
        }
    }
}

/// Persisted metadata of one tenant.
///
/// `id` and `prefix` are fixed at construction; `prefix` is always the
/// encoding of `id` and is rebuilt on decode rather than stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredTenantEntry", into = "StoredTenantEntry")]
pub struct TenantMapEntry {
    id: i64,
    prefix: Vec<u8>,
    pub tenant_group: Option<TenantGroupName>,
    pub tenant_state: TenantState,
    pub assigned_cluster: Option<ClusterName>,
    pub configuration_sequence_num: i64,
}

/// Wire form. Version 1 predates tenant groups and cluster assignment.
#[derive(Serialize, Deserialize)]
struct StoredTenantEntry {
    id: i64,
    #[serde(default)]
    tenant_group: Option<TenantGroupName>,
    tenant_state: TenantState,
    #[serde(default)]
    assigned_cluster: Option<ClusterName>,
    #[serde(default)]
    configuration_sequence_num: i64,
}

impl TryFrom<StoredTenantEntry> for TenantMapEntry {
    type Error = String;

    fn try_from(stored: StoredTenantEntry) -> Result<Self, Self::Error> {
        if stored.id < 0 {
            return Err(format!("negative tenant id {}", stored.id));
        }
        Ok(Self {
            id: stored.id,
            prefix: id_to_prefix(stored.id),
            tenant_group: stored.tenant_group,
            tenant_state: stored.tenant_state,
            assigned_cluster: stored.assigned_cluster,
            configuration_sequence_num: stored.configuration_sequence_num,
        })
    }
}

impl From<TenantMapEntry> for StoredTenantEntry {
    fn from(entry: TenantMapEntry) -> Self {
        Self {
            id: entry.id,
            tenant_group: entry.tenant_group,
            tenant_state: entry.tenant_state,
            assigned_cluster: entry.assigned_cluster,
            configuration_sequence_num: entry.configuration_sequence_num,
        }
    }
}

impl VersionedRecord for TenantMapEntry {
    const VERSION: u32 = 2;
}

impl TenantMapEntry {
    pub fn new(id: i64, tenant_group: Option<TenantGroupName>, tenant_state: TenantState) -> Self {
        Self {
            id,
            prefix: id_to_prefix(id),
            tenant_group,
            tenant_state,
            assigned_cluster: None,
            configuration_sequence_num: 0,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    /// `force` additionally permits leaving `Error` for `Removing`.
    pub fn transition(&mut self, next: TenantState, force: bool) -> TenantResult<()> {
        let forced_removal =
            force && self.tenant_state == TenantState::Error && next == TenantState::Removing;
        if !forced_removal && !self.tenant_state.can_transition_to(next) {
            return Err(TenantError::InvalidStateTransition {
                from: self.tenant_state,
                to: next,
            });
        }
        self.tenant_state = next;
        Ok(())
    }

    /// True when the configurable parts of both entries are equal.
    pub fn matches_configuration(&self, other: &TenantMapEntry) -> bool {
        self.tenant_group == other.tenant_group
    }

    /// Apply one configuration parameter. `None` unsets it.
    pub fn configure(&mut self, parameter: &str, value: Option<&str>) -> TenantResult<()> {
        match parameter {
            TENANT_GROUP_PARAM => {
                if let Some(group) = value {
                    validate_name(NameKind::TenantGroup, group).map_err(|e| {
                        TenantError::InvalidConfigurationValue {
                            parameter: parameter.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                }
                self.tenant_group = value.map(str::to_string);
            }
            other => return Err(TenantError::UnrecognizedParameter(other.to_string())),
        }
        self.configuration_sequence_num += 1;
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "id": self.id,
            "prefix": printable(&self.prefix),
            "tenant_state": self.tenant_state.as_str(),
            "configuration_sequence_num": self.configuration_sequence_num,
        });
        if let Some(group) = &self.tenant_group {
            obj["tenant_group"] = serde_json::Value::from(group.as_str());
        }
        if let Some(cluster) = &self.assigned_cluster {
            obj["assigned_cluster"] = serde_json::Value::from(cluster.as_str());
        }
        obj
    }
}

/// Persisted metadata of a tenant group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantGroupEntry {
    #[serde(default)]
    pub assigned_cluster: Option<ClusterName>,
}

impl VersionedRecord for TenantGroupEntry {
    const VERSION: u32 = 1;
}
