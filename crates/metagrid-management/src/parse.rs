//! Parsing of `key=value` configuration tokens.
//!
//! Nothing here touches the store: callers pass the baseline entry read in
//! their own transaction.

use metagrid_cluster::{ClusterConnectionString, DataClusterEntry};
use metagrid_tenant::entry::TENANT_GROUP_PARAM;
use thiserror::Error;

use crate::tenants::TenantCreateOptions;

pub const MAX_TENANT_GROUPS_PARAM: &str = "max_tenant_groups";
pub const CONNECTION_STRING_PARAM: &str = "connection_string";
pub const ASSIGNED_CLUSTER_PARAM: &str = "assigned_cluster";
const UNSET: &str = "unset";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigParseError {
    #[error("invalid number of tenant groups {0}")]
    InvalidTenantGroupCount(String),

    #[error("invalid connection string {value}: {reason}")]
    InvalidConnectionString { value: String, reason: String },

    #[error("unrecognized configuration parameter {0}")]
    UnrecognizedParameter(String),

    #[error("configuration parameter {0} specified more than once")]
    DuplicateParameter(String),

    #[error("configuration parameter {0} requires a value")]
    MissingValue(String),

    #[error("invalid configuration token {0}")]
    InvalidToken(String),

    #[error("connection_string must be configured when registering a cluster")]
    MissingConnectionString,
}

/// Overrides produced by [`parse_cluster_configuration`]. `entry` is the
/// baseline with the capacity replaced, present only if capacity was set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfigUpdate {
    pub connection_string: Option<ClusterConnectionString>,
    pub entry: Option<DataClusterEntry>,
}

fn split_token(token: &str) -> (&str, &str) {
    token.split_once('=').unwrap_or((token, ""))
}

/// Parse `max_tenant_groups=<N>` and `connection_string=<S>` tokens against
/// `defaults`. The first bad token fails the whole parse.
pub fn parse_cluster_configuration<S: AsRef<str>>(
    tokens: &[S],
    defaults: &DataClusterEntry,
) -> Result<ClusterConfigUpdate, ConfigParseError> {
    let mut update = ClusterConfigUpdate::default();

    for token in tokens {
        let (param, value) = split_token(token.as_ref());
        match param {
            MAX_TENANT_GROUPS_PARAM => {
                let count = value
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| ConfigParseError::InvalidTenantGroupCount(value.to_string()))?;
                let mut entry = *defaults;
                entry.capacity.num_tenant_groups = count;
                update.entry = Some(entry);
            }
            CONNECTION_STRING_PARAM => {
                let connection_string = ClusterConnectionString::parse(value).map_err(|e| {
                    ConfigParseError::InvalidConnectionString {
                        value: value.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                update.connection_string = Some(connection_string);
            }
            other => return Err(ConfigParseError::UnrecognizedParameter(other.to_string())),
        }
    }

    Ok(update)
}

/// Parse tenant configuration tokens into `(parameter, value)` pairs.
///
/// `param=value` sets a parameter; `unset param` clears it. Parameter names
/// are not checked here, the tenant entry rejects unknown ones.
pub fn parse_tenant_configuration<S: AsRef<str>>(
    tokens: &[S],
) -> Result<Vec<(String, Option<String>)>, ConfigParseError> {
    let mut params: Vec<(String, Option<String>)> = Vec::new();
    let mut unset_next = false;

    for token in tokens {
        let token = token.as_ref();
        if token == UNSET {
            if unset_next {
                return Err(ConfigParseError::InvalidToken(token.to_string()));
            }
            unset_next = true;
            continue;
        }

        let (param, value) = match token.split_once('=') {
            Some(_) if unset_next => return Err(ConfigParseError::InvalidToken(token.to_string())),
            Some((param, value)) => (param, Some(value.to_string())),
            None if unset_next => (token, None),
            None => return Err(ConfigParseError::MissingValue(token.to_string())),
        };
        unset_next = false;

        if param.is_empty() {
            return Err(ConfigParseError::InvalidToken(token.to_string()));
        }
        if params.iter().any(|(p, _)| p == param) {
            return Err(ConfigParseError::DuplicateParameter(param.to_string()));
        }
        params.push((param.to_string(), value));
    }

    if unset_next {
        return Err(ConfigParseError::InvalidToken(UNSET.to_string()));
    }
    Ok(params)
}

/// Parse `tenant_group=<G>` and `assigned_cluster=<C>` tokens given to
/// tenant creation.
pub fn parse_tenant_create_options<S: AsRef<str>>(
    tokens: &[S],
) -> Result<TenantCreateOptions, ConfigParseError> {
    let mut options = TenantCreateOptions::default();
    for (param, value) in parse_tenant_configuration(tokens)? {
        let Some(value) = value else {
            return Err(ConfigParseError::InvalidToken(format!("{UNSET} {param}")));
        };
        match param.as_str() {
            TENANT_GROUP_PARAM => options.tenant_group = Some(value),
            ASSIGNED_CLUSTER_PARAM => options.assigned_cluster = Some(value),
            _ => return Err(ConfigParseError::UnrecognizedParameter(param)),
        }
    }
    Ok(options)
}
