//! Data cluster records.

use std::fmt;
use std::str::FromStr;

use metagrid_state::VersionedRecord;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Resource counts tracked per cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUsage {
    pub num_tenant_groups: i64,
}

impl ClusterUsage {
    pub fn new(num_tenant_groups: i64) -> Self {
        Self { num_tenant_groups }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "num_tenant_groups": self.num_tenant_groups })
    }
}

/// Capacity and live allocation of one data cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataClusterEntry {
    pub capacity: ClusterUsage,
    #[serde(default)]
    pub allocated: ClusterUsage,
}

impl VersionedRecord for DataClusterEntry {
    const VERSION: u32 = 1;
}

impl DataClusterEntry {
    pub fn with_capacity(num_tenant_groups: i64) -> Self {
        Self {
            capacity: ClusterUsage::new(num_tenant_groups),
            allocated: ClusterUsage::default(),
        }
    }

    /// True while another tenant group can be placed on the cluster.
    pub fn has_capacity(&self) -> bool {
        self.allocated.num_tenant_groups < self.capacity.num_tenant_groups
    }

    pub fn free_tenant_groups(&self) -> i64 {
        (self.capacity.num_tenant_groups - self.allocated.num_tenant_groups).max(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "capacity": self.capacity.to_json(),
            "allocated": self.allocated.to_json(),
        })
    }
}

/// Endpoint descriptor of a data cluster.
///
/// Accepted form: `[description:id@]address[,address...]`, where each address
/// is `[scheme://]host:port[:tls]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterConnectionString(String);

impl ClusterConnectionString {
    pub fn parse(value: &str) -> ClusterResult<Self> {
        let invalid = |reason: &str| ClusterError::InvalidConnectionString {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("empty"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let addresses = match value.rsplit_once('@') {
            Some((key, addresses)) => {
                match key.split_once(':') {
                    Some((description, id)) if !description.is_empty() && !id.is_empty() => {}
                    _ => return Err(invalid("cluster key must be `description:id'")),
                }
                addresses
            }
            None => value,
        };

        for address in addresses.split(',') {
            let address = address
                .split_once("://")
                .map_or(address, |(_, rest)| rest);
            let address = address.strip_suffix(":tls").unwrap_or(address);
            let (host, port) = address
                .rsplit_once(':')
                .ok_or_else(|| invalid("address is missing a port"))?;
            if host.is_empty() {
                return Err(invalid("address is missing a host"));
            }
            port.parse::<u16>()
                .map_err(|_| invalid(&format!("invalid port `{port}'")))?;
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClusterConnectionString {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClusterConnectionString {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClusterConnectionString> for String {
    fn from(value: ClusterConnectionString) -> String {
        value.0
    }
}

/// Everything the registry knows about one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataClusterMetadata {
    pub entry: DataClusterEntry,
    pub connection_string: ClusterConnectionString,
}

impl DataClusterMetadata {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "connection_string": self.connection_string.as_str(),
            "capacity": self.entry.capacity.to_json(),
            "allocated": self.entry.allocated.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_forms() {
        for ok in [
            "conn://host:1",
            "host:4500",
            "desc:abc123@10.0.0.1:4500,10.0.0.2:4500",
            "desc:abc123@10.0.0.1:4500:tls",
            "[::1]:4500",
        ] {
            assert!(ClusterConnectionString::parse(ok).is_ok(), "{ok}");
        }
        for bad in [
            "",
            "host",
            "host:notaport",
            "host:70000",
            ":4500",
            "@host:1",
            "desc@host:1",
            "host:1, host:2",
        ] {
            assert!(
                matches!(
                    ClusterConnectionString::parse(bad),
                    Err(ClusterError::InvalidConnectionString { .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn capacity_accounting() {
        let mut entry = DataClusterEntry::with_capacity(2);
        assert!(entry.has_capacity());
        entry.allocated.num_tenant_groups = 2;
        assert!(!entry.has_capacity());
        assert_eq!(entry.free_tenant_groups(), 0);
    }

    #[test]
    fn entry_without_allocation_field_decodes() {
        let bytes = br#"{"v":1,"d":{"capacity":{"num_tenant_groups":5}}}"#;
        let entry = DataClusterEntry::decode(bytes).unwrap();
        assert_eq!(entry, DataClusterEntry::with_capacity(5));
    }

    #[test]
    fn metadata_json() {
        let metadata = DataClusterMetadata {
            entry: DataClusterEntry::with_capacity(5),
            connection_string: ClusterConnectionString::parse("conn://host:1").unwrap(),
        };
        let json = metadata.to_json();
        assert_eq!(json["connection_string"], "conn://host:1");
        assert_eq!(json["capacity"]["num_tenant_groups"], 5);
        assert_eq!(json["allocated"]["num_tenant_groups"], 0);
    }
}
