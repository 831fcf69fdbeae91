//! Data cluster registry.
//!
//! Layout under the configured root (default `\xff/metacluster/`):
//!
//! | Key | Value |
//! |-----|-------|
//! | `dataCluster/metadata/<name>` | versioned [`DataClusterEntry`] |
//! | `dataCluster/connectionString/<name>` | connection string |
//! | `dataCluster/tenantIndex/<tuple(cluster, tenant)>` | empty |

use metagrid_core::{ClusterName, NameKind, TenantName, printable, validate_name};
use metagrid_state::{StateError, Subspace, Transaction, VersionedRecord};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::types::{ClusterConnectionString, ClusterUsage, DataClusterEntry, DataClusterMetadata};

/// Handles to the data cluster collections under one root.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    metadata: Subspace,
    connection_strings: Subspace,
    tenant_index: Subspace,
}

/// What a cluster removal left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedCluster {
    pub metadata: DataClusterMetadata,
    /// Tenants that were still placed on the cluster.
    pub tenants: Vec<TenantName>,
}

fn decode_name(bytes: &[u8]) -> ClusterResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        ClusterError::State(StateError::Deserialize(format!(
            "name {} is not UTF-8",
            printable(bytes)
        )))
    })
}

fn check_capacity(usage: &ClusterUsage) -> ClusterResult<()> {
    if usage.num_tenant_groups < 0 {
        return Err(ClusterError::InvalidCapacity(
            usage.num_tenant_groups.to_string(),
        ));
    }
    Ok(())
}

impl ClusterRegistry {
    pub fn new(root: &Subspace) -> Self {
        Self {
            metadata: root.child(b"dataCluster/metadata/"),
            connection_strings: root.child(b"dataCluster/connectionString/"),
            tenant_index: root.child(b"dataCluster/tenantIndex/"),
        }
    }

    fn read_connection_string(
        &self,
        tx: &mut Transaction,
        name: &str,
    ) -> ClusterResult<ClusterConnectionString> {
        let bytes = tx
            .get(&self.connection_strings.pack(name.as_bytes()))?
            .ok_or_else(|| {
                ClusterError::State(StateError::Deserialize(format!(
                    "cluster `{name}' has metadata but no connection string"
                )))
            })?;
        let value = decode_name(&bytes)?;
        ClusterConnectionString::parse(&value).map_err(|e| {
            ClusterError::State(StateError::Deserialize(format!(
                "stored connection string for `{name}': {e}"
            )))
        })
    }

    fn write(
        &self,
        tx: &mut Transaction,
        name: &str,
        metadata: &DataClusterMetadata,
    ) -> ClusterResult<()> {
        tx.set(&self.metadata.pack(name.as_bytes()), &metadata.entry.encode()?)?;
        tx.set(
            &self.connection_strings.pack(name.as_bytes()),
            metadata.connection_string.as_str().as_bytes(),
        )?;
        Ok(())
    }

    pub fn try_get_cluster(
        &self,
        tx: &mut Transaction,
        name: &str,
    ) -> ClusterResult<Option<DataClusterMetadata>> {
        let Some(bytes) = tx.get(&self.metadata.pack(name.as_bytes()))? else {
            return Ok(None);
        };
        let entry = DataClusterEntry::decode(&bytes)?;
        let connection_string = self.read_connection_string(tx, name)?;
        Ok(Some(DataClusterMetadata {
            entry,
            connection_string,
        }))
    }

    pub fn get_cluster(&self, tx: &mut Transaction, name: &str) -> ClusterResult<DataClusterMetadata> {
        self.try_get_cluster(tx, name)?
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }

    /// Register a new cluster. Its allocation always starts at zero.
    pub fn register_cluster(
        &self,
        tx: &mut Transaction,
        name: &str,
        connection_string: &ClusterConnectionString,
        entry: &DataClusterEntry,
    ) -> ClusterResult<()> {
        validate_name(NameKind::Cluster, name)?;
        check_capacity(&entry.capacity)?;
        if self.try_get_cluster(tx, name)?.is_some() {
            return Err(ClusterError::AlreadyExists(name.to_string()));
        }

        let metadata = DataClusterMetadata {
            entry: DataClusterEntry {
                capacity: entry.capacity,
                allocated: ClusterUsage::default(),
            },
            connection_string: connection_string.clone(),
        };
        self.write(tx, name, &metadata)?;
        debug!(cluster = name, capacity = entry.capacity.num_tenant_groups, "cluster registered");
        Ok(())
    }

    /// Remove a cluster. Clusters with allocated tenant groups are only
    /// removed with `force`; the tenants found on the cluster are returned.
    pub fn remove_cluster(
        &self,
        tx: &mut Transaction,
        name: &str,
        force: bool,
    ) -> ClusterResult<RemovedCluster> {
        let metadata = self.get_cluster(tx, name)?;
        let allocated = metadata.entry.allocated.num_tenant_groups;
        if allocated > 0 && !force {
            return Err(ClusterError::NotEmpty {
                name: name.to_string(),
                allocated,
            });
        }

        let tenants = self.list_cluster_tenants(tx, name, usize::MAX)?;
        let (begin, end) = Subspace::new(self.tenant_index.pack_tuple(&[name.as_bytes()])).range();
        tx.clear_range(&begin, &end)?;
        tx.clear(&self.metadata.pack(name.as_bytes()))?;
        tx.clear(&self.connection_strings.pack(name.as_bytes()))?;
        debug!(cluster = name, force, tenants = tenants.len(), "cluster removed");
        Ok(RemovedCluster { metadata, tenants })
    }

    /// Clusters with names in `[begin, end)` in name order, at most `limit`.
    /// `end = None` reads to the end of the registry.
    pub fn list_clusters(
        &self,
        tx: &mut Transaction,
        begin: &str,
        end: Option<&str>,
        limit: usize,
    ) -> ClusterResult<Vec<(ClusterName, DataClusterMetadata)>> {
        let (range_begin, range_end) = self
            .metadata
            .range_between(begin.as_bytes(), end.map(str::as_bytes));
        let mut clusters = Vec::new();
        for (key, value) in tx.get_range(&range_begin, &range_end, limit)? {
            let name = decode_name(self.metadata.unpack(&key).unwrap_or_default())?;
            let entry = DataClusterEntry::decode(&value)?;
            let connection_string = self.read_connection_string(tx, &name)?;
            clusters.push((
                name,
                DataClusterMetadata {
                    entry,
                    connection_string,
                },
            ));
        }
        Ok(clusters)
    }

    /// Update a cluster's connection string and/or capacity. The stored
    /// allocation is kept; capacity may not drop below it.
    pub fn configure_cluster(
        &self,
        tx: &mut Transaction,
        name: &str,
        connection_string: Option<ClusterConnectionString>,
        capacity: Option<ClusterUsage>,
    ) -> ClusterResult<DataClusterMetadata> {
        let mut metadata = self.get_cluster(tx, name)?;
        if let Some(capacity) = capacity {
            check_capacity(&capacity)?;
            let allocated = metadata.entry.allocated.num_tenant_groups;
            if capacity.num_tenant_groups < allocated {
                return Err(ClusterError::CapacityBelowAllocation {
                    name: name.to_string(),
                    capacity: capacity.num_tenant_groups,
                    allocated,
                });
            }
            metadata.entry.capacity = capacity;
        }
        if let Some(connection_string) = connection_string {
            metadata.connection_string = connection_string;
        }
        self.write(tx, name, &metadata)?;
        debug!(
            cluster = name,
            capacity = metadata.entry.capacity.num_tenant_groups,
            "cluster configured"
        );
        Ok(metadata)
    }

    /// Change a cluster's allocated tenant groups by `delta`. Growth past the
    /// configured capacity is rejected.
    pub fn adjust_allocation(
        &self,
        tx: &mut Transaction,
        name: &str,
        delta: i64,
    ) -> ClusterResult<DataClusterEntry> {
        let mut metadata = self.get_cluster(tx, name)?;
        if delta == 0 {
            return Ok(metadata.entry);
        }
        let entry = &mut metadata.entry;
        let allocated = (entry.allocated.num_tenant_groups + delta).max(0);
        if delta > 0 && allocated > entry.capacity.num_tenant_groups {
            return Err(ClusterError::AtCapacity {
                name: name.to_string(),
                capacity: entry.capacity.num_tenant_groups,
            });
        }
        entry.allocated.num_tenant_groups = allocated;
        tx.set(&self.metadata.pack(name.as_bytes()), &entry.encode()?)?;
        debug!(cluster = name, delta, allocated, "cluster allocation adjusted");
        Ok(metadata.entry)
    }

    // ── Cluster → tenant index ─────────────────────────────────────

    pub fn add_cluster_tenant(&self, tx: &mut Transaction, cluster: &str, tenant: &str) -> ClusterResult<()> {
        tx.set(
            &self.tenant_index.pack_tuple(&[cluster.as_bytes(), tenant.as_bytes()]),
            b"",
        )?;
        Ok(())
    }

    pub fn remove_cluster_tenant(
        &self,
        tx: &mut Transaction,
        cluster: &str,
        tenant: &str,
    ) -> ClusterResult<()> {
        tx.clear(&self.tenant_index.pack_tuple(&[cluster.as_bytes(), tenant.as_bytes()]))?;
        Ok(())
    }

    /// True while `tenant` is indexed under `cluster`. Forced removal clears
    /// the index, so tenants stranded by it are not.
    pub fn has_cluster_tenant(
        &self,
        tx: &mut Transaction,
        cluster: &str,
        tenant: &str,
    ) -> ClusterResult<bool> {
        let key = self.tenant_index.pack_tuple(&[cluster.as_bytes(), tenant.as_bytes()]);
        Ok(tx.get(&key)?.is_some())
    }

    /// Names of the tenants placed on `cluster`, in name order.
    pub fn list_cluster_tenants(
        &self,
        tx: &mut Transaction,
        cluster: &str,
        limit: usize,
    ) -> ClusterResult<Vec<TenantName>> {
        let (begin, end) = Subspace::new(self.tenant_index.pack_tuple(&[cluster.as_bytes()])).range();
        let mut tenants = Vec::new();
        for (key, _) in tx.get_range(&begin, &end, limit)? {
            match self.tenant_index.unpack_tuple(&key)?.as_slice() {
                [_, tenant] => tenants.push(decode_name(tenant)?),
                _ => {
                    return Err(ClusterError::State(StateError::Deserialize(format!(
                        "malformed cluster tenant index key {}",
                        printable(&key)
                    ))));
                }
            }
        }
        Ok(tenants)
    }
}
