//! Cluster verbs.

use metagrid_cluster::{
    ClusterConnectionString, ClusterUsage, DataClusterEntry, DataClusterMetadata,
};
use metagrid_core::{ClusterName, TenantName};
use metagrid_tenant::TenantState;
use tracing::{info, warn};

use crate::api::MetaclusterApi;
use crate::error::MetaclusterResult;
use crate::parse::parse_cluster_configuration;

/// Result of removing a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveClusterOutcome {
    /// Tenants that were still assigned to the cluster and are now in
    /// `ERROR`, still naming the removed cluster.
    pub detached_tenants: Vec<TenantName>,
}

impl MetaclusterApi {
    pub fn register_cluster(
        &self,
        name: &str,
        connection_string: &ClusterConnectionString,
        entry: &DataClusterEntry,
    ) -> MetaclusterResult<()> {
        self.transact(|tx| {
            self.clusters
                .register_cluster(tx, name, connection_string, entry)?;
            Ok(())
        })?;
        info!(
            cluster = name,
            capacity = entry.capacity.num_tenant_groups,
            "cluster registered"
        );
        Ok(())
    }

    /// Remove a cluster. Without `force`, clusters with allocated tenant
    /// groups are rejected. With it, tenants still assigned to the cluster
    /// are moved to `ERROR` in the same transaction.
    pub fn remove_cluster(&self, name: &str, force: bool) -> MetaclusterResult<RemoveClusterOutcome> {
        let outcome = self.transact(|tx| {
            let removed = self.clusters.remove_cluster(tx, name, force)?;
            let mut detached_tenants = Vec::new();
            for tenant in removed.tenants {
                let Some(mut entry) = self.tenants.get_tenant(tx, &tenant)? else {
                    continue;
                };
                if entry.assigned_cluster.as_deref() != Some(name)
                    || entry.tenant_state == TenantState::Error
                {
                    continue;
                }
                entry.transition(TenantState::Error, false)?;
                self.tenants.update_tenant(tx, &tenant, &entry)?;
                detached_tenants.push(tenant);
            }
            Ok(RemoveClusterOutcome { detached_tenants })
        })?;

        for tenant in &outcome.detached_tenants {
            warn!(cluster = name, tenant = %tenant, "tenant left in error state by forced cluster removal");
        }
        info!(cluster = name, force, "cluster removed");
        Ok(outcome)
    }

    /// Clusters with names in `[begin, end)`, at most `limit`.
    pub fn list_clusters(
        &self,
        begin: &str,
        end: Option<&str>,
        limit: usize,
    ) -> MetaclusterResult<Vec<(ClusterName, DataClusterMetadata)>> {
        self.transact(|tx| Ok(self.clusters.list_clusters(tx, begin, end, limit)?))
    }

    pub fn get_cluster(&self, name: &str) -> MetaclusterResult<DataClusterMetadata> {
        self.transact(|tx| Ok(self.clusters.get_cluster(tx, name)?))
    }

    pub fn configure_cluster(
        &self,
        name: &str,
        connection_string: Option<ClusterConnectionString>,
        capacity: Option<ClusterUsage>,
    ) -> MetaclusterResult<DataClusterMetadata> {
        let metadata = self.transact(|tx| {
            Ok(self.clusters.configure_cluster(
                tx,
                name,
                connection_string.clone(),
                capacity,
            )?)
        })?;
        info!(
            cluster = name,
            capacity = metadata.entry.capacity.num_tenant_groups,
            "cluster configured"
        );
        Ok(metadata)
    }

    /// Apply `key=value` tokens to a cluster. Tokens are parsed against the
    /// entry read inside the transaction.
    pub fn configure_cluster_tokens<S: AsRef<str>>(
        &self,
        name: &str,
        tokens: &[S],
    ) -> MetaclusterResult<DataClusterMetadata> {
        let metadata = self.transact(|tx| {
            let current = self.clusters.get_cluster(tx, name)?;
            let update = parse_cluster_configuration(tokens, &current.entry)?;
            Ok(self.clusters.configure_cluster(
                tx,
                name,
                update.connection_string,
                update.entry.map(|entry| entry.capacity),
            )?)
        })?;
        info!(
            cluster = name,
            capacity = metadata.entry.capacity.num_tenant_groups,
            "cluster configured"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use metagrid_state::{KvStore, RetryPolicy, Subspace};

    fn api() -> MetaclusterApi {
        MetaclusterApi::new(
            KvStore::open_in_memory().unwrap(),
            &Subspace::new(b"\xff/".to_vec()),
            &Subspace::new(b"\xff/metacluster/".to_vec()),
            RetryPolicy::default(),
        )
    }

    fn conn(s: &str) -> ClusterConnectionString {
        ClusterConnectionString::parse(s).unwrap()
    }

    #[test]
    fn configure_tokens_keeps_unmentioned_fields() {
        let api = api();
        api.register_cluster("c1", &conn("host:1"), &DataClusterEntry::with_capacity(3))
            .unwrap();

        let metadata = api
            .configure_cluster_tokens("c1", &["max_tenant_groups=8"])
            .unwrap();
        assert_eq!(metadata.entry.capacity.num_tenant_groups, 8);
        assert_eq!(metadata.connection_string.as_str(), "host:1");

        let metadata = api
            .configure_cluster_tokens("c1", &["connection_string=host:2"])
            .unwrap();
        assert_eq!(metadata.entry.capacity.num_tenant_groups, 8);
        assert_eq!(metadata.connection_string.as_str(), "host:2");
    }

    #[test]
    fn configure_tokens_errors() {
        let api = api();
        let err = api
            .configure_cluster_tokens("missing", &["max_tenant_groups=1"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        api.register_cluster("c1", &conn("host:1"), &DataClusterEntry::with_capacity(3))
            .unwrap();
        let err = api
            .configure_cluster_tokens("c1", &["bogus=1"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            api.get_cluster("c1").unwrap().entry.capacity.num_tenant_groups,
            3
        );
    }

    #[test]
    fn remove_empty_cluster() {
        let api = api();
        api.register_cluster("c1", &conn("host:1"), &DataClusterEntry::with_capacity(1))
            .unwrap();
        let outcome = api.remove_cluster("c1", false).unwrap();
        assert!(outcome.detached_tenants.is_empty());
        assert_eq!(api.get_cluster("c1").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            api.remove_cluster("c1", false).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
