//! The management entry point.

use anyhow::Context;
use metagrid_cluster::ClusterRegistry;
use metagrid_core::MetagridConfig;
use metagrid_state::{KvStore, RetryPolicy, Subspace, Transaction, TransactionOption, run_transaction};
use metagrid_tenant::TenantMetadata;

use crate::error::MetaclusterResult;

/// Default number of entries returned by list verbs.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Cluster and tenant management over one store.
///
/// Holds no mutable state of its own; concurrent callers may share it freely
/// and rely on the store's conflict detection.
#[derive(Clone)]
pub struct MetaclusterApi {
    pub(crate) store: KvStore,
    pub(crate) tenants: TenantMetadata,
    pub(crate) clusters: ClusterRegistry,
    retry: RetryPolicy,
}

impl MetaclusterApi {
    pub fn new(
        store: KvStore,
        tenant_root: &Subspace,
        cluster_root: &Subspace,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            tenants: TenantMetadata::new(tenant_root),
            clusters: ClusterRegistry::new(cluster_root),
            retry,
        }
    }

    /// Build from the `[metadata]` and `[retry]` sections of `config`.
    pub fn from_config(store: KvStore, config: &MetagridConfig) -> anyhow::Result<Self> {
        let tenant_root = config
            .metadata
            .tenant_root_bytes()
            .context("invalid metadata.tenant_root")?;
        let cluster_root = config
            .metadata
            .cluster_root_bytes()
            .context("invalid metadata.cluster_root")?;
        Ok(Self::new(
            store,
            &Subspace::new(tenant_root),
            &Subspace::new(cluster_root),
            RetryPolicy::from(&config.retry),
        ))
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Run `body` with system-key access, retrying on conflicts.
    pub(crate) fn transact<T, F>(&self, mut body: F) -> MetaclusterResult<T>
    where
        F: FnMut(&mut Transaction) -> MetaclusterResult<T>,
    {
        run_transaction(&self.store, &self.retry, |tx| {
            tx.set_option(TransactionOption::AccessSystemKeys);
            body(tx)
        })
    }
}
