//! Tenant verbs and tenant-group capacity accounting.
//!
//! Every tenant group, and every tenant without a group, holds one
//! tenant-group slot on its assigned cluster. Tenants created while no
//! cluster is registered are standalone and hold no slot.

use metagrid_cluster::ClusterError;
use metagrid_core::{ClusterName, TenantName};
use metagrid_state::Transaction;
use metagrid_tenant::{TenantError, TenantGroupEntry, TenantMapEntry, TenantState};
use tracing::{debug, info};

use crate::api::MetaclusterApi;
use crate::error::{MetaclusterError, MetaclusterResult};

/// Placement inputs for [`MetaclusterApi::create_tenant`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantCreateOptions {
    pub tenant_group: Option<String>,
    /// Pin the tenant to this cluster instead of choosing one.
    pub assigned_cluster: Option<String>,
}

fn describe_cluster(cluster: &Option<ClusterName>) -> String {
    match cluster {
        Some(name) => format!("cluster `{name}'"),
        None => "no cluster".to_string(),
    }
}

impl MetaclusterApi {
    /// Create a tenant: reserve it in `REGISTERING` with placement and
    /// capacity applied, then mark it `READY`.
    pub fn create_tenant(
        &self,
        name: &str,
        options: &TenantCreateOptions,
    ) -> MetaclusterResult<TenantMapEntry> {
        let created = self.transact(|tx| {
            let mut entry =
                self.tenants
                    .create_tenant(tx, name, options.tenant_group.as_deref())?;
            entry.assigned_cluster = self.place_tenant(tx, name, options)?;
            if let Some(cluster) = &entry.assigned_cluster {
                self.tenants.update_tenant(tx, name, &entry)?;
                self.clusters.add_cluster_tenant(tx, cluster, name)?;
            }
            Ok(entry)
        })?;

        let entry = self.transact(|tx| {
            let mut entry = self.require_same_tenant(tx, name, created.id())?;
            if entry.tenant_state == TenantState::Registering {
                entry.transition(TenantState::Ready, false)?;
                self.tenants.update_tenant(tx, name, &entry)?;
            }
            Ok(entry)
        })?;

        info!(
            tenant = name,
            id = entry.id(),
            tenant_group = ?entry.tenant_group,
            cluster = ?entry.assigned_cluster,
            "tenant created"
        );
        Ok(entry)
    }

    /// Delete a tenant: mark it `REMOVING`, then delete the record, tombstone
    /// its id and release its capacity. A tenant holding data is only
    /// deleted with `force`, as is a tenant in `ERROR`.
    pub fn delete_tenant(&self, name: &str, force: bool) -> MetaclusterResult<TenantMapEntry> {
        let id = self.transact(|tx| {
            let mut entry = self.tenants.require_tenant(tx, name)?;
            match entry.tenant_state {
                TenantState::Removing => return Ok(entry.id()),
                TenantState::Error if !force => {
                    return Err(MetaclusterError::InvalidTenantState {
                        name: name.to_string(),
                        state: entry.tenant_state,
                        action: "deleted without force",
                    });
                }
                _ => {}
            }
            if !force && !self.tenants.tenant_data_is_empty(tx, &entry)? {
                return Err(TenantError::NotEmpty(name.to_string()).into());
            }
            entry.transition(TenantState::Removing, force)?;
            self.tenants.update_tenant(tx, name, &entry)?;
            Ok(entry.id())
        })?;

        let removed = self.transact(|tx| {
            let entry = self.require_same_tenant(tx, name, id)?;
            if entry.tenant_state != TenantState::Removing {
                return Err(MetaclusterError::InvalidTenantState {
                    name: name.to_string(),
                    state: entry.tenant_state,
                    action: "deleted",
                });
            }
            let removed = self.tenants.delete_tenant(tx, name, force)?;
            self.release_tenant(tx, name, &removed)?;
            Ok(removed)
        })?;

        info!(tenant = name, id, force, "tenant deleted");
        Ok(removed)
    }

    pub fn get_tenant(&self, name: &str) -> MetaclusterResult<TenantMapEntry> {
        self.transact(|tx| Ok(self.tenants.require_tenant(tx, name)?))
    }

    /// Tenants with names in `[begin, end)`, at most `limit`.
    pub fn list_tenants(
        &self,
        begin: &str,
        end: Option<&str>,
        limit: usize,
    ) -> MetaclusterResult<Vec<(TenantName, TenantMapEntry)>> {
        self.transact(|tx| Ok(self.tenants.list_tenants(tx, begin, end, limit)?))
    }

    pub fn list_group_tenants(&self, group: &str, limit: usize) -> MetaclusterResult<Vec<TenantName>> {
        self.transact(|tx| Ok(self.tenants.list_group_tenants(tx, group, limit)?))
    }

    pub fn get_tenant_group(&self, group: &str) -> MetaclusterResult<Option<TenantGroupEntry>> {
        self.transact(|tx| Ok(self.tenants.get_tenant_group(tx, group)?))
    }

    /// Tenants assigned to `cluster`, in name order.
    pub fn list_cluster_tenants(&self, cluster: &str, limit: usize) -> MetaclusterResult<Vec<TenantName>> {
        self.transact(|tx| Ok(self.clusters.list_cluster_tenants(tx, cluster, limit)?))
    }

    /// Apply configuration parameters to a tenant.
    ///
    /// A change moves the tenant to `UPDATING_CONFIGURATION` with a bumped
    /// sequence number, then back to `READY` unless a newer configuration
    /// has started meanwhile. Parameters matching the current configuration
    /// change nothing.
    pub fn configure_tenant(
        &self,
        name: &str,
        params: &[(String, Option<String>)],
    ) -> MetaclusterResult<TenantMapEntry> {
        let pending = self.transact(|tx| {
            let entry = self.tenants.require_tenant(tx, name)?;
            match entry.tenant_state {
                TenantState::Ready | TenantState::UpdatingConfiguration => {}
                state => {
                    return Err(MetaclusterError::InvalidTenantState {
                        name: name.to_string(),
                        state,
                        action: "configured",
                    });
                }
            }

            let mut updated = entry.clone();
            for (param, value) in params {
                updated.configure(param, value.as_deref())?;
            }
            if updated.matches_configuration(&entry) {
                return Ok(match entry.tenant_state {
                    TenantState::UpdatingConfiguration => Some(entry.configuration_sequence_num),
                    _ => None,
                });
            }

            self.move_tenant_group(tx, name, &entry, &updated)?;
            if updated.tenant_state == TenantState::Ready {
                updated.transition(TenantState::UpdatingConfiguration, false)?;
            }
            self.tenants.update_tenant(tx, name, &updated)?;
            Ok(Some(updated.configuration_sequence_num))
        })?;

        let Some(sequence_num) = pending else {
            debug!(tenant = name, "tenant configuration unchanged");
            return self.get_tenant(name);
        };

        let entry = self.transact(|tx| {
            let mut entry = self.tenants.require_tenant(tx, name)?;
            if entry.tenant_state == TenantState::UpdatingConfiguration
                && entry.configuration_sequence_num == sequence_num
            {
                entry.transition(TenantState::Ready, false)?;
                self.tenants.update_tenant(tx, name, &entry)?;
            }
            Ok(entry)
        })?;

        info!(
            tenant = name,
            sequence_num,
            tenant_group = ?entry.tenant_group,
            "tenant configured"
        );
        Ok(entry)
    }

    // ── Placement and accounting ───────────────────────────────────

    fn require_same_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        id: i64,
    ) -> MetaclusterResult<TenantMapEntry> {
        match self.tenants.get_tenant(tx, name)? {
            Some(entry) if entry.id() == id => Ok(entry),
            _ => Err(TenantError::NotFound(name.to_string()).into()),
        }
    }

    /// Choose the cluster for a new tenant and take its slot. Joining an
    /// existing group reuses the group's cluster and slot.
    fn place_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        options: &TenantCreateOptions,
    ) -> MetaclusterResult<Option<ClusterName>> {
        if let Some(group) = &options.tenant_group {
            if let Some(existing) = self.live_tenant_group(tx, group, name)? {
                if let Some(requested) = &options.assigned_cluster {
                    if existing.assigned_cluster.as_ref() != Some(requested) {
                        return Err(MetaclusterError::TenantGroupClusterMismatch {
                            group: group.clone(),
                            assigned: describe_cluster(&existing.assigned_cluster),
                            requested: describe_cluster(&Some(requested.clone())),
                        });
                    }
                }
                return Ok(existing.assigned_cluster);
            }
        }

        let cluster = match &options.assigned_cluster {
            Some(requested) => Some(requested.clone()),
            None => self.pick_cluster(tx)?,
        };
        if let Some(cluster) = &cluster {
            self.clusters.adjust_allocation(tx, cluster, 1)?;
        }
        if let Some(group) = &options.tenant_group {
            self.tenants.set_tenant_group(
                tx,
                group,
                &TenantGroupEntry {
                    assigned_cluster: cluster.clone(),
                },
            )?;
        }
        Ok(cluster)
    }

    /// The group map entry of `group`, as seen by `joining`. A group whose
    /// members lost their cluster to a forced removal cannot be joined until
    /// they are deleted.
    fn live_tenant_group(
        &self,
        tx: &mut Transaction,
        group: &str,
        joining: &str,
    ) -> MetaclusterResult<Option<TenantGroupEntry>> {
        let Some(existing) = self.tenants.get_tenant_group(tx, group)? else {
            return Ok(None);
        };
        let Some(cluster) = &existing.assigned_cluster else {
            return Ok(Some(existing));
        };
        let member = self
            .tenants
            .list_group_tenants(tx, group, 2)?
            .into_iter()
            .find(|member| member != joining);
        let placed = match member {
            Some(member) => self.clusters.has_cluster_tenant(tx, cluster, &member)?,
            None => self.clusters.try_get_cluster(tx, cluster)?.is_some(),
        };
        if !placed {
            return Err(MetaclusterError::StrandedTenantGroup {
                group: group.to_string(),
                cluster: cluster.clone(),
            });
        }
        Ok(Some(existing))
    }

    /// The registered cluster with the most free capacity, ties going to the
    /// first name. `None` when no cluster is registered.
    fn pick_cluster(&self, tx: &mut Transaction) -> MetaclusterResult<Option<ClusterName>> {
        let clusters = self.clusters.list_clusters(tx, "", None, usize::MAX)?;
        if clusters.is_empty() {
            return Ok(None);
        }
        let mut best: Option<(ClusterName, i64)> = None;
        for (name, metadata) in clusters {
            let free = metadata.entry.free_tenant_groups();
            if free > 0 && best.as_ref().is_none_or(|(_, most)| free > *most) {
                best = Some((name, free));
            }
        }
        match best {
            Some((name, _)) => Ok(Some(name)),
            None => Err(ClusterError::NoCapacity.into()),
        }
    }

    /// Undo the bookkeeping of a deleted tenant: cluster index entry, group
    /// map entry once the group is empty, and the slot it held. A tenant
    /// stranded by forced cluster removal is no longer indexed and holds no
    /// slot, even if a cluster of the same name was registered since.
    fn release_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        removed: &TenantMapEntry,
    ) -> MetaclusterResult<()> {
        let placed = match &removed.assigned_cluster {
            Some(cluster) => {
                let placed = self.clusters.has_cluster_tenant(tx, cluster, name)?;
                if placed {
                    self.clusters.remove_cluster_tenant(tx, cluster, name)?;
                }
                placed
            }
            None => false,
        };
        let frees_slot = match &removed.tenant_group {
            Some(group) => {
                if self.tenants.list_group_tenants(tx, group, 1)?.is_empty() {
                    self.tenants.clear_tenant_group(tx, group)?;
                    true
                } else {
                    false
                }
            }
            None => true,
        };
        if frees_slot && placed {
            self.release_slot(tx, &removed.assigned_cluster)?;
        }
        Ok(())
    }

    /// Return one slot to `cluster`, if it is still registered.
    fn release_slot(&self, tx: &mut Transaction, cluster: &Option<ClusterName>) -> MetaclusterResult<()> {
        if let Some(cluster) = cluster {
            if self.clusters.try_get_cluster(tx, cluster)?.is_some() {
                self.clusters.adjust_allocation(tx, cluster, -1)?;
            }
        }
        Ok(())
    }

    /// Account for a tenant moving between groups on its cluster.
    fn move_tenant_group(
        &self,
        tx: &mut Transaction,
        name: &str,
        before: &TenantMapEntry,
        after: &TenantMapEntry,
    ) -> MetaclusterResult<()> {
        if before.tenant_group == after.tenant_group {
            return Ok(());
        }
        let cluster = &before.assigned_cluster;

        let joins_new_slot = match &after.tenant_group {
            Some(group) => match self.live_tenant_group(tx, group, name)? {
                Some(existing) if existing.assigned_cluster != *cluster => {
                    return Err(MetaclusterError::TenantGroupClusterMismatch {
                        group: group.clone(),
                        assigned: describe_cluster(&existing.assigned_cluster),
                        requested: describe_cluster(cluster),
                    });
                }
                Some(_) => false,
                None => {
                    self.tenants.set_tenant_group(
                        tx,
                        group,
                        &TenantGroupEntry {
                            assigned_cluster: cluster.clone(),
                        },
                    )?;
                    true
                }
            },
            None => true,
        };

        let leaves_slot = match &before.tenant_group {
            Some(group) => {
                let others = self
                    .tenants
                    .list_group_tenants(tx, group, 2)?
                    .into_iter()
                    .filter(|member| member != name)
                    .count();
                if others == 0 {
                    self.tenants.clear_tenant_group(tx, group)?;
                    true
                } else {
                    false
                }
            }
            None => true,
        };

        match (joins_new_slot, leaves_slot) {
            (true, false) => {
                if let Some(cluster) = cluster {
                    self.clusters.adjust_allocation(tx, cluster, 1)?;
                }
            }
            (false, true) => self.release_slot(tx, cluster)?,
            _ => {}
        }
        Ok(())
    }
}
