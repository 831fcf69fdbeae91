//! Tenant metadata collections.
//!
//! Layout under the configured root (default `\xff/`):
//!
//! | Key | Value |
//! |-----|-------|
//! | `tenant/map/<name>` | versioned [`TenantMapEntry`] |
//! | `tenant/lastId` | 8-byte big-endian id |
//! | `tenant/tombstones/<prefix>` | empty |
//! | `tenant/tenantGroup/tenantIndex/<tuple(group, name)>` | empty |
//! | `tenant/tenantGroup/map/<group>` | versioned [`TenantGroupEntry`] |
//!
//! Every operation takes the caller's transaction, which must have
//! [`TransactionOption::AccessSystemKeys`](metagrid_state::TransactionOption)
//! set when the root is in the system keyspace.

use metagrid_core::{NameKind, TenantName, printable, validate_name};
use metagrid_state::{StateError, Subspace, Transaction, VersionedRecord, strinc};
use tracing::debug;

use crate::codec::{id_to_prefix, prefix_to_id};
use crate::entry::{TenantGroupEntry, TenantMapEntry, TenantState};
use crate::error::{TenantError, TenantResult};

/// Handles to the tenant metadata collections under one root.
#[derive(Debug, Clone)]
pub struct TenantMetadata {
    tenant_map: Subspace,
    last_tenant_id: Vec<u8>,
    tombstones: Subspace,
    group_tenant_index: Subspace,
    group_map: Subspace,
}

fn utf8_name(bytes: &[u8]) -> TenantResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        TenantError::State(StateError::Deserialize(format!(
            "name {} is not UTF-8",
            printable(bytes)
        )))
    })
}

impl TenantMetadata {
    pub fn new(root: &Subspace) -> Self {
        Self {
            tenant_map: root.child(b"tenant/map/"),
            last_tenant_id: root.pack(b"tenant/lastId"),
            tombstones: root.child(b"tenant/tombstones/"),
            group_tenant_index: root.child(b"tenant/tenantGroup/tenantIndex/"),
            group_map: root.child(b"tenant/tenantGroup/map/"),
        }
    }

    fn tenant_key(&self, name: &str) -> Vec<u8> {
        self.tenant_map.pack(name.as_bytes())
    }

    fn group_index_key(&self, group: &str, name: &str) -> Vec<u8> {
        self.group_tenant_index
            .pack_tuple(&[group.as_bytes(), name.as_bytes()])
    }

    // ── Tenant map ─────────────────────────────────────────────────

    pub fn get_tenant(&self, tx: &mut Transaction, name: &str) -> TenantResult<Option<TenantMapEntry>> {
        match tx.get(&self.tenant_key(name))? {
            Some(bytes) => Ok(Some(TenantMapEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`get_tenant`](Self::get_tenant) but absent tenants are an error.
    pub fn require_tenant(&self, tx: &mut Transaction, name: &str) -> TenantResult<TenantMapEntry> {
        self.get_tenant(tx, name)?
            .ok_or_else(|| TenantError::NotFound(name.to_string()))
    }

    /// Tenants with names in `[begin, end)` in name order, at most `limit`.
    /// `end = None` reads to the end of the map.
    pub fn list_tenants(
        &self,
        tx: &mut Transaction,
        begin: &str,
        end: Option<&str>,
        limit: usize,
    ) -> TenantResult<Vec<(TenantName, TenantMapEntry)>> {
        let (range_begin, range_end) = self
            .tenant_map
            .range_between(begin.as_bytes(), end.map(str::as_bytes));
        tx.get_range(&range_begin, &range_end, limit)?
            .into_iter()
            .map(|(key, value)| -> TenantResult<(TenantName, TenantMapEntry)> {
                let suffix = self.tenant_map.unpack(&key).unwrap_or_default();
                Ok((utf8_name(suffix)?, TenantMapEntry::decode(&value)?))
            })
            .collect()
    }

    /// Register a new tenant in state `Registering` with the next unused id.
    pub fn create_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        tenant_group: Option<&str>,
    ) -> TenantResult<TenantMapEntry> {
        validate_name(NameKind::Tenant, name)?;
        if let Some(group) = tenant_group {
            validate_name(NameKind::TenantGroup, group)?;
        }
        if self.get_tenant(tx, name)?.is_some() {
            return Err(TenantError::AlreadyExists(name.to_string()));
        }

        let mut id = match self.last_tenant_id(tx)? {
            Some(last) => last.checked_add(1).ok_or(TenantError::IdSpaceExhausted)?,
            None => 0,
        };
        while self.is_tombstoned(tx, id)? {
            id = id.checked_add(1).ok_or(TenantError::IdSpaceExhausted)?;
        }

        let entry = TenantMapEntry::new(id, tenant_group.map(str::to_string), TenantState::Registering);
        if !self.tenant_data_is_empty(tx, &entry)? {
            return Err(TenantError::PrefixInUse {
                name: name.to_string(),
                prefix: printable(entry.prefix()),
            });
        }

        tx.set(&self.last_tenant_id, &id_to_prefix(id))?;
        tx.set(&self.tenant_key(name), &entry.encode()?)?;
        if let Some(group) = tenant_group {
            tx.set(&self.group_index_key(group, name), b"")?;
        }
        debug!(tenant = name, id, ?tenant_group, "tenant record created");
        Ok(entry)
    }

    /// Overwrite an existing tenant's entry, keeping the group index in step.
    pub fn update_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        entry: &TenantMapEntry,
    ) -> TenantResult<()> {
        let previous = self.require_tenant(tx, name)?;
        if previous.id() != entry.id() {
            return Err(TenantError::InvalidConfigurationValue {
                parameter: "id".to_string(),
                reason: format!("tenant ids are immutable ({} != {})", entry.id(), previous.id()),
            });
        }
        if previous.tenant_group != entry.tenant_group {
            if let Some(old) = &previous.tenant_group {
                tx.clear(&self.group_index_key(old, name))?;
            }
            if let Some(new) = &entry.tenant_group {
                tx.set(&self.group_index_key(new, name), b"")?;
            }
        }
        tx.set(&self.tenant_key(name), &entry.encode()?)?;
        debug!(tenant = name, state = %entry.tenant_state, "tenant record updated");
        Ok(())
    }

    /// Delete a tenant, tombstoning its id.
    ///
    /// A tenant whose keyspace still holds data is only deleted with `force`,
    /// which also clears that data.
    pub fn delete_tenant(
        &self,
        tx: &mut Transaction,
        name: &str,
        force: bool,
    ) -> TenantResult<TenantMapEntry> {
        let entry = self.require_tenant(tx, name)?;
        if !self.tenant_data_is_empty(tx, &entry)? {
            if !force {
                return Err(TenantError::NotEmpty(name.to_string()));
            }
            tx.clear_range(entry.prefix(), &strinc(entry.prefix()))?;
        }

        tx.clear(&self.tenant_key(name))?;
        if let Some(group) = &entry.tenant_group {
            tx.clear(&self.group_index_key(group, name))?;
        }
        tx.set(&self.tombstones.pack(entry.prefix()), b"")?;
        debug!(tenant = name, id = entry.id(), force, "tenant record deleted");
        Ok(entry)
    }

    /// True when nothing is stored under the tenant's prefix.
    pub fn tenant_data_is_empty(&self, tx: &mut Transaction, entry: &TenantMapEntry) -> TenantResult<bool> {
        let prefix = entry.prefix();
        Ok(tx.get_range(prefix, &strinc(prefix), 1)?.is_empty())
    }

    // ── Id allocation ──────────────────────────────────────────────

    pub fn last_tenant_id(&self, tx: &mut Transaction) -> TenantResult<Option<i64>> {
        tx.get(&self.last_tenant_id)?
            .map(|bytes| prefix_to_id(&bytes))
            .transpose()
    }

    pub fn is_tombstoned(&self, tx: &mut Transaction, id: i64) -> TenantResult<bool> {
        Ok(tx.get(&self.tombstones.pack(&id_to_prefix(id)))?.is_some())
    }

    /// Tombstoned ids in ascending order, at most `limit`.
    pub fn list_tombstones(&self, tx: &mut Transaction, limit: usize) -> TenantResult<Vec<i64>> {
        let (begin, end) = self.tombstones.range();
        tx.get_range(&begin, &end, limit)?
            .into_iter()
            .map(|(key, _)| prefix_to_id(self.tombstones.unpack(&key).unwrap_or_default()))
            .collect()
    }

    // ── Tenant groups ──────────────────────────────────────────────

    /// Names of tenants in `group`, in name order, at most `limit`.
    pub fn list_group_tenants(
        &self,
        tx: &mut Transaction,
        group: &str,
        limit: usize,
    ) -> TenantResult<Vec<TenantName>> {
        let group_space = Subspace::new(self.group_tenant_index.pack_tuple(&[group.as_bytes()]));
        let (begin, end) = group_space.range();
        tx.get_range(&begin, &end, limit)?
            .into_iter()
            .map(|(key, _)| -> TenantResult<TenantName> {
                let elements = self.group_tenant_index.unpack_tuple(&key)?;
                match elements.as_slice() {
                    [_, tenant] => utf8_name(tenant),
                    _ => Err(TenantError::State(StateError::Deserialize(format!(
                        "malformed tenant group index key {}",
                        printable(&key)
                    )))),
                }
            })
            .collect()
    }

    pub fn get_tenant_group(
        &self,
        tx: &mut Transaction,
        group: &str,
    ) -> TenantResult<Option<TenantGroupEntry>> {
        match tx.get(&self.group_map.pack(group.as_bytes()))? {
            Some(bytes) => Ok(Some(TenantGroupEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_tenant_group(
        &self,
        tx: &mut Transaction,
        group: &str,
        entry: &TenantGroupEntry,
    ) -> TenantResult<()> {
        tx.set(&self.group_map.pack(group.as_bytes()), &entry.encode()?)?;
        Ok(())
    }

    pub fn clear_tenant_group(&self, tx: &mut Transaction, group: &str) -> TenantResult<()> {
        tx.clear(&self.group_map.pack(group.as_bytes()))?;
        Ok(())
    }
}
