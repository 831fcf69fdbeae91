//! redb table definitions for the Metagrid state store.
//!
//! The whole keyspace is one ordered byte table. Per-key last-write versions
//! back commit-time conflict detection.

use redb::TableDefinition;

/// Key-value data, ordered by raw key bytes.
pub const KV: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Commit version of the last write (set or clear) to each key.
pub const KV_VERSIONS: TableDefinition<&[u8], u64> = TableDefinition::new("kv_versions");

/// Store-wide counters keyed by name.
pub const KV_META: TableDefinition<&str, u64> = TableDefinition::new("kv_meta");

/// Key in [`KV_META`] holding the latest committed version.
pub const COMMIT_VERSION: &str = "commit_version";
