//! metagrid-tenant — tenant metadata for Metagrid.
//!
//! A tenant is an isolated keyspace addressed by an 8-byte prefix derived
//! from its integer id ([`codec`]). Its [`TenantMapEntry`] lives in the tenant
//! map of a [`TenantMetadata`] namespace together with the last-allocated id,
//! the tombstones of deleted ids, and the tenant group index. All
//! [`TenantMetadata`] operations run inside a caller-supplied transaction so
//! several of them commit atomically.

pub mod codec;
pub mod entry;
pub mod error;
pub mod metadata;

pub use codec::{PREFIX_SIZE, id_to_prefix, prefix_to_id};
pub use entry::{TenantGroupEntry, TenantMapEntry, TenantState};
pub use error::{TenantError, TenantResult};
pub use metadata::TenantMetadata;
