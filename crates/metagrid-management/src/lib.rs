//! metagrid-management — transactional metacluster management operations.
//!
//! [`MetaclusterApi`] exposes the cluster verbs (register, remove, list, get,
//! configure) and tenant verbs (create, delete, list, get, configure). Each
//! verb is one or more [`run_transaction`](metagrid_state::run_transaction)
//! units: conflicts with concurrent writers are retried transparently, while
//! validation failures abort immediately with a typed [`MetaclusterError`].
//!
//! Parsing of `key=value` configuration tokens lives in [`parse`] and does no
//! I/O.

pub mod api;
pub mod clusters;
pub mod error;
pub mod parse;
pub mod tenants;

pub use api::MetaclusterApi;
pub use clusters::RemoveClusterOutcome;
pub use error::{ErrorKind, MetaclusterError, MetaclusterResult};
pub use parse::{
    ClusterConfigUpdate, ConfigParseError, parse_cluster_configuration,
    parse_tenant_configuration, parse_tenant_create_options,
};
pub use tenants::TenantCreateOptions;
