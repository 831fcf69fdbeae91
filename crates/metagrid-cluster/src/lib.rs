//! metagrid-cluster — registry of the data clusters in a metacluster.
//!
//! Each registered cluster has a connection string and a
//! [`DataClusterEntry`] tracking its configured tenant group capacity against
//! the number of tenant groups currently allocated to it. The registry also
//! keeps a cluster → tenant index so the tenants placed on a cluster can be
//! found when it is removed.

pub mod error;
pub mod registry;
pub mod types;

pub use error::{ClusterError, ClusterResult};
pub use registry::{ClusterRegistry, RemovedCluster};
pub use types::{ClusterConnectionString, ClusterUsage, DataClusterEntry, DataClusterMetadata};
