//! metagrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::unprintable;

/// Default root of the tenant metadata namespace.
pub const DEFAULT_TENANT_ROOT: &str = "\\xff/";

/// Default root of the data cluster metadata namespace.
pub const DEFAULT_CLUSTER_ROOT: &str = "\\xff/metacluster/";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetagridConfig {
    pub store: StoreConfig,
    pub metadata: MetadataConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
}

/// Roots of the reserved metadata namespaces, written with `\xNN` escapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub tenant_root: String,
    pub cluster_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metagrid.redb"),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tenant_root: DEFAULT_TENANT_ROOT.to_string(),
            cluster_root: DEFAULT_CLUSTER_ROOT.to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 100,
            initial_backoff_ms: 1,
            max_backoff_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "metactl=info,metagrid=info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl MetadataConfig {
    pub fn tenant_root_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(unprintable(&self.tenant_root)?)
    }

    pub fn cluster_root_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(unprintable(&self.cluster_root)?)
    }
}

impl MetagridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MetagridConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations whose metadata namespaces would overlap.
    pub fn validate(&self) -> anyhow::Result<()> {
        let tenant = self.metadata.tenant_root_bytes()?;
        let cluster = self.metadata.cluster_root_bytes()?;
        if tenant.is_empty() || cluster.is_empty() {
            anyhow::bail!("metadata roots must not be empty");
        }
        // The tenant namespace only uses the `tenant/` child of its root.
        let mut tenant_space = tenant.clone();
        tenant_space.extend_from_slice(b"tenant/");
        if cluster.starts_with(&tenant_space) || tenant_space.starts_with(&cluster) {
            anyhow::bail!(
                "cluster root `{}' overlaps the tenant namespace under `{}'",
                self.metadata.cluster_root,
                self.metadata.tenant_root
            );
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("unknown logging format `{other}' (expected text or json)"),
        }
        Ok(())
    }
}
