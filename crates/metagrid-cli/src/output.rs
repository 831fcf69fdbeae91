//! Rendering of command results: JSON envelopes and plain text.

use metagrid_cluster::DataClusterMetadata;
use metagrid_management::MetaclusterError;
use metagrid_tenant::TenantMapEntry;
use serde_json::{Value, json};

/// `{"type": "success", <key>: <value>}`
pub fn success(key: &str, value: Value) -> Value {
    let mut obj = json!({ "type": "success" });
    obj[key] = value;
    obj
}

/// `{"type": "error", "error": <message>, "kind": <error kind>}`
pub fn error(err: &MetaclusterError) -> Value {
    json!({
        "type": "error",
        "error": err.to_string(),
        "kind": err.kind().as_str(),
    })
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One `  N. name` line per name.
pub fn numbered_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("  {}. {}\n", i + 1, name.as_ref()))
        .collect()
}

pub fn cluster_text(metadata: &DataClusterMetadata) -> String {
    format!(
        "  connection string: {}\n  tenant group capacity: {}\n  allocated tenant groups: {}\n",
        metadata.connection_string,
        metadata.entry.capacity.num_tenant_groups,
        metadata.entry.allocated.num_tenant_groups,
    )
}

pub fn tenant_text(entry: &TenantMapEntry) -> String {
    let mut text = format!(
        "  id: {}\n  prefix: {}\n  tenant state: {}\n",
        entry.id(),
        metagrid_core::printable(entry.prefix()),
        entry.tenant_state,
    );
    if let Some(group) = &entry.tenant_group {
        text.push_str(&format!("  tenant group: {group}\n"));
    }
    if let Some(cluster) = &entry.assigned_cluster {
        text.push_str(&format!("  assigned cluster: {cluster}\n"));
    }
    text
}
