use metagrid_cluster::DataClusterEntry;
use metagrid_management::{ConfigParseError, MetaclusterApi, parse_cluster_configuration};

use super::{Reported, json_flag, list_limit, split_force};
use crate::output;

pub fn register(api: &MetaclusterApi, name: &str, params: &[String]) -> anyhow::Result<()> {
    let update = parse_cluster_configuration(params, &DataClusterEntry::default())?;
    let connection_string = update
        .connection_string
        .ok_or(ConfigParseError::MissingConnectionString)?;
    let entry = update.entry.unwrap_or_default();

    api.register_cluster(name, &connection_string, &entry)?;
    println!("The cluster `{name}' has been added");
    Ok(())
}

pub fn remove(api: &MetaclusterApi, args: &[String]) -> anyhow::Result<()> {
    let (force, name) = split_force(args)?;
    let outcome = api.remove_cluster(name, force)?;
    for tenant in &outcome.detached_tenants {
        println!("  tenant `{tenant}' was left in the error state");
    }
    println!("The cluster `{name}' has been removed");
    Ok(())
}

pub fn list(
    api: &MetaclusterApi,
    begin: Option<&str>,
    end: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let clusters = api.list_clusters(begin.unwrap_or(""), end, list_limit(limit))?;
    if clusters.is_empty() {
        if begin.is_none() {
            println!("The metacluster has no registered data clusters");
        } else {
            println!("The metacluster has no registered data clusters in the specified range");
        }
        return Ok(());
    }
    let names: Vec<&str> = clusters.iter().map(|(name, _)| name.as_str()).collect();
    print!("{}", output::numbered_list(&names));
    Ok(())
}

pub fn get(api: &MetaclusterApi, name: &str, json: Option<&str>) -> anyhow::Result<()> {
    let use_json = json_flag(json)?;
    match api.get_cluster(name) {
        Ok(metadata) if use_json => output::print_json(&output::success("cluster", metadata.to_json())),
        Ok(metadata) => {
            print!("{}", output::cluster_text(&metadata));
            Ok(())
        }
        Err(err) if use_json => {
            output::print_json(&output::error(&err))?;
            Err(Reported(err).into())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn configure(api: &MetaclusterApi, name: &str, params: &[String]) -> anyhow::Result<()> {
    api.configure_cluster_tokens(name, params)?;
    println!("The configuration for cluster `{name}' has been updated");
    Ok(())
}
