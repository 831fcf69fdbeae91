use metagrid_management::{MetaclusterApi, parse_tenant_configuration, parse_tenant_create_options};

use super::{Reported, json_flag, list_limit, split_force};
use crate::output;

pub fn create(api: &MetaclusterApi, name: &str, params: &[String]) -> anyhow::Result<()> {
    let options = parse_tenant_create_options(params)?;
    let entry = api.create_tenant(name, &options)?;
    println!("The tenant `{name}' has been created");
    if let Some(cluster) = &entry.assigned_cluster {
        println!("  assigned cluster: {cluster}");
    }
    Ok(())
}

pub fn delete(api: &MetaclusterApi, args: &[String]) -> anyhow::Result<()> {
    let (force, name) = split_force(args)?;
    api.delete_tenant(name, force)?;
    println!("The tenant `{name}' has been deleted");
    Ok(())
}

pub fn list(
    api: &MetaclusterApi,
    begin: Option<&str>,
    end: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let tenants = api.list_tenants(begin.unwrap_or(""), end, list_limit(limit))?;
    if tenants.is_empty() {
        if begin.is_none() {
            println!("The metacluster has no tenants");
        } else {
            println!("The metacluster has no tenants in the specified range");
        }
        return Ok(());
    }
    let names: Vec<&str> = tenants.iter().map(|(name, _)| name.as_str()).collect();
    print!("{}", output::numbered_list(&names));
    Ok(())
}

pub fn list_group(api: &MetaclusterApi, group: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let tenants = api.list_group_tenants(group, list_limit(limit))?;
    if tenants.is_empty() {
        println!("The tenant group `{group}' has no tenants");
        return Ok(());
    }
    print!("{}", output::numbered_list(&tenants));
    Ok(())
}

pub fn get(api: &MetaclusterApi, name: &str, json: Option<&str>) -> anyhow::Result<()> {
    let use_json = json_flag(json)?;
    match api.get_tenant(name) {
        Ok(entry) if use_json => output::print_json(&output::success("tenant", entry.to_json())),
        Ok(entry) => {
            print!("{}", output::tenant_text(&entry));
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
    let params = parse_tenant_configuration(params)?;
    api.configure_tenant(name, &params)?;
    println!("The configuration for tenant `{name}' has been updated");
    Ok(())
}
