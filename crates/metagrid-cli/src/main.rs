use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metagrid_core::MetagridConfig;
use metagrid_core::config::LoggingConfig;
use metagrid_management::MetaclusterApi;
use metagrid_state::KvStore;
use tracing::debug;

mod commands;
mod output;

const DEFAULT_CONFIG_FILE: &str = "metagrid.toml";

#[derive(Parser)]
#[command(
    name = "metactl",
    about = "Metagrid — metacluster tenant and data cluster management",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Configuration file (default: ./metagrid.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Metadata store file, overriding [store].path
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the data clusters of a metacluster
    Metacluster {
        #[command(subcommand)]
        action: MetaclusterAction,
    },
    /// Manage tenants
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
}

#[derive(Subcommand)]
enum MetaclusterAction {
    /// Add a data cluster to the metacluster.
    ///
    /// connection_string must be given; max_tenant_groups sets how many
    /// tenant groups may be assigned to the cluster (default 0).
    Register {
        name: String,
        /// max_tenant_groups=<NUM_GROUPS> | connection_string=<CONNECTION_STRING>
        #[arg(required = true)]
        params: Vec<String>,
    },
    /// Remove a data cluster. With FORCE the cluster is detached even if it
    /// has tenants assigned to it.
    Remove {
        /// [FORCE] <NAME>
        #[arg(required = true, num_args = 1..=2, value_name = "ARGS")]
        args: Vec<String>,
    },
    /// List the data clusters with names in BEGIN - END.
    List {
        begin: Option<String>,
        end: Option<String>,
        /// Maximum number of results (default 100)
        limit: Option<usize>,
    },
    /// Print the metadata of a data cluster; JSON selects JSON output.
    Get {
        name: String,
        #[arg(value_name = "JSON")]
        json: Option<String>,
    },
    /// Update the configuration of a data cluster.
    Configure {
        name: String,
        /// max_tenant_groups=<NUM_GROUPS> | connection_string=<CONNECTION_STRING>
        #[arg(required = true)]
        params: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TenantAction {
    /// Create a tenant, placing it on a data cluster when any are registered.
    Create {
        name: String,
        /// tenant_group=<GROUP> | assigned_cluster=<CLUSTER>
        params: Vec<String>,
    },
    /// Delete a tenant. With FORCE a tenant holding data, or in the error
    /// state, is deleted as well.
    Delete {
        /// [FORCE] <NAME>
        #[arg(required = true, num_args = 1..=2, value_name = "ARGS")]
        args: Vec<String>,
    },
    /// List the tenants with names in BEGIN - END.
    List {
        begin: Option<String>,
        end: Option<String>,
        /// Maximum number of results (default 100)
        limit: Option<usize>,
        /// Only list the members of this tenant group
        #[arg(long)]
        group: Option<String>,
    },
    /// Print the metadata of a tenant; JSON selects JSON output.
    Get {
        name: String,
        #[arg(value_name = "JSON")]
        json: Option<String>,
    },
    /// Update the configuration of a tenant.
    Configure {
        name: String,
        /// tenant_group=<GROUP> | unset tenant_group
        #[arg(required = true)]
        params: Vec<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MetagridConfig> {
    match path {
        Some(path) => MetagridConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            MetagridConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(MetagridConfig::default()),
    }
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.filter))
        .with_context(|| format!("invalid log filter `{}'", logging.filter))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        // The JSON error envelope is already on stdout.
        Err(err) if err.is::<commands::Reported>() => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.store.path = data;
    }
    init_tracing(&config.logging)?;

    let store = KvStore::open(&config.store.path)
        .with_context(|| format!("failed to open {}", config.store.path.display()))?;
    debug!(path = %config.store.path.display(), "metadata store opened");
    let api = MetaclusterApi::from_config(store, &config)?;

    match cli.command {
        Commands::Metacluster { action } => match action {
            MetaclusterAction::Register { name, params } => {
                commands::metacluster::register(&api, &name, &params)
            }
            MetaclusterAction::Remove { args } => commands::metacluster::remove(&api, &args),
            MetaclusterAction::List { begin, end, limit } => {
                commands::metacluster::list(&api, begin.as_deref(), end.as_deref(), limit)
            }
            MetaclusterAction::Get { name, json } => {
                commands::metacluster::get(&api, &name, json.as_deref())
            }
            MetaclusterAction::Configure { name, params } => {
                commands::metacluster::configure(&api, &name, &params)
            }
        },
        Commands::Tenant { action } => match action {
            TenantAction::Create { name, params } => commands::tenant::create(&api, &name, &params),
            TenantAction::Delete { args } => commands::tenant::delete(&api, &args),
            TenantAction::List {
                begin,
                end,
                limit,
                group,
            } => match group {
                Some(group) => commands::tenant::list_group(&api, &group, limit),
                None => commands::tenant::list(&api, begin.as_deref(), end.as_deref(), limit),
            },
            TenantAction::Get { name, json } => commands::tenant::get(&api, &name, json.as_deref()),
            TenantAction::Configure { name, params } => {
                commands::tenant::configure(&api, &name, &params)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_remove_with_force() {
        let cli = Cli::try_parse_from(["metactl", "metacluster", "remove", "FORCE", "c1"]).unwrap();
        match cli.command {
            Commands::Metacluster {
                action: MetaclusterAction::Remove { args },
            } => assert_eq!(args, vec!["FORCE", "c1"]),
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "metactl",
            "tenant",
            "list",
            "a",
            "m",
            "10",
            "--data",
            "/tmp/meta.redb",
        ])
        .unwrap();
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/meta.redb")));
        match cli.command {
            Commands::Tenant {
                action: TenantAction::List { begin, end, limit, group },
            } => {
                assert_eq!(begin.as_deref(), Some("a"));
                assert_eq!(end.as_deref(), Some("m"));
                assert_eq!(limit, Some(10));
                assert_eq!(group, None);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn rejects_bad_limit() {
        assert!(Cli::try_parse_from(["metactl", "metacluster", "list", "a", "m", "ten"]).is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metagrid.toml");
        std::fs::write(&path, "[retry]\nmax_retries = 3\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
