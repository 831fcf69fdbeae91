pub mod metacluster;
pub mod tenant;

use metagrid_management::MetaclusterError;
use metagrid_management::api::DEFAULT_LIST_LIMIT;
use thiserror::Error;

/// A failure whose JSON error envelope has already been printed. The
/// process exits non-zero without reporting it again.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Reported(pub MetaclusterError);

/// Split `[FORCE] <NAME>` arguments.
pub fn split_force(args: &[String]) -> anyhow::Result<(bool, &str)> {
    match args {
        [name] => Ok((false, name.as_str())),
        [force, name] if force == "FORCE" => Ok((true, name.as_str())),
        [other, _] => anyhow::bail!("expected FORCE before the name, found `{other}'"),
        _ => anyhow::bail!("expected [FORCE] <NAME>"),
    }
}

/// The optional trailing `JSON` argument of `get`.
pub fn json_flag(arg: Option<&str>) -> anyhow::Result<bool> {
    match arg {
        None => Ok(false),
        Some("JSON") => Ok(true),
        Some(other) => anyhow::bail!("expected JSON, found `{other}'"),
    }
}

pub fn list_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT)
}

#[cfg(test)]
pub(crate) fn test_api() -> metagrid_management::MetaclusterApi {
    metagrid_management::MetaclusterApi::from_config(
        metagrid_state::KvStore::open_in_memory().unwrap(),
        &metagrid_core::MetagridConfig::default(),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn force_argument() {
        assert_eq!(split_force(&args(&["c1"])).unwrap(), (false, "c1"));
        assert_eq!(split_force(&args(&["FORCE", "c1"])).unwrap(), (true, "c1"));
        assert!(split_force(&args(&["force", "c1"])).is_err());
        assert!(split_force(&args(&[])).is_err());
    }

    #[test]
    fn json_argument() {
        assert!(!json_flag(None).unwrap());
        assert!(json_flag(Some("JSON")).unwrap());
        assert!(json_flag(Some("yaml")).is_err());
    }

    #[test]
    fn default_limit() {
        assert_eq!(list_limit(None), 100);
        assert_eq!(list_limit(Some(3)), 3);
    }
}
