//! Invariants that must hold across sequences of management operations.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use metagrid_cluster::{ClusterConnectionString, DataClusterEntry};
use metagrid_management::{MetaclusterApi, TenantCreateOptions, parse_tenant_configuration};
use metagrid_state::{KvStore, RetryPolicy, Subspace, TransactionOption};
use metagrid_tenant::TenantMetadata;

const TENANT_ROOT: &[u8] = b"\xff/";
const CLUSTER_ROOT: &[u8] = b"\xff/metacluster/";

fn api_on(store: KvStore) -> MetaclusterApi {
    let retry = RetryPolicy {
        max_retries: 1000,
        initial_backoff: Duration::from_micros(100),
        max_backoff: Duration::from_millis(20),
    };
    MetaclusterApi::new(
        store,
        &Subspace::new(TENANT_ROOT.to_vec()),
        &Subspace::new(CLUSTER_ROOT.to_vec()),
        retry,
    )
}

fn test_api() -> MetaclusterApi {
    api_on(KvStore::open_in_memory().unwrap())
}

fn register(api: &MetaclusterApi, name: &str, capacity: i64) {
    api.register_cluster(
        name,
        &ClusterConnectionString::parse("host:4500").unwrap(),
        &DataClusterEntry::with_capacity(capacity),
    )
    .unwrap();
}

fn last_id(api: &MetaclusterApi) -> Option<i64> {
    let metadata = TenantMetadata::new(&Subspace::new(TENANT_ROOT.to_vec()));
    let mut tx = api.store().begin().unwrap();
    tx.set_option(TransactionOption::AccessSystemKeys);
    metadata.last_tenant_id(&mut tx).unwrap()
}

fn tombstones(api: &MetaclusterApi) -> Vec<i64> {
    let metadata = TenantMetadata::new(&Subspace::new(TENANT_ROOT.to_vec()));
    let mut tx = api.store().begin().unwrap();
    tx.set_option(TransactionOption::AccessSystemKeys);
    metadata.list_tombstones(&mut tx, usize::MAX).unwrap()
}

#[test]
fn concurrent_creation_allocates_unique_sequential_ids() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 5;

    let api = test_api();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let api = api.clone();
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        api.create_tenant(&format!("tenant-{t}-{i}"), &TenantCreateOptions::default())
                            .unwrap()
                            .id()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: Vec<i64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    let total = (THREADS * PER_THREAD) as i64;

    let unique: BTreeSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(unique, (0..total).collect::<BTreeSet<_>>());
    assert_eq!(last_id(&api), Some(total - 1));
    assert_eq!(api.list_tenants("", None, usize::MAX).unwrap().len(), ids.len());
}

#[test]
fn deleted_ids_are_never_reused() {
    let api = test_api();
    let options = TenantCreateOptions::default();

    let first = api.create_tenant("a", &options).unwrap();
    api.create_tenant("b", &options).unwrap();
    api.delete_tenant("a", false).unwrap();
    api.delete_tenant("b", false).unwrap();
    assert_eq!(tombstones(&api), vec![0, 1]);

    let again = api.create_tenant("a", &options).unwrap();
    assert_ne!(again.id(), first.id());
    assert_eq!(again.id(), 2);

    for name in ["c", "d", "e"] {
        let id = api.create_tenant(name, &options).unwrap().id();
        assert!(!tombstones(&api).contains(&id));
    }
}

/// Slots each cluster should hold given the current tenants: one per
/// distinct group plus one per ungrouped tenant.
fn expected_allocation(api: &MetaclusterApi) -> BTreeMap<String, i64> {
    let mut groups: BTreeSet<(String, String)> = BTreeSet::new();
    let mut allocation: BTreeMap<String, i64> = BTreeMap::new();
    for (_, entry) in api.list_tenants("", None, usize::MAX).unwrap() {
        let Some(cluster) = entry.assigned_cluster.clone() else {
            continue;
        };
        let counts = match &entry.tenant_group {
            Some(group) => groups.insert((cluster.clone(), group.clone())),
            None => true,
        };
        if counts {
            *allocation.entry(cluster).or_default() += 1;
        }
    }
    allocation
}

fn assert_capacity_invariant(api: &MetaclusterApi) {
    let expected = expected_allocation(api);
    for (name, metadata) in api.list_clusters("", None, usize::MAX).unwrap() {
        let allocated = metadata.entry.allocated.num_tenant_groups;
        assert!(
            allocated <= metadata.entry.capacity.num_tenant_groups,
            "{name} over capacity"
        );
        assert_eq!(allocated, expected.get(&name).copied().unwrap_or(0), "{name}");
    }
}

#[test]
fn allocation_tracks_tenants_and_never_exceeds_capacity() {
    let api = test_api();
    register(&api, "east", 2);
    register(&api, "west", 3);

    let group = |g: &str| TenantCreateOptions {
        tenant_group: Some(g.to_string()),
        assigned_cluster: None,
    };

    for i in 0..12 {
        let options = match i % 3 {
            0 => TenantCreateOptions::default(),
            1 => group("shared"),
            _ => group(&format!("g{i}")),
        };
        // Creations past total capacity fail without side effects.
        let _ = api.create_tenant(&format!("t{i:02}"), &options);
        assert_capacity_invariant(&api);
    }
    assert_eq!(expected_allocation(&api).values().sum::<i64>(), 5);

    let configure = |name: &str, tokens: &[&str]| {
        let params = parse_tenant_configuration(tokens).unwrap();
        let _ = api.configure_tenant(name, &params);
        assert_capacity_invariant(&api);
    };
    configure("t01", &["unset", "tenant_group"]);
    configure("t00", &["tenant_group=shared"]);
    configure("t04", &["tenant_group=fresh"]);

    for (name, _) in api.list_tenants("", None, usize::MAX).unwrap() {
        api.delete_tenant(&name, false).unwrap();
        assert_capacity_invariant(&api);
    }
    for (_, metadata) in api.list_clusters("", None, usize::MAX).unwrap() {
        assert_eq!(metadata.entry.allocated.num_tenant_groups, 0);
    }

    // Capacity can never be configured below the live allocation.
    api.create_tenant("last", &TenantCreateOptions::default()).unwrap();
    let cluster = api.get_tenant("last").unwrap().assigned_cluster.unwrap();
    assert!(api.configure_cluster_tokens(&cluster, &["max_tenant_groups=0"]).is_err());
    assert_capacity_invariant(&api);
}

#[test]
fn matching_configuration_is_a_no_op() {
    let api = test_api();
    let options = TenantCreateOptions {
        tenant_group: Some("g".to_string()),
        assigned_cluster: None,
    };
    api.create_tenant("grouped", &options).unwrap();
    api.create_tenant("plain", &TenantCreateOptions::default()).unwrap();

    let params = parse_tenant_configuration(&["tenant_group=g"]).unwrap();
    let entry = api.configure_tenant("grouped", &params).unwrap();
    assert_eq!(entry.configuration_sequence_num, 0);

    let params = parse_tenant_configuration(&["unset", "tenant_group"]).unwrap();
    let entry = api.configure_tenant("plain", &params).unwrap();
    assert_eq!(entry.configuration_sequence_num, 0);

    let params = parse_tenant_configuration(&["tenant_group=h"]).unwrap();
    let entry = api.configure_tenant("grouped", &params).unwrap();
    assert_eq!(entry.configuration_sequence_num, 1);
    let entry = api.configure_tenant("grouped", &params).unwrap();
    assert_eq!(entry.configuration_sequence_num, 1);
}

#[test]
fn metadata_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metagrid.redb");

    {
        let api = api_on(KvStore::open(&path).unwrap());
        register(&api, "clusterA", 4);
        api.create_tenant("t1", &TenantCreateOptions::default()).unwrap();
    }

    let api = api_on(KvStore::open(&path).unwrap());
    let metadata = api.get_cluster("clusterA").unwrap();
    assert_eq!(metadata.entry.allocated.num_tenant_groups, 1);
    let tenant = api.get_tenant("t1").unwrap();
    assert_eq!(tenant.assigned_cluster.as_deref(), Some("clusterA"));
    assert_eq!(api.create_tenant("t2", &TenantCreateOptions::default()).unwrap().id(), 1);
}
