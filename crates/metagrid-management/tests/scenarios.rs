//! End-to-end cluster and tenant scenarios against an in-memory store.

use std::thread;

use metagrid_cluster::{ClusterConnectionString, DataClusterEntry};
use metagrid_management::{ErrorKind, MetaclusterApi, TenantCreateOptions};
use metagrid_state::{KvStore, RetryPolicy, Subspace};
use metagrid_tenant::TenantState;

fn test_api() -> MetaclusterApi {
    MetaclusterApi::new(
        KvStore::open_in_memory().unwrap(),
        &Subspace::new(b"\xff/".to_vec()),
        &Subspace::new(b"\xff/metacluster/".to_vec()),
        RetryPolicy::default(),
    )
}

fn register(api: &MetaclusterApi, name: &str, capacity: i64) {
    api.register_cluster(
        name,
        &ClusterConnectionString::parse("conn://host:1").unwrap(),
        &DataClusterEntry::with_capacity(capacity),
    )
    .unwrap();
}

#[test]
fn register_then_get() {
    let api = test_api();
    register(&api, "clusterA", 5);

    let metadata = api.get_cluster("clusterA").unwrap();
    assert_eq!(metadata.connection_string.as_str(), "conn://host:1");
    assert_eq!(metadata.entry.capacity.num_tenant_groups, 5);
    assert_eq!(metadata.entry.allocated.num_tenant_groups, 0);
}

#[test]
fn register_twice_fails() {
    let api = test_api();
    register(&api, "clusterA", 5);

    let err = api
        .register_cluster(
            "clusterA",
            &ClusterConnectionString::parse("conn://other:2").unwrap(),
            &DataClusterEntry::with_capacity(1),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(
        api.get_cluster("clusterA").unwrap().connection_string.as_str(),
        "conn://host:1"
    );
}

#[test]
fn remove_non_empty_cluster_requires_force() {
    let api = test_api();
    register(&api, "clusterA", 5);
    for name in ["t1", "t2", "t3"] {
        api.create_tenant(name, &TenantCreateOptions::default()).unwrap();
    }
    assert_eq!(
        api.get_cluster("clusterA").unwrap().entry.allocated.num_tenant_groups,
        3
    );

    let err = api.remove_cluster("clusterA", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(api.get_cluster("clusterA").is_ok());

    let outcome = api.remove_cluster("clusterA", true).unwrap();
    assert_eq!(outcome.detached_tenants, vec!["t1", "t2", "t3"]);
    assert_eq!(api.get_cluster("clusterA").unwrap_err().kind(), ErrorKind::NotFound);

    // The tenants stay visible, flagged and still naming the removed cluster.
    for (_, entry) in api.list_tenants("", None, 10).unwrap() {
        assert_eq!(entry.tenant_state, TenantState::Error);
        assert_eq!(entry.assigned_cluster.as_deref(), Some("clusterA"));
    }
}

#[test]
fn list_range_and_limit() {
    let api = test_api();
    for name in ["zulu", "alpha", "mike", "a", "kilo", "bravo", "lima"] {
        register(&api, name, 1);
    }

    let names = |begin: &str, end: Option<&str>, limit: usize| -> Vec<String> {
        api.list_clusters(begin, end, limit)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    };

    assert_eq!(
        names("a", Some("m"), 10),
        vec!["a", "alpha", "bravo", "kilo", "lima"]
    );
    assert_eq!(names("a", Some("m"), 2), vec!["a", "alpha"]);
    assert_eq!(names("m", None, 10), vec!["mike", "zulu"]);
    assert!(names("n", Some("y"), 10).is_empty());
    assert!(names("a", Some("m"), 0).is_empty());
}

#[test]
fn concurrent_creates_get_distinct_ids() {
    let api = test_api();

    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|name| {
            let api = api.clone();
            thread::spawn(move || api.create_tenant(name, &TenantCreateOptions::default()))
        })
        .collect();

    let mut ids: Vec<i64> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap().id())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);

    for (_, entry) in api.list_tenants("", None, 10).unwrap() {
        assert_eq!(entry.tenant_state, TenantState::Ready);
    }
}
