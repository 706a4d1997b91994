use super::*;
use chrono::Utc;
use resources::{LogicalPort, Network, OwnerType, PortStatus};

fn network(id: &str, tenant: &str, public: bool) -> Network {
    Network {
        id: id.to_string(),
        name: format!("net-{}", id),
        tenant_id: tenant.to_string(),
        subnet_id: String::new(),
        is_public: public,
        is_external: false,
        provider: Default::default(),
        create_time: Utc::now(),
        description: String::new(),
    }
}

fn port(id: &str, network_id: &str, group: Option<&str>) -> LogicalPort {
    LogicalPort {
        id: id.to_string(),
        name: id.to_string(),
        status: PortStatus::CreatedOk,
        ip: "10.0.0.5".to_string(),
        mac: String::new(),
        network_id: network_id.to_string(),
        subnet_id: "s1".to_string(),
        ip_group_id: group.map(str::to_string),
        node_id: "node-1".to_string(),
        cluster_id: String::new(),
        owner_type: OwnerType::Pod,
        tenant_id: "t1".to_string(),
        pod_name: "web-0".to_string(),
        pod_ns: "default".to_string(),
    }
}

#[test]
fn test_add_get_and_list_by_index() {
    let repo = Repository::new();
    repo.add(network("n1", "t1", false)).unwrap();
    repo.add(network("n2", "t1", true)).unwrap();
    repo.add(network("n3", "t2", false)).unwrap();

    assert_eq!(repo.get("n2").unwrap().name, "net-n2");
    assert_eq!(repo.list_by_index(INDEX_TENANT, "t1").len(), 2);
    let public = repo.list_by_index(INDEX_PUBLIC, &flag(true));
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].id, "n2");
    assert!(repo.list_by_index(INDEX_TENANT, "nobody").is_empty());
    assert!(repo.list_by_index("no-such-index", "x").is_empty());
}

#[test]
fn test_readd_replaces_and_reindexes() {
    let repo = Repository::new();
    repo.add(network("n1", "t1", false)).unwrap();
    repo.add(network("n1", "t2", false)).unwrap();

    assert_eq!(repo.len(), 1);
    assert!(repo.list_by_index(INDEX_TENANT, "t1").is_empty());
    assert_eq!(repo.list_by_index(INDEX_TENANT, "t2").len(), 1);
}

#[test]
fn test_update_moves_index_entries() {
    let repo = Repository::new();
    repo.add(network("n1", "t1", false)).unwrap();

    let mut updated = repo.get("n1").unwrap();
    updated.is_public = true;
    repo.update(updated).unwrap();

    assert!(repo.list_by_index(INDEX_PUBLIC, &flag(false)).is_empty());
    assert_eq!(repo.list_by_index(INDEX_PUBLIC, &flag(true)).len(), 1);
}

#[test]
fn test_update_of_absent_record_is_not_found() {
    let repo: Repository<Network> = Repository::new();
    let err = repo.update(network("ghost", "t1", false)).unwrap_err();
    assert!(err.is_not_found());
    assert!(repo.is_empty());
}

#[test]
fn test_del_unlinks_indexes() {
    let repo = Repository::new();
    repo.add(port("p1", "n1", Some("g1"))).unwrap();
    repo.add(port("p2", "n1", None)).unwrap();

    assert_eq!(repo.list_by_index(INDEX_IP_GROUP, "g1").len(), 1);
    assert_eq!(repo.list_by_index(INDEX_POD, "default/web-0").len(), 2);

    let removed = repo.del("p1").unwrap();
    assert_eq!(removed.id, "p1");
    assert!(repo.list_by_index(INDEX_IP_GROUP, "g1").is_empty());
    assert_eq!(repo.list_by_index(INDEX_NETWORK, "n1").len(), 1);
    assert!(repo.del("p1").is_none());
    assert!(repo.get("p1").unwrap_err().is_not_found());
}

#[test]
fn test_empty_key_is_rejected() {
    let repo = Repository::new();
    assert!(repo.add(network("", "t1", false)).is_err());
    assert!(repo.is_empty());
}

#[tokio::test]
async fn test_concurrent_writers_keep_indexes_consistent() {
    let repo = std::sync::Arc::new(Repository::new());
    let mut handles = Vec::new();
    for worker in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                let tenant = if i % 2 == 0 { "even" } else { "odd" };
                repo.add(network(&format!("n{}-{}", worker, i), tenant, false))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(repo.len(), 400);
    assert_eq!(repo.list_by_index(INDEX_TENANT, "even").len(), 200);
    assert_eq!(repo.list_by_index(INDEX_TENANT, "odd").len(), 200);
}
