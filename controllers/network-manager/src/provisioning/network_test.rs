use super::*;
use crate::error::ErrorKind;
use crate::test_utils::*;
use iaas_client::{IaasOp, PortRequest, SubnetRequest};
use kv_store::KvOp;
use resources::{AllocationPool, Network, Subnet, Tenant};

fn stored_network(env: &TestEnv, network: &Network) -> Option<String> {
    env.kv
        .get(&format!("/paasnet/tenants/{}/networks/{}", network.tenant_id, network.id))
}

async fn net_num(env: &TestEnv, tenant_id: &str) -> u32 {
    env.ctx.tenants.get_tenant(tenant_id).await.unwrap().net_num
}

#[tokio::test]
async fn test_create_network_commits_network_and_subnet() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;

    assert!(stored_network(&env, &network).is_some());
    assert_eq!(env.ctx.repos.networks.get(&network.id).unwrap(), network);
    assert_eq!(network.provider.network_type, "vxlan");

    let subnet: Subnet = env.ctx.repos.subnets.get(&network.subnet_id).unwrap();
    assert_eq!(subnet.network_id, network.id);
    assert_eq!(subnet.gateway_ip, "10.0.0.1");
    assert_eq!(subnet.allocation_pools, vec![AllocationPool::new("10.0.0.2", "10.0.0.254")]);
    assert!(env.kv.get(&format!("/paasnet/subnets/{}", subnet.id)).is_some());

    assert_eq!(net_num(&env, TENANT).await, 1);
}

#[tokio::test]
async fn test_quota_is_checked_before_any_iaas_call() {
    let env = test_env();
    let mut full = Tenant::new(TENANT, 2);
    full.net_num = 2;
    env.ctx.store.save_record(&full).await.unwrap();

    let err = env
        .ctx
        .provisioner
        .create_network(env.network_request(TENANT, "blue", "10.0.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(env.iaas.calls(IaasOp::CreateNetwork), 0);
}

#[tokio::test]
async fn test_quota_counts_created_networks() {
    let env = test_env();
    env.ctx.tenants.create_tenant(TENANT, Some(1)).await.unwrap();
    env.network(TENANT, "blue", "10.0.0.0/24").await;

    let err = env
        .ctx
        .provisioner
        .create_network(env.network_request(TENANT, "green", "10.1.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(env.iaas.calls(IaasOp::CreateNetwork), 1);
}

#[tokio::test]
async fn test_concurrent_creations_respect_quota() {
    let env = test_env();
    env.ctx.tenants.create_tenant(TENANT, Some(1)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let provisioner = env.ctx.provisioner.clone();
        let request = env.network_request(TENANT, &format!("net-{}", i), &format!("10.{}.0.0/24", i));
        handles.push(tokio::spawn(async move { provisioner.create_network(request).await }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(env.iaas.network_ids().len(), 1);
}

#[tokio::test]
async fn test_validation_failures_make_no_iaas_calls() {
    let env = test_env();
    let provisioner = &env.ctx.provisioner;

    let bad_cidr = env.network_request(TENANT, "blue", "10.0.0.0/4");
    assert_eq!(provisioner.create_network(bad_cidr).await.unwrap_err().kind(), ErrorKind::BadRequest);

    let mut bad_pool = env.network_request(TENANT, "blue", "10.0.0.0/24");
    bad_pool.allocation_pools = vec![AllocationPool::new("10.0.0.50", "10.0.0.10")];
    assert_eq!(provisioner.create_network(bad_pool).await.unwrap_err().kind(), ErrorKind::BadRequest);

    let mut public = env.network_request(TENANT, "blue", "10.0.0.0/24");
    public.is_public = true;
    assert_eq!(provisioner.create_network(public).await.unwrap_err().kind(), ErrorKind::Forbidden);

    assert_eq!(env.iaas.calls(IaasOp::CreateNetwork), 0);
}

#[tokio::test]
async fn test_duplicate_name_within_tenant() {
    let env = test_env();
    env.network(TENANT, "blue", "10.0.0.0/24").await;
    let err = env
        .ctx
        .provisioner
        .create_network(env.network_request(TENANT, "blue", "10.1.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    env.network(OTHER_TENANT, "blue", "10.1.0.0/24").await;
}

#[tokio::test]
async fn test_subnet_failure_deletes_iaas_network() {
    let env = test_env();
    env.iaas.fail_always(IaasOp::CreateSubnet);

    let err = env
        .ctx
        .provisioner
        .create_network(env.network_request(TENANT, "blue", "10.0.0.0/24"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(env.iaas.calls(IaasOp::CreateSubnet), 3);
    assert_eq!(env.iaas.calls(IaasOp::DeleteNetwork), 1);
    assert!(env.iaas.network_ids().is_empty());
    assert!(env.ctx.repos.networks.is_empty());
    assert_eq!(net_num(&env, TENANT).await, 0);
}

#[tokio::test]
async fn test_store_failure_withdraws_subnet_and_iaas_network() {
    let env = test_env();
    env.kv
        .fail_prefix(KvOp::SaveLeaf, &format!("/paasnet/tenants/{}/networks", TENANT));

    let err = env
        .ctx
        .provisioner
        .create_network(env.network_request(TENANT, "blue", "10.0.0.0/24"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(env.ctx.repos.subnets.is_empty());
    assert!(env.kv.keys_under("/paasnet/subnets").is_empty());
    assert!(env.iaas.network_ids().is_empty());
}

#[tokio::test]
async fn test_provider_networks() {
    let env = test_env();

    let mut flat = env.network_request(TENANT, "flat", "10.0.0.0/24");
    flat.provider = ProviderAttrs {
        network_type: "flat".to_string(),
        physical_network: "physnet1".to_string(),
        ..Default::default()
    };
    let flat = env.ctx.provisioner.create_network(flat).await.unwrap();
    assert_eq!(flat.provider.segmentation_id, "0");
    assert_eq!(flat.provider.physical_network, "physnet1");
    assert_eq!(env.iaas.calls(IaasOp::CreateProviderNetwork), 1);

    let mut transparent = env.network_request(TENANT, "trunk", "10.1.0.0/24");
    transparent.provider = ProviderAttrs {
        network_type: "vlan".to_string(),
        physical_network: "physnet1".to_string(),
        segmentation_id: "4095".to_string(),
        ..Default::default()
    };
    let transparent = env.ctx.provisioner.create_network(transparent).await.unwrap();
    assert!(transparent.provider.vlan_transparent);
}

#[tokio::test]
async fn test_delete_refuses_referenced_network() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;
    let group = env.ip_group(&network, "web", None, Some(1)).await;

    let err = env
        .ctx
        .provisioner
        .delete_network(TENANT, &network.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    env.ctx.ipam.delete(TENANT, &group.id).await.unwrap();
    let port = env.port(&network, "pod-a").await;
    let err = env
        .ctx
        .provisioner
        .delete_network(TENANT, &network.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(env.iaas.calls(IaasOp::DeleteNetwork), 0);

    env.ctx.provisioner.delete_port(TENANT, &port.id).await.unwrap();
    env.ctx.provisioner.delete_network(TENANT, &network.id).await.unwrap();
}

#[tokio::test]
async fn test_delete_unreferenced_network() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;

    env.ctx.provisioner.delete_network(TENANT, &network.id).await.unwrap();

    assert_eq!(env.iaas.calls(IaasOp::DeleteNetwork), 1);
    assert!(env.iaas.network_ids().is_empty());
    assert!(stored_network(&env, &network).is_none());
    assert!(env.ctx.repos.networks.get(&network.id).unwrap_err().is_not_found());
    assert!(env.ctx.repos.subnets.is_empty());
    assert!(env.kv.keys_under("/paasnet/subnets").is_empty());
    assert_eq!(net_num(&env, TENANT).await, 0);
}

#[tokio::test]
async fn test_delete_purges_residual_ports() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;
    env.iaas.add_dhcp_port(&network.id).unwrap();
    let stray = env
        .iaas
        .create_port(&PortRequest::new("stray", &network.id, "", TENANT))
        .await
        .unwrap();
    env.iaas.attach_port_to_vm("vm-1", &stray.id).await.unwrap();
    env.iaas.fail_always(IaasOp::DetachPortFromVm);

    env.ctx.provisioner.delete_network(TENANT, &network.id).await.unwrap();

    assert!(env.iaas.port_ids().is_empty());
    assert!(env.iaas.network_ids().is_empty());
    // the DHCP port is left to the backend
    assert_eq!(env.iaas.calls(IaasOp::DeletePort), 1);
}

#[tokio::test]
async fn test_delete_tolerates_missing_iaas_network() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;
    env.iaas.delete_network(&network.id).await.unwrap();

    env.ctx.provisioner.delete_network(TENANT, &network.id).await.unwrap();
    assert!(env.ctx.repos.networks.is_empty());
}

#[tokio::test]
async fn test_delete_by_other_tenant_is_forbidden() {
    let env = test_env();
    let network = env.network(TENANT, "blue", "10.0.0.0/24").await;
    let err = env
        .ctx
        .provisioner
        .delete_network(OTHER_TENANT, &network.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

async fn backend_network(env: &TestEnv, name: &str, cidr: &str) -> String {
    let id = env.iaas.create_network(name).await.unwrap();
    env.iaas
        .create_subnet(&SubnetRequest {
            network_id: id.clone(),
            name: format!("{}-subnet", name),
            cidr: cidr.to_string(),
            tenant_id: ADMIN.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_external_network_lifecycle() {
    let env = test_env();
    let id = backend_network(&env, "provider-ext", "192.168.10.0/24").await;

    let denied = env
        .ctx
        .provisioner
        .register_external_network(RegisterExternalNetworkRequest {
            tenant_id: TENANT.to_string(),
            network_id: id.clone(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Forbidden);

    let network = env
        .ctx
        .provisioner
        .register_external_network(RegisterExternalNetworkRequest {
            tenant_id: ADMIN.to_string(),
            network_id: id.clone(),
            is_public: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(network.is_external);
    assert_eq!(network.name, "provider-ext");
    assert_eq!(env.ctx.repos.subnets.get(&network.subnet_id).unwrap().cidr, "192.168.10.0/24");

    env.ctx.provisioner.delete_network(ADMIN, &id).await.unwrap();
    assert_eq!(env.iaas.calls(IaasOp::DeleteNetwork), 0);
    assert_eq!(env.iaas.network_ids(), vec![id]);
    assert!(env.ctx.repos.networks.is_empty());
}

#[tokio::test]
async fn test_queries_respect_visibility() {
    let env = test_env();
    let own = env.network(TENANT, "blue", "10.0.0.0/24").await;
    let foreign = env.network(OTHER_TENANT, "red", "10.1.0.0/24").await;
    let mut shared = env.network_request(ADMIN, "blue", "10.2.0.0/24");
    shared.is_public = true;
    let shared = env.ctx.provisioner.create_network(shared).await.unwrap();

    let visible: Vec<String> = env
        .ctx
        .provisioner
        .list_networks(TENANT)
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(visible.len(), 2);
    assert!(visible.contains(&own.id) && visible.contains(&shared.id));

    assert_eq!(env.ctx.provisioner.get_network_by_name(TENANT, "blue").unwrap().id, own.id);
    assert_eq!(env.ctx.provisioner.get_network_by_name(OTHER_TENANT, "blue").unwrap().id, shared.id);
    assert!(env.ctx.provisioner.get_network_by_name(TENANT, "red").unwrap_err().is_not_found());

    assert!(env.ctx.provisioner.get_network(TENANT, &shared.id).is_ok());
    assert_eq!(
        env.ctx.provisioner.get_network(TENANT, &foreign.id).unwrap_err().kind(),
        ErrorKind::Forbidden
    );
}
