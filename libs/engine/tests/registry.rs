mod common;

use common::Harness;
use upfleet_engine::{InstanceRegistry, InstanceStatus};
use upfleet_testing::CloudCall;

fn list_calls(harness: &Harness) -> usize {
    harness
        .cloud
        .calls()
        .iter()
        .filter(|c| **c == CloudCall::ListDroplets)
        .count()
}

#[tokio::test]
async fn test_discovers_only_matching_names() {
    let harness = Harness::new();
    harness.seed_instance(0);
    harness.seed_instance(2);
    harness.cloud.add_droplet("api-staging-0");
    harness.cloud.add_droplet("api-prod-web");
    harness.cloud.add_droplet("api-prod-01");
    harness.cloud.add_droplet("billing-api-prod-1");

    let instances = harness.fleet().list().await.unwrap();

    let names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["api-prod-0", "api-prod-2"]);
    assert_eq!(instances[1].index, 2);
    assert!(instances.iter().all(|i| i.status == InstanceStatus::Running));
    assert!(instances.iter().all(|i| i.address.is_some()));
}

#[tokio::test]
async fn test_snapshot_is_reused_within_a_run() {
    let harness = Harness::new();
    harness.seed_instance(0);

    let registry = InstanceRegistry::new(Harness::target(), harness.cloud.clone());
    registry.instances().await.unwrap();
    registry.instances().await.unwrap();
    assert_eq!(list_calls(&harness), 1);

    // A new instance is invisible until invalidation.
    harness.seed_instance(1);
    assert_eq!(registry.instances().await.unwrap().len(), 1);

    registry.invalidate().await;
    assert_eq!(registry.instances().await.unwrap().len(), 2);
    assert_eq!(list_calls(&harness), 2);
}

#[tokio::test]
async fn test_each_run_rediscovers() {
    let harness = Harness::new();
    harness.seed_instance(0);

    assert_eq!(harness.fleet().list().await.unwrap().len(), 1);
    harness.seed_instance(1);
    assert_eq!(harness.fleet().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_scoped_service_names() {
    let harness = Harness::new();
    harness.cloud.add_droplet("acme-web-prod-0");

    let target = upfleet_naming::ServiceTarget::new("@acme/web", "prod").unwrap();
    let instances = harness.fleet_for(target).list().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].index, 0);
}
