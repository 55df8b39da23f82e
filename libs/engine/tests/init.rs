mod common;

use common::Harness;
use upfleet_engine::{DomainOutcome, RecordOutcome, SyncOutcome};
use upfleet_naming::Fqdn;
use upfleet_testing::{CloudCall, FakeCloud};

#[tokio::test(start_paused = true)]
async fn test_init_fresh_environment() {
    let harness = Harness::new();
    harness.cloud.set_balancer_ip_delay(2);
    // Resolver serves the balancer address created by this run; its id is
    // allocated after the key, droplet and certificate.
    harness
        .resolver
        .serve_after("app.example.com", FakeCloud::balancer_address(4), 1);

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let report = harness.fleet().init(&fqdn).await.unwrap();

    assert!(report.instance_created);
    assert_eq!(report.instance.name, "api-prod-0");
    assert_eq!(report.domain, DomainOutcome::Created);
    assert_eq!(report.membership, SyncOutcome::Unchanged);
    assert_eq!(report.address, FakeCloud::balancer_address(4));
    assert!(matches!(report.record, RecordOutcome::Created(_)));
    assert_eq!(report.propagation_attempts, 2);

    let droplets = harness.cloud.droplets();
    assert_eq!(droplets.len(), 1);

    let balancers = harness.cloud.load_balancers();
    assert_eq!(balancers.len(), 1);
    assert_eq!(balancers[0].name, "api-prod");
    assert_eq!(balancers[0].droplet_ids, vec![droplets[0].id]);
    assert_eq!(
        balancers[0].forwarding_rules[0].certificate_id.as_deref(),
        Some(report.certificate.id.as_str())
    );

    assert_eq!(harness.cloud.domains(), vec!["example.com"]);
    let records = harness.cloud.records("example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "app");
    assert_eq!(records[0].data, FakeCloud::balancer_address(4).to_string());

    assert_eq!(report.certificate.name, "app-example-com");
    assert_eq!(report.certificate.dns_names, vec!["app.example.com"]);
    assert_eq!(harness.remote.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_init_is_repeatable() {
    let harness = Harness::new();
    harness.cloud.set_balancer_ip_delay(0);
    harness
        .resolver
        .serve("app.example.com", FakeCloud::balancer_address(4));

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    harness.fleet().init(&fqdn).await.unwrap();
    let writes = harness.cloud.writes().len();

    let report = harness.fleet().init(&fqdn).await.unwrap();

    assert!(!report.instance_created);
    assert_eq!(report.domain, DomainOutcome::Found);
    assert!(matches!(report.record, RecordOutcome::Unchanged(_)));
    assert_eq!(harness.cloud.writes().len(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_init_reuses_existing_fleet_and_fixes_membership() {
    let harness = Harness::new();
    let a = harness.seed_instance(0);
    let b = harness.seed_instance(1);
    let lb_id = harness.cloud.add_load_balancer("api-prod", &[a]);
    harness.cloud.add_domain("example.com");
    harness
        .cloud
        .add_certificate("staging-example-com", &["staging.example.com"]);
    let lb_ip = harness.cloud.load_balancers()[0].ip.unwrap();
    harness.resolver.serve("staging.example.com", lb_ip);

    let fqdn = Fqdn::parse("staging.example.com").unwrap();
    let report = harness.fleet().init(&fqdn).await.unwrap();

    assert!(!report.instance_created);
    assert_eq!(
        report.membership,
        SyncOutcome::Updated {
            added: vec![b],
            removed: vec![],
        }
    );

    let writes = harness.cloud.writes();
    assert!(!writes.iter().any(|c| matches!(
        c,
        CloudCall::CreateDroplet { .. }
            | CloudCall::CreateDomain { .. }
            | CloudCall::CreateCertificate { .. }
            | CloudCall::CreateLoadBalancer { .. }
    )));
    assert!(writes.contains(&CloudCall::SetDroplets {
        id: lb_id,
        droplet_ids: vec![a, b],
    }));
    assert!(writes.contains(&CloudCall::CreateRecord {
        domain: "example.com".into(),
        name: "staging".into(),
        data: lb_ip.to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_init_stops_on_conflicting_record() {
    let harness = Harness::new();
    let a = harness.seed_instance(0);
    harness.cloud.add_load_balancer("api-prod", &[a]);
    harness.cloud.add_domain("example.com");
    harness.cloud.add_certificate("app-example-com", &["app.example.com"]);
    harness.cloud.add_record("example.com", "A", "app", "192.0.2.99");

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let err = harness.fleet().init(&fqdn).await.unwrap_err();

    assert!(err.to_string().contains("192.0.2.99"));
    assert!(harness.cloud.writes().is_empty());
    assert_eq!(harness.resolver.lookups("app.example.com"), 0);
}
