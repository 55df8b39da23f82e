mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use common::Harness;
use upfleet_engine::{
    DnsProvisioner, DomainOutcome, EngineError, ErrorKind, PropagationWatcher, RecordOutcome,
};
use upfleet_naming::Fqdn;

const LB_IP: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 10);

#[tokio::test]
async fn test_domain_is_created_once() {
    let harness = Harness::new();
    let fleet = harness.fleet();
    let dns = DnsProvisioner::new(fleet.context());

    assert_eq!(dns.ensure_domain("example.com").await.unwrap(), DomainOutcome::Created);
    assert_eq!(dns.ensure_domain("example.com").await.unwrap(), DomainOutcome::Found);
    assert_eq!(harness.cloud.domains(), vec!["example.com"]);
}

#[tokio::test]
async fn test_subdomain_record_is_created() {
    let harness = Harness::new();
    harness.cloud.add_domain("example.com");
    let fleet = harness.fleet();
    let dns = DnsProvisioner::new(fleet.context());

    let fqdn = Fqdn::parse("staging.example.com").unwrap();
    let outcome = dns.ensure_record(&fqdn, LB_IP).await.unwrap();

    let RecordOutcome::Created(record) = outcome else {
        panic!("expected a new record");
    };
    assert_eq!(record.kind, "A");
    assert_eq!(record.name, "staging");
    assert_eq!(record.data, "198.51.100.10");
}

#[tokio::test]
async fn test_root_record_uses_at() {
    let harness = Harness::new();
    harness.cloud.add_domain("example.com");
    let fleet = harness.fleet();

    let fqdn = Fqdn::parse("example.com").unwrap();
    let outcome = DnsProvisioner::new(fleet.context())
        .ensure_record(&fqdn, LB_IP)
        .await
        .unwrap();
    assert_eq!(outcome.record().name, "@");
}

#[tokio::test]
async fn test_matching_record_is_left_alone() {
    let harness = Harness::new();
    harness.cloud.add_domain("example.com");
    harness.cloud.add_record("example.com", "A", "app", "198.51.100.10");
    let fleet = harness.fleet();

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let outcome = DnsProvisioner::new(fleet.context())
        .ensure_record(&fqdn, LB_IP)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Unchanged(_)));
    assert!(harness.cloud.writes().is_empty());
}

#[tokio::test]
async fn test_mixed_case_host_matches_existing_record() {
    let harness = Harness::new();
    harness.cloud.add_domain("example.com");
    harness.cloud.add_record("example.com", "A", "app", "198.51.100.10");
    let fleet = harness.fleet();
    let dns = DnsProvisioner::new(fleet.context());

    let fqdn = Fqdn::parse("App.Example.COM").unwrap();
    assert_eq!(
        dns.ensure_domain(fqdn.domain()).await.unwrap(),
        DomainOutcome::Found
    );
    let outcome = dns.ensure_record(&fqdn, LB_IP).await.unwrap();

    assert!(matches!(outcome, RecordOutcome::Unchanged(_)));
    assert!(harness.cloud.writes().is_empty());
}

#[tokio::test]
async fn test_conflicting_records_are_inconsistent() {
    for (kind, data) in [("A", "192.0.2.1"), ("AAAA", "2001:db8::1"), ("CNAME", "elsewhere.net.")] {
        let harness = Harness::new();
        harness.cloud.add_domain("example.com");
        harness.cloud.add_record("example.com", kind, "app", data);
        let fleet = harness.fleet();

        let fqdn = Fqdn::parse("app.example.com").unwrap();
        let err = DnsProvisioner::new(fleet.context())
            .ensure_record(&fqdn, LB_IP)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateInconsistency, "{kind}");
        assert!(err.to_string().contains(data));
        assert!(harness.cloud.writes().is_empty());
    }
}

#[tokio::test]
async fn test_other_labels_and_types_coexist() {
    let harness = Harness::new();
    harness.cloud.add_domain("example.com");
    harness.cloud.add_record("example.com", "A", "www", "192.0.2.1");
    harness.cloud.add_record("example.com", "TXT", "app", "v=spf1 -all");
    harness.cloud.add_record("example.com", "MX", "app", "mail.example.com.");
    let fleet = harness.fleet();

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let outcome = DnsProvisioner::new(fleet.context())
        .ensure_record(&fqdn, LB_IP)
        .await
        .unwrap();
    assert!(matches!(outcome, RecordOutcome::Created(_)));
}

#[tokio::test(start_paused = true)]
async fn test_propagation_waits_and_reports_nameservers_once() {
    let harness = Harness::new();
    harness.resolver.serve_after("app.example.com", LB_IP, 3);
    harness
        .resolver
        .set_nameservers("example.com", &["ns1.registrar.net", "ns2.registrar.net"]);
    let fleet = harness.fleet();

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let attempts = PropagationWatcher::new(fleet.context())
        .wait(&fqdn, LB_IP)
        .await
        .unwrap();

    assert_eq!(attempts, 4);
    assert_eq!(harness.resolver.lookups("app.example.com"), 4);
    assert_eq!(harness.resolver.nameserver_lookups(), 1);
    assert_eq!(harness.progress.count("ns1.registrar.net, ns2.registrar.net"), 1);
    assert_eq!(harness.progress.count("app.example.com resolves to 198.51.100.10"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_propagation_ignores_other_addresses() {
    let harness = Harness::new();
    harness.resolver.serve("app.example.com", Ipv4Addr::new(192, 0, 2, 1));
    let cancel = harness.cancel.clone();
    let fleet = harness.fleet();

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let watcher = PropagationWatcher::new(fleet.context());
    let wait = watcher.wait(&fqdn, LB_IP);
    tokio::pin!(wait);

    tokio::select! {
        _ = &mut wait => panic!("a stale address must not end the wait"),
        _ = tokio::time::sleep(Duration::from_secs(120)) => {}
    }
    cancel.cancel();

    let err = wait.await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled(ref name) if name == "DNS app.example.com"));
    assert!(harness.resolver.lookups("app.example.com") >= 10);
}
