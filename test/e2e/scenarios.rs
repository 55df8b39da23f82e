//! End-to-end scenarios against in-memory collaborators.
//!
//! Each test drives the engine the way the `up` binary does: a fresh
//! [`Fleet`] per command, all of them sharing one fake cloud, so state
//! written by one run is rediscovered by the next purely from resource names.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p upfleet-e2e --test scenarios
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use upfleet_engine::{
    BuildArtifact, DomainOutcome, EngineConfig, EngineError, ErrorKind, Fleet, FleetContext,
    FleetEvent, Progress, RecordOutcome,
};
use upfleet_naming::{Fqdn, ServiceTarget};
use upfleet_provider::Cloud;
use upfleet_reconcile::{PollObserver, ScaleDirection, ScaleRequest};
use upfleet_testing::{CloudCall, FakeCloud, FakeRemote, FakeResolver};

#[derive(Default)]
struct Transcript {
    lines: Mutex<Vec<String>>,
}

impl Transcript {
    fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl PollObserver for Transcript {}

impl Progress for Transcript {
    fn event(&self, event: &FleetEvent<'_>) {
        self.lines.lock().unwrap().push(event.to_string());
    }
}

/// One operator's world: a cloud account, the instances' SSH daemons and
/// the public resolver.
struct World {
    cloud: Arc<FakeCloud>,
    remote: FakeRemote,
    resolver: Arc<FakeResolver>,
    transcript: Arc<Transcript>,
}

impl World {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("upfleet_engine=debug")
            .with_test_writer()
            .try_init();

        let cloud = Arc::new(FakeCloud::new());
        cloud.add_ssh_key("operator");

        Self {
            cloud,
            remote: FakeRemote::new(),
            resolver: Arc::new(FakeResolver::new()),
            transcript: Arc::new(Transcript::default()),
        }
    }

    /// A fresh run of the CLI for `environment`.
    fn run(&self, environment: &str) -> Fleet {
        Fleet::new(FleetContext {
            target: ServiceTarget::new("@acme/api", environment).unwrap(),
            cloud: Cloud::from_client(self.cloud.clone()),
            connector: Arc::new(self.remote.clone()),
            resolver: self.resolver.clone(),
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
            progress: self.transcript.clone(),
        })
    }
}

fn indices(fleet: &[upfleet_engine::Instance]) -> Vec<u32> {
    let mut indices: Vec<u32> = fleet.iter().map(|i| i.index).collect();
    indices.sort_unstable();
    indices
}

fn build(dir: &Path) -> BuildArtifact {
    std::fs::create_dir_all(dir.join("dist")).unwrap();
    std::fs::write(dir.join("dist/app.js"), b"require('http').createServer().listen(80)").unwrap();
    std::fs::write(dir.join("package.json"), br#"{"name":"@acme/api"}"#).unwrap();
    BuildArtifact::locate(dir, Path::new("dist/app.js")).unwrap()
}

// Ids are drawn from one counter across the fake account: the operator's
// key is 1, so a fresh init creates droplet 2, certificate 3 and balancer 4.
const FRESH_BALANCER: u64 = 4;

#[tokio::test(start_paused = true)]
async fn scenario_a_fresh_environment() {
    let world = World::new();
    let balancer_ip = FakeCloud::balancer_address(FRESH_BALANCER);
    world.resolver.serve_after("app.example.com", balancer_ip, 2);

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let report = world.run("production").init(&fqdn).await.unwrap();

    let droplets = world.cloud.droplets();
    assert_eq!(droplets.len(), 1);
    assert_eq!(droplets[0].name, "acme-api-production-0");
    assert!(report.instance_created);

    let balancers = world.cloud.load_balancers();
    assert_eq!(balancers.len(), 1);
    assert_eq!(balancers[0].name, "acme-api-production");
    assert_eq!(balancers[0].droplet_ids, vec![droplets[0].id]);

    assert_eq!(report.domain, DomainOutcome::Created);
    assert_eq!(world.cloud.domains(), vec!["example.com"]);

    let records = world.cloud.records("example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "A");
    assert_eq!(records[0].name, "app");
    assert_eq!(records[0].data, balancer_ip.to_string());

    assert_eq!(report.propagation_attempts, 3);
    assert!(world.transcript.contains("app.example.com resolves to"));
    assert_eq!(world.remote.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_existing_domain() {
    let world = World::new();
    world.cloud.add_domain("example.com");
    world
        .resolver
        .serve("staging.example.com", FakeCloud::balancer_address(FRESH_BALANCER));

    let fqdn = Fqdn::parse("staging.example.com").unwrap();
    let report = world.run("staging").init(&fqdn).await.unwrap();

    assert_eq!(report.domain, DomainOutcome::Found);
    assert_eq!(world.cloud.domains(), vec!["example.com"]);
    assert!(!world
        .cloud
        .calls()
        .iter()
        .any(|c| matches!(c, CloudCall::CreateDomain { .. })));

    let records = world.cloud.records("example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "staging");
    assert_eq!(
        records[0].data,
        FakeCloud::balancer_address(FRESH_BALANCER).to_string()
    );
    assert!(matches!(report.record, RecordOutcome::Created(_)));
    assert_eq!(world.cloud.load_balancers()[0].name, "acme-api-staging");
}

#[tokio::test(start_paused = true)]
async fn scenario_c_scale_up_by_two() {
    let world = World::new();
    world.cloud.add_droplet("acme-api-production-0");

    let outcome = world
        .run("production")
        .scale(ScaleRequest::Explicit {
            direction: ScaleDirection::Up,
            count: 2,
        })
        .await
        .unwrap();
    assert_eq!(outcome.launched.len(), 2);
    assert!(outcome.failures.is_empty());

    // A later run sees the new instances from names alone.
    let fleet = world.run("production").list().await.unwrap();
    assert_eq!(indices(&fleet), vec![0, 1, 2]);
    let names: BTreeSet<_> = fleet.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn scenario_full_rollout() {
    let world = World::new();
    world
        .resolver
        .serve("app.example.com", FakeCloud::balancer_address(FRESH_BALANCER));

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    world.run("production").init(&fqdn).await.unwrap();

    world
        .run("production")
        .scale(ScaleRequest::To(3))
        .await
        .unwrap();

    let fleet = world.run("production").list().await.unwrap();
    assert_eq!(indices(&fleet), vec![0, 1, 2]);

    let members: BTreeSet<u64> = world.cloud.load_balancers()[0]
        .droplet_ids
        .iter()
        .copied()
        .collect();
    let ids: BTreeSet<u64> = fleet.iter().map(|i| i.id).collect();
    assert_eq!(members, ids);

    let dir = tempfile::tempdir().unwrap();
    let report = world
        .run("production")
        .deploy(&build(dir.path()))
        .await
        .unwrap();
    assert_eq!(report.digest.len(), 64);
    assert_eq!(report.instances.succeeded.len(), 3);
    for instance in &fleet {
        let address = instance.address.unwrap().into();
        assert!(world.remote.file(address, "app/app.js").is_some());
    }

    // Scaling back down keeps the balancer in step.
    world
        .run("production")
        .scale(ScaleRequest::To(1))
        .await
        .unwrap();
    let fleet = world.run("production").list().await.unwrap();
    assert_eq!(fleet.len(), 1);
    assert_eq!(
        world.cloud.load_balancers()[0].droplet_ids,
        vec![fleet[0].id]
    );
    assert_eq!(world.remote.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_conflicting_record_is_left_alone() {
    let world = World::new();
    world.cloud.add_domain("example.com");
    world
        .cloud
        .add_record("example.com", "CNAME", "app", "elsewhere.example.net.");

    let fqdn = Fqdn::parse("app.example.com").unwrap();
    let err = world.run("production").init(&fqdn).await.unwrap_err();

    assert!(matches!(err, EngineError::Inconsistency(_)));
    assert_eq!(err.kind(), ErrorKind::StateInconsistency);
    assert!(!world
        .cloud
        .calls()
        .iter()
        .any(|c| matches!(c, CloudCall::CreateRecord { .. })));
    assert_eq!(world.cloud.records("example.com").len(), 1);
}
